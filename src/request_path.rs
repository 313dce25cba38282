//! The synchronous caller API: build a packet, queue it, wait for a match.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::attention::{Level, SharedAttentionLine};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::packet::Request;
use crate::queue::{PendingRequest, Queues};
use crate::tag_pool::TagPool;

/// Caller-facing request/response path. One instance is shared by every
/// thread calling [`RequestPath::submit`].
pub struct RequestPath {
    queues: Arc<Queues>,
    tag_pool: Arc<TagPool>,
    attention: SharedAttentionLine,
    config: Config,
    enabled: AtomicBool,
}

impl RequestPath {
    #[must_use]
    pub fn new(
        queues: Arc<Queues>,
        tag_pool: Arc<TagPool>,
        attention: SharedAttentionLine,
        config: Config,
    ) -> Self {
        Self {
            queues,
            tag_pool,
            attention,
            config,
            enabled: AtomicBool::new(false),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    #[must_use]
    pub fn config(&self) -> Config {
        self.config
    }

    /// Issue a request and block for a matching response, retrying the
    /// attention-line pulse until it arrives or the retry budget is spent.
    pub fn submit(
        &self,
        cmd: u8,
        subcmd: u8,
        tx_payload: &[u8],
        rx_buffer: &mut [u8],
    ) -> Result<usize> {
        if !self.enabled.load(Ordering::SeqCst) {
            log::debug!("submit() rejected: bus suspended");
            return Err(Error::Suspended);
        }

        let tagged = self.tag_pool.acquire(cmd);
        let request = Request::new(tagged, subcmd, tx_payload);
        let pending = PendingRequest::new(request);

        let depth = self.queues.push_to_send(Arc::clone(&pending));
        if depth == 1 {
            let result = self
                .attention
                .lock()
                .expect("attention line poisoned")
                .set(Level::Asserted);
            if let Err(err) = result {
                self.cancel(&pending, tagged);
                return Err(err);
            }
        }

        let wait = Duration::from_millis(u64::from(self.config.retry_wait_ms));
        let mut completed_guard = pending.completed.lock().expect("pending request poisoned");
        for attempt in 0..self.config.retry_count {
            if *completed_guard {
                break;
            }
            let (guard, timeout) = pending
                .done
                .wait_timeout(completed_guard, wait)
                .expect("pending request poisoned");
            completed_guard = guard;
            if *completed_guard {
                break;
            }
            if timeout.timed_out() {
                log::debug!(
                    "request tag/cmd={tagged:#04x} timed out, retry {}/{}",
                    attempt + 1,
                    self.config.retry_count
                );
                self.pulse_attention();
            }
        }
        let completed = *completed_guard;
        drop(completed_guard);

        if !completed {
            self.cancel(&pending, tagged);
            log::warn!("request tag/cmd={tagged:#04x} timed out after full retry budget");
            return Err(Error::Timeout);
        }

        let req = pending.inner.lock().expect("pending request poisoned");
        if req.rx_status != 0 {
            log::debug!("remote error {} for cmd={tagged:#04x}", req.rx_status);
            return Err(Error::RemoteError(req.rx_status));
        }

        let n = req.rx_payload.len().min(rx_buffer.len());
        rx_buffer[..n].copy_from_slice(&req.rx_payload[..n]);
        if req.rx_payload.len() > rx_buffer.len() {
            log::warn!(
                "response payload {} bytes truncated to caller buffer {}",
                req.rx_payload.len(),
                rx_buffer.len()
            );
        }
        Ok(n)
    }

    fn pulse_attention(&self) {
        {
            let mut line = self.attention.lock().expect("attention line poisoned");
            if let Err(err) = line.set(Level::Idle) {
                log::warn!("pulse_attention: {err}");
            }
        }
        std::thread::sleep(Duration::from_millis(u64::from(self.config.attention_pulse_ms)));
        {
            let mut line = self.attention.lock().expect("attention line poisoned");
            if let Err(err) = line.set(Level::Asserted) {
                log::warn!("pulse_attention: {err}");
            }
        }
    }

    /// Unlink a request that will never complete (timed out, or the initial
    /// attention-assert failed) and release its tag.
    fn cancel(&self, pending: &Arc<PendingRequest>, tagged: u8) {
        let was_to_send = self.queues.unlink(pending);
        if was_to_send && self.queues.depth() == 0 {
            let result = self
                .attention
                .lock()
                .expect("attention line poisoned")
                .set(Level::Idle);
            if let Err(err) = result {
                log::warn!("cancel: {err}");
            }
        }
        self.tag_pool.release(tagged);
    }
}
