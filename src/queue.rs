//! The two request queues.
//!
//! *to-send* holds requests not yet fully transmitted; *awaiting-response*
//! holds requests the EC has finished reading and whose response is still
//! outstanding. A request is linked on exactly one of the two at any time. A
//! single [`std::sync::Mutex`] guards both lists and the depth counter,
//! matching the one-short-hold-critical-section discipline the bus callback
//! depends on.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

use crate::packet::Request;

/// A request shared between the caller that submitted it and the queues /
/// state machine that move it around. The condvar is signalled exactly once,
/// when the request is unlinked for the last time (matched response or
/// timeout).
pub struct PendingRequest {
    pub inner: Mutex<Request>,
    pub done: Condvar,
    pub completed: Mutex<bool>,
}

impl PendingRequest {
    #[must_use]
    pub fn new(request: Request) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(request),
            done: Condvar::new(),
            completed: Mutex::new(false),
        })
    }

    pub fn signal(&self) {
        let mut completed = self.completed.lock().expect("pending request poisoned");
        *completed = true;
        self.done.notify_all();
    }
}

struct State {
    to_send: VecDeque<Arc<PendingRequest>>,
    awaiting_response: Vec<Arc<PendingRequest>>,
    depth: usize,
}

/// The two queues, under one lock.
pub struct Queues {
    state: Mutex<State>,
}

impl Queues {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                to_send: VecDeque::new(),
                awaiting_response: Vec::new(),
                depth: 0,
            }),
        }
    }

    /// Append to *to-send* and return the new depth. Caller is responsible
    /// for asserting the attention line once this returns `1` (transition
    /// from idle to non-idle).
    pub fn push_to_send(&self, request: Arc<PendingRequest>) -> usize {
        let mut state = self.state.lock().expect("queue mutex poisoned");
        state.to_send.push_back(request);
        state.depth += 1;
        state.depth
    }

    /// Pop the head of *to-send*, if any.
    pub fn pop_to_send(&self) -> Option<Arc<PendingRequest>> {
        let mut state = self.state.lock().expect("queue mutex poisoned");
        let popped = state.to_send.pop_front();
        if popped.is_some() {
            state.depth -= 1;
        }
        popped
    }

    /// Look at the head of *to-send* without removing it. A block-read keeps
    /// its record linked here for the whole transfer (including any
    /// premature-STOP retries) so it never sits on neither queue while the
    /// bytes are in flight; [`Queues::finish_block_read`] does the actual
    /// unlink once the transfer completes.
    #[must_use]
    pub fn peek_to_send(&self) -> Option<Arc<PendingRequest>> {
        let state = self.state.lock().expect("queue mutex poisoned");
        state.to_send.front().cloned()
    }

    /// Move a request from *to-send* (by identity) to *awaiting-response*.
    /// No-op if the request is not found on *to-send* (it was already moved
    /// or the caller handed us the scratch packet).
    pub fn move_to_awaiting(&self, request: &Arc<PendingRequest>) {
        let mut state = self.state.lock().expect("queue mutex poisoned");
        state.awaiting_response.push(Arc::clone(request));
    }

    /// Find and unlink the request whose outgoing tagged command matches
    /// `tagged_cmd` from *awaiting-response*.
    pub fn take_awaiting_by_tag(&self, tagged_cmd: u8) -> Option<Arc<PendingRequest>> {
        let mut state = self.state.lock().expect("queue mutex poisoned");
        let idx = state
            .awaiting_response
            .iter()
            .position(|r| r.inner.lock().expect("request poisoned").tagged_cmd == tagged_cmd)?;
        Some(state.awaiting_response.remove(idx))
    }

    /// Remove a request from whichever queue currently holds it (used by the
    /// request path on timeout). Returns `true` if it was still on
    /// *to-send* (so the depth counter and attention line need updating).
    pub fn unlink(&self, request: &Arc<PendingRequest>) -> bool {
        let mut state = self.state.lock().expect("queue mutex poisoned");
        if let Some(idx) = state
            .to_send
            .iter()
            .position(|r| Arc::ptr_eq(r, request))
        {
            state.to_send.remove(idx);
            state.depth -= 1;
            return true;
        }
        if let Some(idx) = state
            .awaiting_response
            .iter()
            .position(|r| Arc::ptr_eq(r, request))
        {
            state.awaiting_response.remove(idx);
        }
        false
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.state.lock().expect("queue mutex poisoned").depth
    }

    /// Called by the state machine once a block-read's last byte has been
    /// acked: unlink the record from *to-send* (it was only peeked when the
    /// transfer began) and, unless it was the synthesized scratch no-op,
    /// move it to *awaiting-response*.
    ///
    /// If the record is no longer on *to-send* (a racing timeout already
    /// unlinked it via [`Queues::unlink`]), this is a no-op: the record must
    /// not be resurrected into *awaiting-response* after its tag has already
    /// been released back to the pool, or a later caller reusing that tag
    /// could collide with it.
    pub fn finish_block_read(&self, request: &Arc<PendingRequest>, is_scratch: bool) {
        if is_scratch {
            return;
        }
        let mut state = self.state.lock().expect("queue mutex poisoned");
        if let Some(idx) = state.to_send.iter().position(|r| Arc::ptr_eq(r, request)) {
            state.to_send.remove(idx);
            state.depth -= 1;
            state.awaiting_response.push(Arc::clone(request));
        }
    }
}

impl Default for Queues {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{tagged_command, Request};

    fn req(tag: u8, cmd: u8) -> Arc<PendingRequest> {
        PendingRequest::new(Request::new(tagged_command(tag, cmd), 0, &[]))
    }

    #[test]
    fn push_then_pop_preserves_order() {
        let q = Queues::new();
        let a = req(0, 0x01);
        let b = req(1, 0x01);
        q.push_to_send(Arc::clone(&a));
        q.push_to_send(Arc::clone(&b));
        assert_eq!(q.depth(), 2);
        let popped = q.pop_to_send().unwrap();
        assert!(Arc::ptr_eq(&popped, &a));
        assert_eq!(q.depth(), 1);
    }

    #[test]
    fn move_then_take_by_tag() {
        let q = Queues::new();
        let a = req(3, 0x04);
        q.move_to_awaiting(&a);
        let tagged = a.inner.lock().unwrap().tagged_cmd;
        let found = q.take_awaiting_by_tag(tagged).unwrap();
        assert!(Arc::ptr_eq(&found, &a));
        assert!(q.take_awaiting_by_tag(tagged).is_none());
    }

    #[test]
    fn unlink_from_to_send_updates_depth() {
        let q = Queues::new();
        let a = req(0, 0x02);
        q.push_to_send(Arc::clone(&a));
        assert!(q.unlink(&a));
        assert_eq!(q.depth(), 0);
    }

    #[test]
    fn unlink_from_awaiting_does_not_touch_depth() {
        let q = Queues::new();
        let a = req(0, 0x02);
        q.move_to_awaiting(&a);
        assert!(!q.unlink(&a));
        assert_eq!(q.depth(), 0);
    }

    #[test]
    fn peek_to_send_does_not_remove_or_change_depth() {
        let q = Queues::new();
        let a = req(0, 0x01);
        q.push_to_send(Arc::clone(&a));
        let peeked = q.peek_to_send().unwrap();
        assert!(Arc::ptr_eq(&peeked, &a));
        assert_eq!(q.depth(), 1);
        assert!(q.peek_to_send().is_some());
    }

    #[test]
    fn finish_block_read_moves_peeked_request_to_awaiting() {
        let q = Queues::new();
        let a = req(0, 0x01);
        q.push_to_send(Arc::clone(&a));
        q.peek_to_send().unwrap();
        q.finish_block_read(&a, false);
        assert_eq!(q.depth(), 0);
        let tagged = a.inner.lock().unwrap().tagged_cmd;
        assert!(q.take_awaiting_by_tag(tagged).is_some());
    }

    #[test]
    fn finish_block_read_is_a_no_op_once_already_unlinked() {
        let q = Queues::new();
        let a = req(0, 0x01);
        q.push_to_send(Arc::clone(&a));
        assert!(q.unlink(&a));
        // A racing cancel already removed it from *to-send*; the state
        // machine's completion must not resurrect it into
        // *awaiting-response*.
        q.finish_block_read(&a, false);
        let tagged = a.inner.lock().unwrap().tagged_cmd;
        assert!(q.take_awaiting_by_tag(tagged).is_none());
    }

    #[test]
    fn finish_block_read_ignores_the_scratch_packet() {
        let q = Queues::new();
        let scratch = req(0, 0x01);
        q.finish_block_read(&scratch, true);
        let tagged = scratch.inner.lock().unwrap().tagged_cmd;
        assert!(q.take_awaiting_by_tag(tagged).is_none());
    }
}
