//! The slave-side protocol state machine.
//!
//! Five phases: [`Phase::Idle`], [`Phase::CmdWait`], [`Phase::Discriminate`],
//! [`Phase::BlockRead`] (the AP transmits), [`Phase::BlockWrite`] (the AP
//! receives). Driven one byte event at a time by [`SlaveStateMachine::step`],
//! which is called from the bus callback: it must never sleep and must
//! never return while holding a lock.

use std::sync::Arc;

use heapless::Vec as HVec;

use crate::attention::{Level, SharedAttentionLine};
use crate::bus::BusPort;
use crate::dispatcher::EventDispatcher;
use crate::event_pool::{EventPool, PooledEvent};
use crate::packet::{decode_event, is_event, Request, BLOCK_READ_MARKER, MAX_PAYLOAD};
use crate::queue::{PendingRequest, Queues};

const RX_BUF_CAP: usize = MAX_PAYLOAD + 4;

/// Status flags accompanying a byte event, as delivered by the bus port.
#[derive(Debug, Clone, Copy, Default)]
pub struct BusEvent {
    pub irq: bool,
    pub start: bool,
    pub stop: bool,
    pub rnw: bool,
    pub byte: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    CmdWait,
    Discriminate,
    BlockRead,
    BlockWrite,
}

pub struct SlaveStateMachine {
    phase: Phase,
    slave_address: u8,
    block_read_setup_us: u32,
    rx_buf: HVec<u8, RX_BUF_CAP>,

    // TX side: kept across BlockRead polls so a premature STOP can resume
    // the same packet on the next poll instead of re-dequeuing.
    tx_msg: Option<Arc<PendingRequest>>,
    tx_is_scratch: bool,
    tx_pos: usize,
    tx_size: usize,
    scratch: Arc<PendingRequest>,

    queues: Arc<Queues>,
    tag_pool: Arc<crate::tag_pool::TagPool>,
    event_pool: Arc<EventPool>,
    dispatcher: Arc<EventDispatcher>,
    attention: SharedAttentionLine,
}

impl SlaveStateMachine {
    #[must_use]
    pub fn new(
        slave_address: u8,
        block_read_setup_us: u32,
        queues: Arc<Queues>,
        tag_pool: Arc<crate::tag_pool::TagPool>,
        event_pool: Arc<EventPool>,
        dispatcher: Arc<EventDispatcher>,
        attention: SharedAttentionLine,
        no_op: Request,
    ) -> Self {
        Self {
            phase: Phase::Idle,
            slave_address,
            block_read_setup_us,
            rx_buf: HVec::new(),
            tx_msg: None,
            tx_is_scratch: false,
            tx_pos: 0,
            tx_size: 0,
            scratch: PendingRequest::new(no_op),
            queues,
            tag_pool,
            event_pool,
            dispatcher,
            attention,
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn set_attention(&self, level: Level) {
        let result = self.attention.lock().expect("attention line poisoned").set(level);
        if let Err(err) = result {
            log::warn!("state machine: {err}");
        }
    }

    fn reassert_if_pending(&self) {
        if self.queues.depth() > 0 {
            self.set_attention(Level::Asserted);
        }
    }

    fn reset_to_idle(&mut self, reason: &str) {
        log::warn!("state machine: {reason}, resetting to Idle");
        self.phase = Phase::Idle;
    }

    /// Advance the state machine by one bus event. Returns the byte to place
    /// on the bus if the master is currently reading, `None` otherwise.
    pub fn step(&mut self, bus: &mut dyn BusPort, ev: BusEvent) -> Option<u8> {
        match self.phase {
            Phase::Idle => self.step_idle(bus, ev),
            Phase::CmdWait => self.step_cmd_wait(ev),
            Phase::Discriminate => self.step_discriminate(bus, ev),
            Phase::BlockRead => self.step_block_read(ev),
            Phase::BlockWrite => self.step_block_write(ev),
        }
    }

    fn step_idle(&mut self, bus: &mut dyn BusPort, ev: BusEvent) -> Option<u8> {
        if ev.irq && ev.start && ev.byte == self.slave_address {
            bus.clear_received();
            self.rx_buf.clear();
            self.phase = Phase::CmdWait;
        } else {
            log::trace!("state machine: idle saw {ev:?}, ignoring");
        }
        None
    }

    fn step_cmd_wait(&mut self, ev: BusEvent) -> Option<u8> {
        if ev.irq && !ev.start && !ev.stop {
            let _ = self.rx_buf.push(ev.byte);
            self.phase = Phase::Discriminate;
        } else {
            self.reset_to_idle("unexpected flags in CmdWait");
        }
        None
    }

    fn step_discriminate(&mut self, bus: &mut dyn BusPort, ev: BusEvent) -> Option<u8> {
        if ev.irq && ev.rnw && ev.start {
            let cmd_byte = self.rx_buf.first().copied().unwrap_or(0);
            if cmd_byte != BLOCK_READ_MARKER {
                self.reset_to_idle("block-read requested with wrong marker byte");
                return None;
            }
            self.begin_block_read(bus)
        } else if ev.irq && !ev.start {
            let _ = self.rx_buf.push(ev.byte);
            if ev.stop {
                self.dispatch_block_write();
                self.phase = Phase::Idle;
            } else {
                self.phase = Phase::BlockWrite;
            }
            None
        } else {
            self.reset_to_idle("unexpected flags in Discriminate");
            None
        }
    }

    fn begin_block_read(&mut self, bus: &mut dyn BusPort) -> Option<u8> {
        bus.busy_wait_micros(self.block_read_setup_us);

        if self.tx_msg.is_none() {
            if let Some(next) = self.queues.peek_to_send() {
                self.tx_msg = Some(next);
                self.tx_is_scratch = false;
            } else {
                self.tx_is_scratch = true;
                self.tx_msg = Some(Arc::clone(&self.scratch));
            }
            self.tx_pos = 0;
        }

        let encoded = {
            let msg = self.tx_msg.as_ref().expect("tx_msg set above");
            let req = msg.inner.lock().expect("request poisoned");
            self.tx_size = req.tx_size();
            req.encode()
        };

        self.set_attention(Level::Idle);
        self.phase = Phase::BlockRead;
        encoded.first().copied()
    }

    fn step_block_read(&mut self, ev: BusEvent) -> Option<u8> {
        if !ev.rnw {
            self.reset_to_idle("block-read saw non-RNW event");
            return None;
        }

        if !ev.stop {
            self.tx_pos += 1;
            let msg = self.tx_msg.clone().expect("tx_msg set during block-read");
            let req = msg.inner.lock().expect("request poisoned");
            let encoded = req.encode();
            return match encoded.get(self.tx_pos).copied() {
                Some(byte) => Some(byte),
                None => {
                    log::warn!("state machine: block-read underflow at pos={}", self.tx_pos);
                    self.phase = Phase::Idle;
                    Some(0xFF)
                }
            };
        }

        // STOP seen.
        self.tx_pos += 1;
        if self.tx_pos >= self.tx_size {
            let msg = self.tx_msg.take().expect("tx_msg set during block-read");
            self.queues.finish_block_read(&msg, self.tx_is_scratch);
            self.reassert_if_pending();
            self.tx_is_scratch = false;
        } else {
            // Premature stop: retry the same packet from the start.
            self.tx_pos = 0;
            self.set_attention(Level::Asserted);
        }
        self.phase = Phase::Idle;
        None
    }

    fn step_block_write(&mut self, ev: BusEvent) -> Option<u8> {
        if ev.irq {
            // STOP may arrive bundled with the frame's final byte, or as its
            // own trailing event; either way push whatever byte came with it.
            if self.rx_buf.push(ev.byte).is_err() {
                log::warn!("state machine: block-write overflow, dropping byte");
            }
        } else if !ev.stop {
            self.reset_to_idle("unexpected flags in BlockWrite");
            return None;
        }
        if ev.stop {
            self.dispatch_block_write();
            self.phase = Phase::Idle;
        }
        None
    }

    fn dispatch_block_write(&mut self) {
        let Some(&cmd_byte) = self.rx_buf.first() else {
            log::warn!("state machine: empty block-write frame, dropping");
            return;
        };

        if is_event(cmd_byte) {
            self.dispatch_event(cmd_byte);
        } else {
            self.dispatch_response(cmd_byte);
        }
    }

    fn dispatch_event(&mut self, cmd_byte: u8) {
        let rest = &self.rx_buf[1..];
        match decode_event(cmd_byte, rest) {
            Some(record) => match self.event_pool.try_alloc() {
                Some(slot) => self.dispatcher.push(PooledEvent { slot, record }),
                None => log::warn!(
                    "state machine: event pool exhausted, dropping event type {}",
                    record.event_type
                ),
            },
            None => log::warn!("state machine: malformed event frame, dropping"),
        }
    }

    fn dispatch_response(&mut self, tagged_cmd: u8) {
        if self.rx_buf.len() < 4 {
            log::warn!("state machine: response frame too short, dropping");
            return;
        }
        let status = self.rx_buf[3];
        let payload = &self.rx_buf[4..];

        if let Some(pending) = self.queues.take_awaiting_by_tag(tagged_cmd) {
            {
                let mut req = pending.inner.lock().expect("request poisoned");
                req.rx_status = status;
                req.rx_payload.clear();
                let _ = req
                    .rx_payload
                    .extend_from_slice(&payload[..payload.len().min(MAX_PAYLOAD)]);
            }
            self.tag_pool.release(tagged_cmd);
            pending.signal();
        } else {
            log::warn!(
                "state machine: unsolicited response for tagged command {tagged_cmd:#04x}, dropping"
            );
        }
    }
}
