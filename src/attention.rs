//! The attention line: an out-of-band digital signal the AP asserts to tell
//! the EC it has packets queued.

use std::sync::{Arc, Mutex};

use embedded_hal::digital::OutputPin;

use crate::error::{BusError, Result};

/// Shared handle used by both the bus callback and caller threads. Locked
/// only for the duration of a single `set()` call — never held across a
/// sleep — so it does not participate in the queue-lock/event-lock ordering
/// discipline the rest of the driver follows.
pub type SharedAttentionLine = Arc<Mutex<Box<dyn AttentionLine>>>;

/// Logical level of the attention line. `Idle` is the electrically-high
/// resting state; `Asserted` tells the EC to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Idle,
    Asserted,
}

/// Consumed by the request path and the state machine to signal the EC.
/// Implemented for any `embedded-hal` digital output pin.
pub trait AttentionLine: Send {
    fn set(&mut self, level: Level) -> Result<()>;
}

impl<P: OutputPin + Send> AttentionLine for P {
    fn set(&mut self, level: Level) -> Result<()> {
        let result = match level {
            Level::Idle => self.set_high(),
            Level::Asserted => self.set_low(),
        };
        result.map_err(|_| BusError::AttentionLineFault.into())
    }
}
