//! Unified error types for the ECI driver.
//!
//! A single `Error` enum that every fallible public operation funnels into,
//! keeping the request path, lifecycle, and dispatcher's error handling
//! uniform. Protocol noise observed by the state machine (drops, unsolicited
//! responses, pool exhaustion) never reaches this type — it is logged and
//! recovered locally; only caller-visible outcomes are represented here.

use core::fmt;

/// Crate-wide error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// No response arrived within the retry budget.
    Timeout,
    /// The EC returned a non-zero status byte.
    RemoteError(u8),
    /// The bus is not currently enabled (suspended or not yet probed).
    Suspended,
    /// The bus port reported a hardware-level failure.
    Bus(BusError),
    /// Bring-up failed (handshake with the EC did not complete).
    Init(&'static str),
    /// Configuration is invalid.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "request timed out"),
            Self::RemoteError(status) => write!(f, "remote error, status={status:#04x}"),
            Self::Suspended => write!(f, "bus suspended"),
            Self::Bus(e) => write!(f, "bus: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

/// Failures reported by the bus port abstraction itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// The attention-line GPIO could not be driven.
    AttentionLineFault,
    /// The underlying bus controller reported a fault condition.
    ControllerFault,
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AttentionLineFault => write!(f, "attention line fault"),
            Self::ControllerFault => write!(f, "controller fault"),
        }
    }
}

impl From<BusError> for Error {
    fn from(e: BusError) -> Self {
        Self::Bus(e)
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
