//! Driver tunables.
//!
//! Separate from the wire protocol's fixed constants (block-read marker,
//! queue/pool sizes), which are not configurable. Values can be overridden
//! by whatever configuration layer an embedder already has; this crate only
//! consumes a [`Config`] value at [`crate::lifecycle::Lifecycle::probe`].

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Bus bring-up and request-path tunables.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Config {
    /// 7-bit slave address the bus controller answers to.
    pub slave_address: u8,
    /// Bus clock divider, in whatever units the bus port's register map uses.
    pub clock_divider: u16,
    /// Slave-mode setup delay count, passed through to the bus port.
    pub delay_count: u8,
    /// Whether to set the "new slave" bit during bring-up.
    pub new_slave: bool,
    /// Per-retry wait for a response, in milliseconds.
    pub retry_wait_ms: u32,
    /// Number of wait-then-pulse retries before a request times out.
    pub retry_count: u8,
    /// How long the attention line is held asserted during a retry pulse, in
    /// milliseconds.
    pub attention_pulse_ms: u32,
    /// Busy-wait inserted before the first byte of a block-read, in
    /// microseconds — compensates for slow bus controllers that need a
    /// moment to turn the bus around.
    pub block_read_setup_us: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            slave_address: 0x8a,
            clock_divider: 0x4f,
            delay_count: 0x59,
            new_slave: true,
            retry_wait_ms: 20,
            retry_count: 10,
            attention_pulse_ms: 10,
            block_read_setup_us: 33,
        }
    }
}

impl Config {
    /// Reject a configuration that would make the request path unusable
    /// outright, before it can fail `submit` in some confusing roundabout
    /// way. Checked once, at [`crate::lifecycle::Lifecycle::probe`].
    pub fn validate(&self) -> Result<()> {
        if self.retry_count == 0 {
            return Err(Error::Config("retry_count must be at least 1"));
        }
        Ok(())
    }
}
