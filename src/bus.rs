//! The bus port: the boundary between the slave state machine and whatever
//! low-level serial-bus controller the target actually has.
//!
//! Register maps, clock setup, and interrupt wiring are all out of scope —
//! they live on the other side of this trait, which only carries the two
//! workaround hooks the hardware occasionally requires. The status/byte
//! pair delivered per callback is [`crate::state_machine::BusEvent`].

/// Hooks the state machine needs from the underlying bus controller beyond
/// the byte stream itself. Implemented by board/SoC-specific glue; not
/// implemented by this crate.
pub trait BusPort: Send {
    /// Clear whatever "byte received" latch the controller uses, typically
    /// needed right after the address byte on controllers that otherwise
    /// re-deliver it.
    fn clear_received(&mut self);

    /// Busy-wait for approximately `micros` microseconds. Used before the
    /// first byte of a block-read on controllers that need a moment to turn
    /// the bus around. Must not sleep in a way that yields the interrupt
    /// context.
    fn busy_wait_micros(&mut self, micros: u32);
}
