//! Per-command-code tag allocation.
//!
//! Sixteen command codes each get an independent 8-slot occupancy bitmap, so
//! up to eight concurrent requests sharing a command code can be in flight
//! without colliding on `(command, tag)`. [`TagPool::acquire`] may block the
//! caller; [`TagPool::release`] must be callable from any context, including
//! the bus callback, and never sleeps.

use std::sync::{Condvar, Mutex};

use crate::packet::tagged_command;

const COMMANDS: usize = 16;
const SLOTS_PER_COMMAND: u8 = 8;

struct Slots {
    occupied: [u8; COMMANDS],
}

/// Blocking-safe allocator for `(command, tag)` pairs.
pub struct TagPool {
    slots: Mutex<Slots>,
    freed: Condvar,
}

impl TagPool {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Slots {
                occupied: [0; COMMANDS],
            }),
            freed: Condvar::new(),
        }
    }

    /// Block until a tag is available for `cmd` and return the tagged
    /// command byte. Must not be called from the bus callback.
    pub fn acquire(&self, cmd: u8) -> u8 {
        let idx = usize::from(cmd & 0x0F);
        let mut guard = self.slots.lock().expect("tag pool mutex poisoned");
        loop {
            if let Some(tag) = first_clear_bit(guard.occupied[idx]) {
                guard.occupied[idx] |= 1 << tag;
                log::trace!("tag_pool: acquired cmd={cmd:#04x} tag={tag}");
                return tagged_command(tag, cmd);
            }
            log::debug!("tag_pool: cmd={cmd:#04x} exhausted, waiting");
            guard = self.freed.wait(guard).expect("tag pool mutex poisoned");
        }
    }

    /// Release a previously-acquired tag. Safe to call from the bus
    /// callback: never blocks.
    pub fn release(&self, tagged_cmd: u8) {
        let (tag, cmd) = crate::packet::split_tagged_command(tagged_cmd);
        let idx = usize::from(cmd);
        let mut guard = self.slots.lock().expect("tag pool mutex poisoned");
        guard.occupied[idx] &= !(1 << tag);
        drop(guard);
        self.freed.notify_one();
    }
}

impl Default for TagPool {
    fn default() -> Self {
        Self::new()
    }
}

fn first_clear_bit(map: u8) -> Option<u8> {
    (0..SLOTS_PER_COMMAND).find(|&bit| map & (1 << bit) == 0)
}
