//! A simulated EC driving [`eci::lifecycle::Core`] through its public API,
//! standing in for the real bus hardware and interrupt wiring that lives
//! outside this crate.

use std::sync::{Arc, Mutex};

use eci::attention::{AttentionLine, Level, SharedAttentionLine};
use eci::bus::BusPort;
use eci::lifecycle::Core;
use eci::state_machine::BusEvent;

pub struct NullBus;

impl BusPort for NullBus {
    fn clear_received(&mut self) {}
    fn busy_wait_micros(&mut self, _micros: u32) {}
}

pub struct RecordingPin {
    pub asserted: bool,
}

impl AttentionLine for RecordingPin {
    fn set(&mut self, level: Level) -> eci::Result<()> {
        self.asserted = level == Level::Asserted;
        Ok(())
    }
}

#[must_use]
pub fn shared_pin() -> SharedAttentionLine {
    Arc::new(Mutex::new(Box::new(RecordingPin { asserted: false })))
}

fn addr_event(addr: u8) -> BusEvent {
    BusEvent {
        irq: true,
        start: true,
        stop: false,
        rnw: false,
        byte: addr,
    }
}

fn cmd_event(byte: u8) -> BusEvent {
    BusEvent {
        irq: true,
        start: false,
        stop: false,
        rnw: false,
        byte,
    }
}

/// Drive a full SMBus block-read: address, the `0x01` block-read marker,
/// then repeated RNW polls until every declared byte is read, followed by a
/// final STOP poll. Returns every byte the AP transmitted (`[size, tagged_cmd,
/// subcmd, ...payload]`).
pub fn perform_block_read(core: &Core, addr: u8) -> Vec<u8> {
    let mut bus = NullBus;
    core.on_bus_event(&mut bus, addr_event(addr));
    core.on_bus_event(&mut bus, cmd_event(0x01));

    let mut out = Vec::new();
    let first = core
        .on_bus_event(
            &mut bus,
            BusEvent {
                irq: true,
                start: true,
                stop: false,
                rnw: true,
                byte: 0,
            },
        )
        .expect("AP must transmit the size byte to begin a block-read");
    out.push(first);
    let total = usize::from(first) + 1;

    while out.len() < total {
        let byte = core
            .on_bus_event(
                &mut bus,
                BusEvent {
                    irq: true,
                    start: false,
                    stop: false,
                    rnw: true,
                    byte: 0,
                },
            )
            .expect("AP must keep transmitting until the declared size is reached");
        out.push(byte);
    }

    core.on_bus_event(
        &mut bus,
        BusEvent {
            irq: true,
            start: false,
            stop: true,
            rnw: true,
            byte: 0,
        },
    );
    out
}

/// Drive a full SMBus block-write: address, a plain (non-block-read) command
/// byte, then the remaining frame bytes, terminated by STOP.
pub fn perform_block_write(core: &Core, addr: u8, frame: &[u8]) {
    let mut bus = NullBus;
    assert!(!frame.is_empty(), "frame must include at least the command byte");
    core.on_bus_event(&mut bus, addr_event(addr));
    let (first, rest) = frame.split_first().unwrap();
    core.on_bus_event(&mut bus, cmd_event(*first));
    for (i, &byte) in rest.iter().enumerate() {
        let is_last = i + 1 == rest.len();
        core.on_bus_event(
            &mut bus,
            BusEvent {
                irq: true,
                start: false,
                stop: is_last,
                rnw: false,
                byte,
            },
        );
    }
}
