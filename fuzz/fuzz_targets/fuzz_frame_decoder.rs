//! Fuzz target: `packet::decode_event`
//!
//! Drives arbitrary command bytes and trailing frame bytes into the event
//! decoder and asserts it never panics and never yields an
//! out-of-bounds payload, regardless of what a misbehaving or hostile EC
//! writes onto the bus.
//!
//! cargo fuzz run fuzz_frame_decoder

#![no_main]

use eci::packet::{decode_event, MAX_PAYLOAD};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&cmd_byte, rest)) = data.split_first() else {
        return;
    };

    if let Some(record) = decode_event(cmd_byte, rest) {
        assert!(record.payload.len() <= MAX_PAYLOAD);
    }
});
