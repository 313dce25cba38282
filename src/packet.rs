//! Wire framing and the data model shared by the request path, the state
//! machine, and the event dispatcher.
//!
//! All packets share one envelope: a command byte (bit 7 distinguishes
//! command/response from event), an optional size byte, an optional
//! subcommand byte, and payload. See the module-level docs on
//! [`crate::state_machine`] for how bytes are streamed on and off the bus.

use heapless::Vec;

/// Maximum in-band payload, in bytes.
pub const MAX_PAYLOAD: usize = 32;

/// Command code the EC issues to request the AP transmit its next queued
/// packet.
pub const BLOCK_READ_MARKER: u8 = 0x01;

/// Pack a 3-bit tag and 4-bit command code into a tagged-command byte.
#[must_use]
pub const fn tagged_command(tag: u8, cmd: u8) -> u8 {
    ((tag & 0x07) << 4) | (cmd & 0x0F)
}

/// Split a tagged-command byte back into `(tag, cmd)`.
#[must_use]
pub const fn split_tagged_command(byte: u8) -> (u8, u8) {
    ((byte >> 4) & 0x07, byte & 0x0F)
}

/// A request/response in flight: the packet a caller asked to send, plus the
/// slot that will hold whatever comes back.
///
/// Linked on exactly one of the two [`crate::queue::Queues`] lists between
/// submission and completion (or timeout).
#[derive(Debug, Clone)]
pub struct Request {
    /// Tagged command byte this request was sent under.
    pub tagged_cmd: u8,
    pub subcmd: u8,
    pub tx_payload: Vec<u8, MAX_PAYLOAD>,
    /// Set once a response has matched this request.
    pub rx_status: u8,
    pub rx_payload: Vec<u8, MAX_PAYLOAD>,
}

impl Request {
    #[must_use]
    pub fn new(tagged_cmd: u8, subcmd: u8, tx_payload: &[u8]) -> Self {
        let mut tx = Vec::new();
        let _ = tx.extend_from_slice(&tx_payload[..tx_payload.len().min(MAX_PAYLOAD)]);
        Self {
            tagged_cmd,
            subcmd,
            tx_payload: tx,
            rx_status: 0,
            rx_payload: Vec::new(),
        }
    }

    /// A minimal well-formed response with no payload, used when the EC
    /// polls and no caller request is pending.
    #[must_use]
    pub fn no_op(control_cmd: u8, no_op_subcmd: u8) -> Self {
        Self::new(control_cmd, no_op_subcmd, &[])
    }

    /// The wire "size" byte: payload length plus two (subcommand and the
    /// paired status/placeholder byte).
    #[must_use]
    pub fn size_field(&self) -> u8 {
        self.tx_payload.len() as u8 + 2
    }

    /// Encode the outbound stream as transmitted during a block-read:
    /// `[size, tagged_cmd, subcmd, ...payload]`.
    #[must_use]
    pub fn encode(&self) -> Vec<u8, { MAX_PAYLOAD + 3 }> {
        let mut out = Vec::new();
        let _ = out.push(self.size_field());
        let _ = out.push(self.tagged_cmd);
        let _ = out.push(self.subcmd);
        let _ = out.extend_from_slice(&self.tx_payload);
        out
    }

    /// Number of bytes the state machine should stream out for this packet,
    /// including the size byte itself.
    #[must_use]
    pub fn tx_size(&self) -> usize {
        usize::from(self.size_field()) + 1
    }
}

/// Two-bit length class carried in bits 5-6 of an event command byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthClass {
    Fixed2,
    Fixed3,
    Variable,
    Reserved,
}

impl LengthClass {
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Self::Fixed2,
            1 => Self::Fixed3,
            2 => Self::Variable,
            _ => Self::Reserved,
        }
    }

    const fn to_bits(self) -> u8 {
        match self {
            Self::Fixed2 => 0,
            Self::Fixed3 => 1,
            Self::Variable => 2,
            Self::Reserved => 3,
        }
    }
}

/// An unsolicited notification from the EC.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub event_type: u8,
    pub status: u8,
    pub payload: Vec<u8, MAX_PAYLOAD>,
}

/// Build an event command byte: bit7 set, `class` in bits 5-6, `error` in
/// bit 4, `event_type` in bits 0-3.
#[must_use]
pub const fn event_command_byte(class: LengthClass, error: bool, event_type: u8) -> u8 {
    0x80 | (class.to_bits() << 5) | ((error as u8) << 4) | (event_type & 0x0F)
}

#[must_use]
pub const fn is_event(command_byte: u8) -> bool {
    command_byte & 0x80 != 0
}

const fn event_length_class(command_byte: u8) -> LengthClass {
    LengthClass::from_bits(command_byte >> 5)
}

const fn event_error_flag(command_byte: u8) -> bool {
    command_byte & 0x10 != 0
}

const fn event_type(command_byte: u8) -> u8 {
    command_byte & 0x0F
}

/// Decode an event frame from the bytes that followed the command byte
/// (`rest`). Returns `None` if the frame is truncated or the length class is
/// reserved.
#[must_use]
pub fn decode_event(command_byte: u8, rest: &[u8]) -> Option<EventRecord> {
    let error = event_error_flag(command_byte);
    let kind = event_type(command_byte);

    let (status, payload): (u8, &[u8]) = match event_length_class(command_byte) {
        LengthClass::Fixed2 => {
            let data = *rest.first()?;
            if error {
                (data, &[])
            } else {
                (0, &rest[..1])
            }
        }
        LengthClass::Fixed3 => {
            if rest.len() < 2 {
                return None;
            }
            if error {
                (rest[0], &rest[1..2])
            } else {
                (0, &rest[..2])
            }
        }
        LengthClass::Variable => {
            let size = *rest.first()? as usize;
            let body = rest.get(1..1 + size)?;
            if error {
                let status = *body.first()?;
                (status, &body[1..])
            } else {
                (0, body)
            }
        }
        LengthClass::Reserved => return None,
    };

    let mut buf = Vec::new();
    let _ = buf.extend_from_slice(&payload[..payload.len().min(MAX_PAYLOAD)]);
    Some(EventRecord {
        event_type: kind,
        status,
        payload: buf,
    })
}

/// Encode an event frame: the command byte plus whatever follows it on the
/// wire. Inverse of [`decode_event`] for the byte sequence after the command
/// byte (used by property tests and the bus simulator).
#[must_use]
pub fn encode_event(record: &EventRecord, class: LengthClass) -> Vec<u8, { MAX_PAYLOAD + 3 }> {
    let error = record.status != 0;
    let cmd = event_command_byte(class, error, record.event_type);
    let mut out: Vec<u8, { MAX_PAYLOAD + 3 }> = Vec::new();
    let _ = out.push(cmd);
    match class {
        LengthClass::Fixed2 => {
            if error {
                let _ = out.push(record.status);
            } else {
                let _ = out.extend_from_slice(&record.payload);
            }
        }
        LengthClass::Fixed3 => {
            if error {
                let _ = out.push(record.status);
                let _ = out.extend_from_slice(&record.payload);
            } else {
                let _ = out.extend_from_slice(&record.payload);
            }
        }
        LengthClass::Variable => {
            let body_len = record.payload.len() + usize::from(error);
            let _ = out.push(body_len as u8);
            if error {
                let _ = out.push(record.status);
            }
            let _ = out.extend_from_slice(&record.payload);
        }
        LengthClass::Reserved => {}
    }
    out
}
