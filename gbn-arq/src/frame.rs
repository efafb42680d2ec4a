//! Wire-format definitions for protocol frames.
//!
//! Every datagram exchanged between the endpoints is a [`Frame`] of exactly
//! [`FRAME_LEN`] bytes.  This module is responsible for:
//! - Defining the on-wire binary layout (kind, sequence number, length, payload).
//! - Serialising a [`Frame`] into a fixed-size buffer ready for transmission.
//! - Deserialising a raw datagram back into a [`Frame`], returning errors for
//!   truncated or malformed input.
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |             Kind              |        Sequence Number        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Payload Length                         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                Payload (30 bytes, zero padded) ...            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total frame size: [`FRAME_LEN`] = 38 bytes.
//! kind(2) + seq(2) + length(4) + payload(30)

use thiserror::Error;

use crate::seq::MAX_SEQ;

/// Capacity of the payload slot; also the chunk size used by the sender.
pub const PAYLOAD_CAPACITY: usize = 30;

/// Byte length of the fixed header.
pub const HEADER_LEN: usize = 8;

/// Byte length of every frame on the wire.
pub const FRAME_LEN: usize = HEADER_LEN + PAYLOAD_CAPACITY;

// Byte offsets of each field within the serialised frame.
const OFF_KIND: usize = 0;
const OFF_SEQ: usize = 2;
const OFF_LEN: usize = 4;

/// What a frame means to its receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Cumulative acknowledgement of Data frames.
    Ack,
    /// A chunk of the transferred file.
    Data,
    /// Acknowledgement of an end-of-transmission frame.
    EotAck,
    /// End of transmission; no more Data follows.
    Eot,
}

impl FrameKind {
    /// Integer code used on the wire.
    pub fn code(self) -> u16 {
        match self {
            FrameKind::Ack => 0,
            FrameKind::Data => 1,
            FrameKind::EotAck => 2,
            FrameKind::Eot => 3,
        }
    }

    /// Inverse of [`FrameKind::code`].
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(FrameKind::Ack),
            1 => Some(FrameKind::Data),
            2 => Some(FrameKind::EotAck),
            3 => Some(FrameKind::Eot),
            _ => None,
        }
    }
}

impl std::fmt::Display for FrameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FrameKind::Ack => "ACK",
            FrameKind::Data => "DATA",
            FrameKind::EotAck => "EOT-ACK",
            FrameKind::Eot => "EOT",
        };
        f.write_str(name)
    }
}

/// Errors that can arise when building or parsing a frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("datagram of {0} bytes is shorter than a {FRAME_LEN}-byte frame")]
    Truncated(usize),
    #[error("datagram of {0} bytes is longer than a {FRAME_LEN}-byte frame")]
    Oversized(usize),
    #[error("unknown frame kind {0}")]
    UnknownKind(u16),
    #[error("sequence number {0} outside [0, {MAX_SEQ})")]
    SeqOutOfRange(u16),
    #[error("declared payload length {0} exceeds capacity {PAYLOAD_CAPACITY}")]
    LengthOutOfRange(u32),
    #[error("payload of {0} bytes exceeds capacity {PAYLOAD_CAPACITY}")]
    PayloadTooLong(usize),
}

/// A complete protocol frame.
///
/// The payload slot always holds [`PAYLOAD_CAPACITY`] bytes; only the first
/// `length` of them are meaningful, the rest are zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub seq: u8,
    length: u32,
    payload: [u8; PAYLOAD_CAPACITY],
}

impl Frame {
    fn control(kind: FrameKind, seq: u8) -> Self {
        Self {
            kind,
            seq: seq % MAX_SEQ,
            length: 0,
            payload: [0u8; PAYLOAD_CAPACITY],
        }
    }

    /// Build a Data frame carrying `chunk`.
    pub fn data(seq: u8, chunk: &[u8]) -> Result<Self, FrameError> {
        if chunk.len() > PAYLOAD_CAPACITY {
            return Err(FrameError::PayloadTooLong(chunk.len()));
        }
        let mut payload = [0u8; PAYLOAD_CAPACITY];
        payload[..chunk.len()].copy_from_slice(chunk);
        Ok(Self {
            kind: FrameKind::Data,
            seq: seq % MAX_SEQ,
            length: chunk.len() as u32,
            payload,
        })
    }

    pub fn ack(seq: u8) -> Self {
        Self::control(FrameKind::Ack, seq)
    }

    pub fn eot(seq: u8) -> Self {
        Self::control(FrameKind::Eot, seq)
    }

    pub fn eot_ack(seq: u8) -> Self {
        Self::control(FrameKind::EotAck, seq)
    }

    /// Declared payload length.
    pub fn len(&self) -> usize {
        self.length as usize
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The meaningful payload bytes, `payload[..length]`.
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.length as usize]
    }

    /// Serialise this frame into a fixed-size buffer.
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut buf = [0u8; FRAME_LEN];
        buf[OFF_KIND..OFF_KIND + 2].copy_from_slice(&self.kind.code().to_be_bytes());
        buf[OFF_SEQ..OFF_SEQ + 2].copy_from_slice(&u16::from(self.seq).to_be_bytes());
        buf[OFF_LEN..OFF_LEN + 4].copy_from_slice(&self.length.to_be_bytes());
        buf[HEADER_LEN..].copy_from_slice(&self.payload);
        buf
    }

    /// Parse a [`Frame`] from a raw datagram.
    ///
    /// Returns [`Err`] if:
    /// - `buf` is not exactly [`FRAME_LEN`] bytes,
    /// - the kind code is unknown,
    /// - the sequence number is outside `[0, MAX_SEQ)`, or
    /// - the declared length exceeds [`PAYLOAD_CAPACITY`].
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        if buf.len() < FRAME_LEN {
            return Err(FrameError::Truncated(buf.len()));
        }
        if buf.len() > FRAME_LEN {
            return Err(FrameError::Oversized(buf.len()));
        }

        let code = u16::from_be_bytes([buf[OFF_KIND], buf[OFF_KIND + 1]]);
        let seq = u16::from_be_bytes([buf[OFF_SEQ], buf[OFF_SEQ + 1]]);
        let length = u32::from_be_bytes([
            buf[OFF_LEN],
            buf[OFF_LEN + 1],
            buf[OFF_LEN + 2],
            buf[OFF_LEN + 3],
        ]);

        let kind = FrameKind::from_code(code).ok_or(FrameError::UnknownKind(code))?;
        if seq >= u16::from(MAX_SEQ) {
            return Err(FrameError::SeqOutOfRange(seq));
        }
        if length as usize > PAYLOAD_CAPACITY {
            return Err(FrameError::LengthOutOfRange(length));
        }

        let mut payload = [0u8; PAYLOAD_CAPACITY];
        payload.copy_from_slice(&buf[HEADER_LEN..]);

        Ok(Frame {
            kind,
            seq: seq as u8,
            length,
            payload,
        })
    }
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            FrameKind::Data => write!(f, "{} seq={} len={}", self.kind, self.seq, self.length),
            _ => write!(f, "{} seq={}", self.kind, self.seq),
        }
    }
}
