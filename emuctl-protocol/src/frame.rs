//! Fixed-size command frame.
//!
//! Frame layout (10 bytes, little-endian, no length prefix, no checksum):
//!
//! ```text
//! +---------+----------------------+
//! | opcode  | argument             |
//! | 2 bytes | 8 bytes              |
//! +---------+----------------------+
//! ```
//!
//! Reliability is whatever the stream transport provides; nothing is layered
//! on top at this level.

use crate::error::ProtocolError;
use crate::opcode::Opcode;
use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

/// Size of an encoded frame in bytes (2 + 8).
pub const FRAME_SIZE: usize = 10;

/// A single control command.
///
/// The opcode is kept as a raw `u16` so that any frame read off the wire can be
/// represented, including reserved values. Use [`CommandFrame::new`] to build
/// frames from the typed opcode table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandFrame {
    /// Wire opcode.
    pub opcode: u16,
    /// Command argument. Zero is a meaningful value, not "absent".
    pub argument: u64,
}

impl CommandFrame {
    /// Creates a frame for a known operation.
    pub fn new(opcode: Opcode, argument: u64) -> Self {
        Self {
            opcode: opcode.code(),
            argument,
        }
    }

    /// Creates a frame with the default (zero) argument.
    pub fn without_argument(opcode: Opcode) -> Self {
        Self::new(opcode, 0)
    }

    /// Creates a frame from a raw opcode value, bypassing the opcode table.
    pub fn from_raw(opcode: u16, argument: u64) -> Self {
        Self { opcode, argument }
    }

    /// Resolves the opcode against the static table.
    pub fn op(&self) -> Result<Opcode, ProtocolError> {
        Opcode::try_from(self.opcode)
    }

    /// Encodes the frame into its fixed wire representation.
    pub fn to_bytes(&self) -> [u8; FRAME_SIZE] {
        let mut out = [0u8; FRAME_SIZE];
        out[0..2].copy_from_slice(&self.opcode.to_le_bytes());
        out[2..10].copy_from_slice(&self.argument.to_le_bytes());
        out
    }

    /// Decodes a frame from its fixed wire representation.
    pub fn from_bytes(bytes: &[u8; FRAME_SIZE]) -> Self {
        let opcode = u16::from_le_bytes([bytes[0], bytes[1]]);
        let mut argument = [0u8; 8];
        argument.copy_from_slice(&bytes[2..10]);
        Self {
            opcode,
            argument: u64::from_le_bytes(argument),
        }
    }

    /// Appends the encoded frame to a buffer.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(FRAME_SIZE);
        buf.put_u16_le(self.opcode);
        buf.put_u64_le(self.argument);
    }

    /// Decodes a frame from the front of a buffer.
    ///
    /// Returns `None` if fewer than [`FRAME_SIZE`] bytes are buffered; the
    /// buffer is left untouched in that case.
    pub fn decode(buf: &mut BytesMut) -> Option<Self> {
        if buf.len() < FRAME_SIZE {
            return None;
        }
        let opcode = buf.get_u16_le();
        let argument = buf.get_u64_le();
        Some(Self { opcode, argument })
    }

    /// Decodes a slice that must hold exactly one frame.
    pub fn decode_exact(bytes: &[u8]) -> Result<Self, ProtocolError> {
        match bytes.len() {
            n if n < FRAME_SIZE => Err(ProtocolError::IncompleteFrame {
                needed: FRAME_SIZE - n,
            }),
            n if n > FRAME_SIZE => Err(ProtocolError::TrailingBytes(n - FRAME_SIZE)),
            _ => {
                let mut raw = [0u8; FRAME_SIZE];
                raw.copy_from_slice(bytes);
                Ok(Self::from_bytes(&raw))
            }
        }
    }
}

impl From<Opcode> for CommandFrame {
    fn from(op: Opcode) -> Self {
        Self::without_argument(op)
    }
}
