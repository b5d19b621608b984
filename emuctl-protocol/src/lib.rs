//! # emuctl-protocol
//!
//! Wire protocol for the emulator control channel.
//!
//! This crate provides:
//! - The static opcode table (`Opcode`)
//! - Fixed 10-byte command frames (`CommandFrame`)
//! - A buffering decoder for frame streams (`FrameDecoder`)
//! - Protocol error types

pub mod codec;
pub mod error;
pub mod frame;
pub mod opcode;

pub use codec::FrameDecoder;
pub use error::ProtocolError;
pub use frame::{CommandFrame, FRAME_SIZE};
pub use opcode::{Category, Opcode};

/// Default port of the emulator debug endpoint.
pub const DEFAULT_PORT: u16 = 8171;

/// Default host of the emulator debug endpoint.
pub const DEFAULT_HOST: &str = "127.0.0.1";
