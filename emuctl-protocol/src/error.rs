//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors that can occur while framing or resolving commands.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unknown opcode: {0:#x}")]
    UnknownOpcode(u16),

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("incomplete frame: need {needed} more bytes")]
    IncompleteFrame { needed: usize },

    #[error("trailing bytes after frame: {0}")]
    TrailingBytes(usize),
}
