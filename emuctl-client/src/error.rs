//! Client error types.

use emuctl_protocol::ProtocolError;
use std::io;
use thiserror::Error;

/// Transport errors.
///
/// None of these are fatal; the dispatcher turns them into log lines and
/// counters, and the next send reconnects.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect to {endpoint} failed: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("send failed: {0}")]
    Send(#[source] io::Error),

    #[error("short write: {written} of {expected} bytes accepted")]
    ShortWrite { written: usize, expected: usize },

    #[error("not connected")]
    NotConnected,

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("reply timeout")]
    Timeout,

    #[error("malformed reply: {0}")]
    MalformedReply(#[from] ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Returns whether a later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::MalformedReply(_))
    }

    /// Short label for logs and counters.
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Connect { .. } => "connect",
            TransportError::Send(_) | TransportError::ShortWrite { .. } => "send",
            TransportError::NotConnected => "not_connected",
            TransportError::ConnectionClosed => "closed",
            TransportError::Timeout => "timeout",
            TransportError::MalformedReply(_) => "malformed_reply",
            TransportError::Io(_) => "io",
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid endpoint '{0}': expected host:port")]
    InvalidEndpoint(String),

    #[error("failed to resolve endpoint '{endpoint}': {source}")]
    Resolve {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("endpoint '{0}' resolved to no addresses")]
    NoAddress(String),
}
