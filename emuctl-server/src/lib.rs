//! # emuctl-server
//!
//! Debug endpoint for the emulator control channel.
//!
//! This crate provides:
//! - TCP connection handling with async I/O
//! - Frame stream decoding and opcode resolution
//! - Pluggable command sinks (log, JSON lines, channel)
//! - Per-connection sessions with idle timeout
//! - Prometheus metrics over HTTP

pub mod config;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod server;
pub mod session;

pub use config::{Config, ConfigError, MetricsConfig, NetworkConfig, OutputConfig, OutputMode};
pub use error::ServerError;
pub use handler::{
    ChannelSink, CommandHandler, CommandSink, JsonlSink, LogSink, ReceivedCommand,
};
pub use metrics::{run_metrics_server, Metrics};
pub use server::{Server, ServerConfig, ServerStats};
pub use session::Session;
