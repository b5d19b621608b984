//! # emuctl-client
//!
//! Controller side of the emulator control channel.
//!
//! This crate provides:
//! - A blocking, lazily connected TCP transport with bounded timeouts
//! - Single-reconnect recovery after a fault
//! - A dispatcher with one fire-and-forget entry point per operation
//!
//! ```no_run
//! use emuctl_client::{Dispatcher, Transport, TransportConfig};
//! use std::sync::Arc;
//!
//! let config = TransportConfig::from_env().expect("endpoint");
//! let dispatcher = Dispatcher::new(Arc::new(Transport::new(config)));
//! dispatcher.snapshot_save();
//! dispatcher.reset_jit_ee_with(0x2A);
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{Endpoint, TransportConfig};
pub use dispatcher::{Delivery, Dispatcher};
pub use error::{ConfigError, TransportError};
pub use transport::{
    ConnectionState, Connector, StatsSnapshot, TcpConnector, Transport, TransportStats,
};
