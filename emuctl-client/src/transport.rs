//! Reconnecting command transport.
//!
//! A [`Transport`] owns at most one live stream to the debug endpoint. Every
//! state transition and every write happens inside one mutex, so concurrent
//! callers never interleave partial frames and never race on the connection
//! state. Connects and writes are bounded by the configured timeouts; nothing
//! here retries on its own.

use crate::config::{Endpoint, TransportConfig, MIN_TIMEOUT};
use crate::error::TransportError;
use emuctl_protocol::{CommandFrame, ProtocolError, FRAME_SIZE};
use parking_lot::Mutex;
use std::fmt;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Connection state, owned by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// No connection and no failure recorded.
    Disconnected = 0,
    /// A connect attempt is in progress.
    Connecting = 1,
    /// A stream is open.
    Connected = 2,
    /// The last connect or send failed; the next send reconnects once.
    Faulted = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Faulted,
            _ => ConnectionState::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Faulted => "faulted",
        };
        f.write_str(s)
    }
}

/// Opens streams to the endpoint.
pub trait Connector: Send + Sync + 'static {
    type Stream: Read + Write + Send + 'static;

    /// Makes a single connection attempt bounded by `config.connect_timeout`.
    fn connect(&self, config: &TransportConfig) -> io::Result<Self::Stream>;
}

/// Plain TCP connector.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&self, config: &TransportConfig) -> io::Result<TcpStream> {
        let addr = config.endpoint.addr();
        let stream = TcpStream::connect_timeout(&addr, config.connect_timeout.max(MIN_TIMEOUT))?;

        // Configure TCP options before the first frame goes out
        stream.set_nodelay(config.nodelay)?;
        stream.set_write_timeout(Some(config.write_timeout.max(MIN_TIMEOUT)))?;
        stream.set_read_timeout(Some(config.read_timeout.max(MIN_TIMEOUT)))?;
        Ok(stream)
    }
}

/// Transport counters. Failures surface here instead of in the caller's
/// control flow.
#[derive(Debug, Default)]
pub struct TransportStats {
    pub connect_attempts: AtomicU64,
    pub connect_failures: AtomicU64,
    pub frames_sent: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub send_failures: AtomicU64,
    pub commands_dropped: AtomicU64,
}

impl TransportStats {
    /// Returns a point-in-time copy of the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            commands_dropped: self.commands_dropped.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_dropped(&self) {
        self.commands_dropped.fetch_add(1, Ordering::Relaxed);
    }
}

/// Copy of [`TransportStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub connect_attempts: u64,
    pub connect_failures: u64,
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub send_failures: u64,
    pub commands_dropped: u64,
}

struct Inner<S> {
    stream: Option<S>,
    last_error: Option<String>,
}

/// Process-wide command transport.
///
/// Construct once at startup, share through an `Arc`, and close at shutdown.
pub struct Transport<C: Connector = TcpConnector> {
    config: TransportConfig,
    connector: C,
    inner: Mutex<Inner<C::Stream>>,
    /// Mirror of the state for lock-free observers. Written only while
    /// `inner` is held.
    state: AtomicU8,
    stats: TransportStats,
}

impl Transport<TcpConnector> {
    /// Creates a TCP transport (not yet connected).
    pub fn new(config: TransportConfig) -> Self {
        Self::with_connector(config, TcpConnector)
    }
}

impl<C: Connector> Transport<C> {
    /// Creates a transport with a custom connector (not yet connected).
    pub fn with_connector(config: TransportConfig, connector: C) -> Self {
        Self {
            config,
            connector,
            inner: Mutex::new(Inner {
                stream: None,
                last_error: None,
            }),
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
            stats: TransportStats::default(),
        }
    }

    /// Connects if not already connected.
    ///
    /// A failed attempt leaves the transport `Faulted` and returns the error;
    /// it is never retried here.
    pub fn connect(&self) -> Result<(), TransportError> {
        let mut inner = self.inner.lock();
        self.connect_locked(&mut inner)
    }

    /// Writes `bytes` in a single write, connecting first if needed.
    ///
    /// At most one connect attempt and one write attempt are made per call.
    /// A short write counts as a failure and faults the connection.
    pub fn send(&self, bytes: &[u8]) -> Result<usize, TransportError> {
        let mut inner = self.inner.lock();
        self.connect_locked(&mut inner)?;

        let stream = inner.stream.as_mut().ok_or(TransportError::NotConnected)?;
        let result = stream.write(bytes).and_then(|n| {
            stream.flush()?;
            Ok(n)
        });

        match result {
            Ok(n) if n == bytes.len() => {
                self.stats.frames_sent.fetch_add(1, Ordering::Relaxed);
                self.stats.bytes_sent.fetch_add(n as u64, Ordering::Relaxed);
                tracing::trace!("Sent {} bytes to {}", n, self.config.endpoint);
                Ok(n)
            }
            Ok(n) => {
                let err = TransportError::ShortWrite {
                    written: n,
                    expected: bytes.len(),
                };
                Err(self.fault_locked(&mut inner, err))
            }
            Err(e) => Err(self.fault_locked(&mut inner, TransportError::Send(e))),
        }
    }

    /// Encodes and sends one frame.
    pub fn send_frame(&self, frame: &CommandFrame) -> Result<usize, TransportError> {
        self.send(&frame.to_bytes())
    }

    /// Reads one reply frame from the open connection.
    ///
    /// Does not connect. A reply cut short by the read timeout is reported as
    /// `MalformedReply` and leaves the connection as it is; a closed or broken
    /// stream faults it, even mid-frame.
    ///
    /// Holds the transport lock for up to `read_timeout`, so concurrent
    /// `send` calls wait for the read to finish before their own write
    /// timeout starts.
    pub fn recv_frame(&self) -> Result<CommandFrame, TransportError> {
        let mut inner = self.inner.lock();
        let stream = inner.stream.as_mut().ok_or(TransportError::NotConnected)?;

        let mut buf = [0u8; FRAME_SIZE];
        let mut filled = 0;
        let outcome = loop {
            if filled == FRAME_SIZE {
                break Ok(());
            }
            match stream.read(&mut buf[filled..]) {
                Ok(0) => break Err(None),
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => break Err(Some(e)),
            }
        };

        match outcome {
            Ok(()) => Ok(CommandFrame::from_bytes(&buf)),
            Err(None) => Err(self.fault_locked(&mut inner, TransportError::ConnectionClosed)),
            Err(Some(e))
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                if filled > 0 {
                    tracing::debug!("Discarding {}-byte partial reply", filled);
                    Err(TransportError::MalformedReply(
                        ProtocolError::IncompleteFrame {
                            needed: FRAME_SIZE - filled,
                        },
                    ))
                } else {
                    Err(TransportError::Timeout)
                }
            }
            Err(Some(e)) => Err(self.fault_locked(&mut inner, TransportError::Io(e))),
        }
    }

    /// Releases the connection. Safe to call repeatedly.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        if inner.stream.take().is_some() {
            tracing::debug!("Closed connection to {}", self.config.endpoint);
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Returns the current connection state without taking the lock.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Returns whether a stream is open.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Returns the reason for the most recent failure, if any.
    pub fn last_error(&self) -> Option<String> {
        self.inner.lock().last_error.clone()
    }

    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.config.endpoint
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    fn connect_locked(&self, inner: &mut Inner<C::Stream>) -> Result<(), TransportError> {
        if self.state() == ConnectionState::Connected && inner.stream.is_some() {
            return Ok(());
        }

        // Drop whatever a previous fault left behind before dialing again
        inner.stream = None;
        self.set_state(ConnectionState::Connecting);
        self.stats.connect_attempts.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Connecting to {}...", self.config.endpoint);

        match self.connector.connect(&self.config) {
            Ok(stream) => {
                inner.stream = Some(stream);
                self.set_state(ConnectionState::Connected);
                tracing::debug!("Connected to {}", self.config.endpoint);
                Ok(())
            }
            Err(source) => {
                self.stats.connect_failures.fetch_add(1, Ordering::Relaxed);
                let err = TransportError::Connect {
                    endpoint: self.config.endpoint.to_string(),
                    source,
                };
                inner.last_error = Some(err.to_string());
                self.set_state(ConnectionState::Faulted);
                tracing::debug!("{}", err);
                Err(err)
            }
        }
    }

    fn fault_locked(&self, inner: &mut Inner<C::Stream>, err: TransportError) -> TransportError {
        if matches!(
            err,
            TransportError::Send(_) | TransportError::ShortWrite { .. }
        ) {
            self.stats.send_failures.fetch_add(1, Ordering::Relaxed);
        }
        inner.stream = None;
        inner.last_error = Some(err.to_string());
        self.set_state(ConnectionState::Faulted);
        tracing::debug!("Connection to {} faulted: {}", self.config.endpoint, err);
        err
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

impl<C: Connector> fmt::Debug for Transport<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("endpoint", &self.config.endpoint.to_string())
            .field("state", &self.state())
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}
