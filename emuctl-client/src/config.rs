//! Transport configuration.
//!
//! The endpoint is resolved once when the configuration is built and is never
//! re-resolved afterwards. Environment variables:
//! - `EMUCTL_ENDPOINT` (`host:port`)
//! - `EMUCTL_CONNECT_TIMEOUT_MS`
//! - `EMUCTL_WRITE_TIMEOUT_MS`
//! - `EMUCTL_READ_TIMEOUT_MS`

use crate::error::ConfigError;
use emuctl_protocol::{DEFAULT_HOST, DEFAULT_PORT};
use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;
use std::time::Duration;

/// Smallest timeout the transport will apply. Socket APIs reject zero.
pub const MIN_TIMEOUT: Duration = Duration::from_millis(1);

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Default write timeout.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Default reply read timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Debug endpoint address, resolved once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
    addr: SocketAddr,
}

impl Endpoint {
    /// Resolves `host:port`, keeping the first address returned.
    pub fn resolve(host: impl Into<String>, port: u16) -> Result<Self, ConfigError> {
        let host = host.into();
        let display = format_host_port(&host, port);
        let addr = (host.as_str(), port)
            .to_socket_addrs()
            .map_err(|source| ConfigError::Resolve {
                endpoint: display.clone(),
                source,
            })?
            .next()
            .ok_or(ConfigError::NoAddress(display))?;
        Ok(Self { host, port, addr })
    }

    /// Builds an endpoint from an already resolved address.
    pub fn from_addr(addr: SocketAddr) -> Self {
        Self {
            host: addr.ip().to_string(),
            port: addr.port(),
            addr,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT));
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            addr,
        }
    }
}

/// Parses `host:port`, `[v6]:port`, or a bare host (default port).
impl FromStr for Endpoint {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ConfigError::InvalidEndpoint(s.to_string()));
        }
        if let Ok(addr) = s.parse::<SocketAddr>() {
            return Ok(Self::from_addr(addr));
        }

        let (host, port) = match s.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| ConfigError::InvalidEndpoint(s.to_string()))?;
                (host, port)
            }
            Some(_) => return Err(ConfigError::InvalidEndpoint(s.to_string())),
            None => (s, DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err(ConfigError::InvalidEndpoint(s.to_string()));
        }
        Self::resolve(host, port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_host_port(&self.host, self.port))
    }
}

fn format_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Debug endpoint.
    pub endpoint: Endpoint,
    /// Upper bound on a single connect attempt.
    pub connect_timeout: Duration,
    /// Upper bound on a single frame write.
    pub write_timeout: Duration,
    /// Upper bound on a single reply read.
    pub read_timeout: Duration,
    /// Disable Nagle so small frames go out immediately.
    pub nodelay: bool,
}

impl TransportConfig {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            nodelay: true,
        }
    }

    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let endpoint = match std::env::var("EMUCTL_ENDPOINT") {
            Ok(value) => value.parse()?,
            Err(_) => Endpoint::default(),
        };
        let mut config = Self::new(endpoint);
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(timeout) = env_millis("EMUCTL_CONNECT_TIMEOUT_MS") {
            self.connect_timeout = timeout.max(MIN_TIMEOUT);
        }
        if let Some(timeout) = env_millis("EMUCTL_WRITE_TIMEOUT_MS") {
            self.write_timeout = timeout.max(MIN_TIMEOUT);
        }
        if let Some(timeout) = env_millis("EMUCTL_READ_TIMEOUT_MS") {
            self.read_timeout = timeout.max(MIN_TIMEOUT);
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout.max(MIN_TIMEOUT);
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout.max(MIN_TIMEOUT);
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout.max(MIN_TIMEOUT);
        self
    }

    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::new(Endpoint::default())
    }
}

fn env_millis(var: &str) -> Option<Duration> {
    let value = std::env::var(var).ok()?;
    match value.parse::<u64>() {
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(_) => {
            tracing::warn!("Ignoring {}={:?}: not a millisecond count", var, value);
            None
        }
    }
}
