//! Endpoint configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via EMUCTL_CONFIG)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Endpoint configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network configuration.
    pub network: NetworkConfig,
    /// Where received commands go.
    pub output: OutputConfig,
    /// Metrics configuration.
    pub metrics: MetricsConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("EMUCTL_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        self.network.apply_env_overrides();
        self.output.apply_env_overrides();
        self.metrics.apply_env_overrides();
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind to.
    #[serde(with = "socket_addr_serde")]
    pub bind_addr: SocketAddr,
    /// Idle connection timeout in seconds (0 disables it).
    pub idle_timeout_secs: u64,
    /// Maximum concurrent controller connections.
    pub max_connections: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                emuctl_protocol::DEFAULT_PORT,
            ),
            idle_timeout_secs: 300,
            max_connections: 16,
        }
    }
}

impl NetworkConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("EMUCTL_BIND") {
            if let Ok(parsed) = addr.parse() {
                self.bind_addr = parsed;
            }
        }

        if let Ok(timeout) = std::env::var("EMUCTL_IDLE_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.idle_timeout_secs = secs;
            }
        }

        if let Ok(max) = std::env::var("EMUCTL_MAX_CONNECTIONS") {
            if let Ok(n) = max.parse() {
                self.max_connections = n;
            }
        }
    }

    /// Returns the idle timeout, or `None` when disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}

/// Output mode for received commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// One tracing event per command.
    #[default]
    Log,
    /// One JSON object per line on stdout.
    Jsonl,
}

impl FromStr for OutputMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "log" => Ok(OutputMode::Log),
            "jsonl" | "json" => Ok(OutputMode::Jsonl),
            other => Err(ConfigError::ValidationError(format!(
                "unknown output mode '{}': expected log or jsonl",
                other
            ))),
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputMode::Log => f.write_str("log"),
            OutputMode::Jsonl => f.write_str("jsonl"),
        }
    }
}

/// Output configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub mode: OutputMode,
}

impl OutputConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(mode) = std::env::var("EMUCTL_OUTPUT") {
            match mode.parse() {
                Ok(parsed) => self.mode = parsed,
                Err(e) => tracing::warn!("Ignoring EMUCTL_OUTPUT: {}; keeping {}", e, self.mode),
            }
        }
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable metrics HTTP server.
    #[serde(default)]
    pub enabled: bool,
    /// Address to bind the metrics server to.
    #[serde(with = "socket_addr_serde")]
    pub bind_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9171),
        }
    }
}

impl MetricsConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(enabled) = std::env::var("EMUCTL_METRICS_ENABLED") {
            self.enabled = enabled == "1" || enabled.to_lowercase() == "true";
        }
        if let Ok(addr) = std::env::var("EMUCTL_METRICS_BIND") {
            if let Ok(parsed) = addr.parse() {
                self.bind_addr = parsed;
            }
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serializes `SocketAddr` as a plain string in YAML.
mod socket_addr_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::net::SocketAddr;

    pub fn serialize<S>(addr: &SocketAddr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.network.bind_addr.port(), emuctl_protocol::DEFAULT_PORT);
        assert!(config.network.bind_addr.ip().is_loopback());
        assert_eq!(config.network.idle_timeout(), Some(Duration::from_secs(300)));
        assert_eq!(config.output.mode, OutputMode::Log);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_idle_timeout_disabled() {
        let network = NetworkConfig {
            idle_timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(network.idle_timeout(), None);
    }

    #[test]
    fn test_output_mode_parse() {
        assert_eq!("log".parse::<OutputMode>().unwrap(), OutputMode::Log);
        assert_eq!("JSONL".parse::<OutputMode>().unwrap(), OutputMode::Jsonl);
        assert_eq!("json".parse::<OutputMode>().unwrap(), OutputMode::Jsonl);
        assert!(matches!(
            "xml".parse::<OutputMode>(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_bad_output_override_keeps_other_overrides() {
        std::env::set_var("EMUCTL_BIND", "127.0.0.1:9999");
        std::env::set_var("EMUCTL_MAX_CONNECTIONS", "3");
        std::env::set_var("EMUCTL_OUTPUT", "jsnol");

        let config = Config::from_env();

        std::env::remove_var("EMUCTL_BIND");
        std::env::remove_var("EMUCTL_MAX_CONNECTIONS");
        std::env::remove_var("EMUCTL_OUTPUT");

        assert_eq!(config.network.bind_addr, "127.0.0.1:9999".parse().unwrap());
        assert_eq!(config.network.max_connections, 3);
        assert_eq!(config.output.mode, OutputMode::Log);
    }

    #[test]
    fn test_yaml_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emuctl.yaml");
        std::fs::write(
            &path,
            "network:\n  bind_addr: \"0.0.0.0:9000\"\noutput:\n  mode: jsonl\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.network.bind_addr, "0.0.0.0:9000".parse().unwrap());
        assert_eq!(config.network.max_connections, 16);
        assert_eq!(config.output.mode, OutputMode::Jsonl);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.yaml");

        let mut config = Config::default();
        config.metrics.enabled = true;
        config.network.max_connections = 4;
        config.save(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert!(loaded.metrics.enabled);
        assert_eq!(loaded.network.max_connections, 4);
        assert_eq!(loaded.metrics.bind_addr, config.metrics.bind_addr);
    }

    #[test]
    fn test_bad_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.yaml");
        assert!(matches!(
            Config::from_file(&missing),
            Err(ConfigError::IoError(..))
        ));

        let bad = dir.path().join("bad.yaml");
        std::fs::write(&bad, "network:\n  bind_addr: \"not an addr\"\n").unwrap();
        let err = Config::from_file(&bad).unwrap_err();
        assert!(err.to_string().contains("bad.yaml"));
    }
}
