//! TCP VFS configuration
//!
//! Loaded from TOML by the host; every field has a default so an empty file
//! is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default number of descriptor slots
pub const DEFAULT_MAX_DESCRIPTORS: usize = 10;

/// Default bound on connection establishment
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;

/// Descriptor ids must fit in the one-byte handle the guest protocol uses.
const MAX_DESCRIPTORS_LIMIT: usize = 255;

fn default_max_descriptors() -> usize {
    DEFAULT_MAX_DESCRIPTORS
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

/// Runtime configuration of a [`TcpVfs`](crate::TcpVfs) instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TcpVfsConfig {
    /// Number of descriptor slots
    #[serde(default = "default_max_descriptors")]
    pub max_descriptors: usize,
    /// How long `open` waits for a deferred connect to complete
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Upper bound on a single `write`; unbounded when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_timeout_ms: Option<u64>,
}

impl TcpVfsConfig {
    /// Connect timeout as a `Duration`
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Write timeout as a `Duration`, if any
    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_ms.map(Duration::from_millis)
    }

    /// Load from a TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    /// Parse from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_descriptors == 0 || self.max_descriptors > MAX_DESCRIPTORS_LIMIT {
            return Err(ConfigError::InvalidCapacity(self.max_descriptors));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("connect_timeout_ms"));
        }
        if self.write_timeout_ms == Some(0) {
            return Err(ConfigError::ZeroTimeout("write_timeout_ms"));
        }
        Ok(())
    }
}

impl Default for TcpVfsConfig {
    fn default() -> Self {
        Self {
            max_descriptors: DEFAULT_MAX_DESCRIPTORS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            write_timeout_ms: None,
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("max_descriptors must be between 1 and 255, got {0}")]
    InvalidCapacity(usize),

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("Config I/O error: {0}")]
    Io(String),

    #[error("Config parse error: {0}")]
    Parse(String),
}
