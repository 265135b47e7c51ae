//! `tcp://host:port` parsing.

use crate::error::VfsError;
use std::fmt;
use std::str::FromStr;

/// Scheme prefix every TCP path starts with
pub const SCHEME: &str = "tcp://";

/// Host and port a guest asked to connect to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionTarget {
    /// DNS name or IPv4 literal, unvalidated
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl ConnectionTarget {
    /// Parse a guest path of the form `tcp://<host>:<port>`.
    ///
    /// The first colon after the scheme separates host from port, and the
    /// port must be a plain decimal number filling the rest of the path.
    /// The host is passed through untouched; resolution decides whether it
    /// names anything.
    pub fn parse(path: &str) -> Result<Self, VfsError> {
        let rest = path
            .strip_prefix(SCHEME)
            .ok_or_else(|| VfsError::invalid_path(path, "missing tcp:// scheme"))?;

        let (host, port) = rest
            .split_once(':')
            .ok_or_else(|| VfsError::invalid_path(path, "missing port"))?;

        if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
            return Err(VfsError::invalid_path(path, "port is not a decimal number"));
        }

        let port = port
            .parse::<u16>()
            .map_err(|_| VfsError::invalid_path(path, "port out of range"))?;

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl FromStr for ConnectionTarget {
    type Err = VfsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
