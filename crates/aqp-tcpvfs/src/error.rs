//! Error vocabulary shared with the guest.
//!
//! The guest never sees native error codes. Every failure inside the
//! adapter is a [`VfsError`] carrying enough context for the host log, and
//! collapses to one [`ErrorCode`] when it crosses the protocol boundary.

use std::fmt;
use std::io;
use std::net::SocketAddrV4;
use std::time::Duration;
use thiserror::Error;

/// Wire error codes of the host VFS contract.
///
/// The values are shared by every VFS backend on the host, so some of them
/// are never produced by the TCP adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum ErrorCode {
    /// File, host or address not found
    NotFound = -1,
    /// Too many open descriptors
    TooManyOpen = -2,
    /// Invalid parameter
    Param = -3,
    /// End of file / stream
    Eof = -4,
    /// File already exists
    Exists = -5,
    /// Other error
    Other = -6,
    /// No disk present
    NoDisk = -7,
    /// Directory not empty
    NotEmpty = -8,
    /// Write protected medium
    WriteProtect = -9,
}

impl ErrorCode {
    /// Value carried on the wire.
    pub fn as_i32(self) -> i32 {
        self as i8 as i32
    }

    /// Look up a code by its wire value.
    pub fn from_i32(value: i32) -> Option<Self> {
        let code = match value {
            -1 => Self::NotFound,
            -2 => Self::TooManyOpen,
            -3 => Self::Param,
            -4 => Self::Eof,
            -5 => Self::Exists,
            -6 => Self::Other,
            -7 => Self::NoDisk,
            -8 => Self::NotEmpty,
            -9 => Self::WriteProtect,
            _ => return None,
        };
        Some(code)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotFound => "ERR_NOT_FOUND",
            Self::TooManyOpen => "ERR_TOO_MANY_OPEN",
            Self::Param => "ERR_PARAM",
            Self::Eof => "ERR_EOF",
            Self::Exists => "ERR_EXISTS",
            Self::Other => "ERR_OTHER",
            Self::NoDisk => "ERR_NO_DISK",
            Self::NotEmpty => "ERR_NOT_EMPTY",
            Self::WriteProtect => "ERR_WRITE_PROTECT",
        };
        write!(f, "{} ({})", name, self.as_i32())
    }
}

/// TCP VFS errors
#[derive(Debug, Error)]
pub enum VfsError {
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("Invalid descriptor: {0}")]
    BadDescriptor(i32),

    #[error("No free descriptor slot (capacity {0})")]
    TooManyOpen(usize),

    #[error("Cannot resolve '{host}': {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("Connection to {addr} refused: {source}")]
    Refused {
        addr: SocketAddrV4,
        #[source]
        source: io::Error,
    },

    #[error("Socket setup failed: {0}")]
    Socket(#[source] io::Error),

    #[error("{op} timed out after {after:?}")]
    TimedOut { op: &'static str, after: Duration },

    #[error("Connection closed by peer")]
    Eof,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl VfsError {
    /// Collapse this error to the code the guest receives.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidPath { .. } | Self::BadDescriptor(_) => ErrorCode::Param,
            Self::TooManyOpen(_) => ErrorCode::TooManyOpen,
            Self::Resolve { .. } | Self::Refused { .. } => ErrorCode::NotFound,
            Self::Eof => ErrorCode::Eof,
            Self::Socket(_) | Self::TimedOut { .. } | Self::Io(_) => ErrorCode::Other,
        }
    }

    pub(crate) fn invalid_path(path: &str, reason: &'static str) -> Self {
        Self::InvalidPath {
            path: path.to_string(),
            reason,
        }
    }
}

/// Flattening of VFS results into the single integer the protocol carries.
///
/// Successful results become their non-negative value, failures become the
/// negative [`ErrorCode`].
pub trait WireResult {
    fn into_wire(self) -> i32;
}

impl WireResult for Result<i32, VfsError> {
    fn into_wire(self) -> i32 {
        match self {
            Ok(value) => value,
            Err(e) => e.code().as_i32(),
        }
    }
}

impl WireResult for Result<usize, VfsError> {
    fn into_wire(self) -> i32 {
        match self {
            // Transfers are bounded by the guest's request size, which the
            // protocol carries in well under 31 bits.
            Ok(count) => i32::try_from(count).unwrap_or(i32::MAX),
            Err(e) => e.code().as_i32(),
        }
    }
}

impl WireResult for Result<(), VfsError> {
    fn into_wire(self) -> i32 {
        match self {
            Ok(()) => 0,
            Err(e) => e.code().as_i32(),
        }
    }
}
