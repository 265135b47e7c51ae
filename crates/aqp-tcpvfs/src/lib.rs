//! Aquarius+ TCP VFS
//!
//! Exposes outbound TCP connections to guest software through the same
//! open/read/write/close descriptor contract the host uses for its storage
//! backends.
//!
//! Architecture:
//! 1. `open("tcp://host:port")` → path validated, slot availability checked
//! 2. Host resolved (IPv4), non-blocking connect bounded by a timeout
//! 3. Socket parked in a fixed-capacity descriptor table
//! 4. `read` polls, `write` drains, `close` frees the slot
//!
//! Every failure collapses to one of the host's negative wire codes via
//! [`VfsError::code`] / [`WireResult::into_wire`].

mod config;
mod error;
mod native;
mod net;
mod table;
mod uri;
mod vfs;

pub use config::{ConfigError, TcpVfsConfig, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_MAX_DESCRIPTORS};
pub use error::{ErrorCode, VfsError, WireResult};
pub use native::NativeStack;
pub use net::{ConnectProgress, NetStack, Readiness, is_disconnect, is_in_progress, is_transient};
pub use table::{Descriptor, DescriptorTable};
pub use uri::{ConnectionTarget, SCHEME};
pub use vfs::{TcpVfs, Vfs, VfsStats};
