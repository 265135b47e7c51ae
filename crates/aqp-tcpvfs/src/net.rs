//! Platform socket interface.
//!
//! The establisher and the I/O relay in [`crate::vfs`] are written against
//! [`NetStack`] only. [`NativeStack`](crate::NativeStack) drives the host
//! OS; tests substitute a scripted stack.

use std::io;
use std::net::SocketAddrV4;
use std::time::Duration;

/// Outcome of initiating a non-blocking connect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectProgress {
    /// Connected before the call returned
    Connected,
    /// Completion will be signalled by writability
    InProgress,
}

/// Outcome of waiting on a socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    TimedOut,
}

/// Primitive socket operations needed by the TCP VFS
pub trait NetStack {
    /// Owned stream socket; dropping it releases the OS resource.
    type Socket;

    /// Resolve `host` to the first IPv4 stream address.
    fn resolve_ipv4(&mut self, host: &str, port: u16) -> io::Result<SocketAddrV4>;

    /// Create an unconnected IPv4 stream socket.
    fn stream_socket(&mut self) -> io::Result<Self::Socket>;

    fn set_nonblocking(&mut self, socket: &Self::Socket) -> io::Result<()>;

    /// Start connecting without blocking.
    fn start_connect(
        &mut self,
        socket: &Self::Socket,
        addr: SocketAddrV4,
    ) -> io::Result<ConnectProgress>;

    /// Block until `socket` is writable or `timeout` elapses (`None` waits
    /// forever).
    fn wait_writable(
        &mut self,
        socket: &mut Self::Socket,
        timeout: Option<Duration>,
    ) -> io::Result<Readiness>;

    /// Take the pending socket error, e.g. the result of a deferred connect.
    fn take_error(&mut self, socket: &Self::Socket) -> io::Result<Option<io::Error>>;

    /// One non-blocking receive into `buf`.
    fn recv(&mut self, socket: &mut Self::Socket, buf: &mut [u8]) -> io::Result<usize>;

    /// One non-blocking send from `buf`.
    fn send(&mut self, socket: &mut Self::Socket, buf: &[u8]) -> io::Result<usize>;

    /// Release the socket. Teardown failures are swallowed.
    fn close(&mut self, socket: Self::Socket);
}

/// Whether `err` is the "operation in progress" status of a non-blocking
/// socket.
#[cfg(unix)]
pub fn is_in_progress(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EINPROGRESS) || err.kind() == io::ErrorKind::WouldBlock
}

/// Whether `err` is the "operation in progress" status of a non-blocking
/// socket.
#[cfg(not(unix))]
pub fn is_in_progress(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
}

/// Whether a send or receive failing with `err` should simply be retried.
pub fn is_transient(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::Interrupted || is_in_progress(err)
}

/// Whether `err` means the peer is gone.
pub fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotConnected | io::ErrorKind::BrokenPipe
    )
}
