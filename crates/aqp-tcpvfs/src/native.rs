//! Host OS socket backend.
//!
//! Sockets are created and connected with `socket2` so every step of the
//! non-blocking connect is visible, then handed to `mio` for readiness
//! polling and I/O.

use crate::net::{ConnectProgress, NetStack, Readiness, is_in_progress};
use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token};
use socket2::{Domain, Protocol, SockAddr, SockRef, Socket, Type};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, SocketAddrV4, ToSocketAddrs};
use std::time::{Duration, Instant};
use tracing::debug;

const WAIT_TOKEN: Token = Token(0);

/// [`NetStack`] backed by the operating system
pub struct NativeStack {
    poll: Poll,
    events: Events,
}

impl NativeStack {
    /// Create the backend and its readiness poller
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(4),
        })
    }

    fn poll_until(&mut self, timeout: Option<Duration>) -> io::Result<Readiness> {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            let remaining = match deadline {
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        return Ok(Readiness::TimedOut);
                    }
                    Some(left)
                }
                None => None,
            };

            match self.poll.poll(&mut self.events, remaining) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }

            if self.events.iter().any(|event| event.token() == WAIT_TOKEN) {
                return Ok(Readiness::Ready);
            }
        }
    }
}

impl NetStack for NativeStack {
    type Socket = TcpStream;

    fn resolve_ipv4(&mut self, host: &str, port: u16) -> io::Result<SocketAddrV4> {
        if host.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty host name"));
        }

        (host, port)
            .to_socket_addrs()?
            .find_map(|addr| match addr {
                SocketAddr::V4(v4) => Some(v4),
                SocketAddr::V6(_) => None,
            })
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no IPv4 address for {}", host),
                )
            })
    }

    fn stream_socket(&mut self) -> io::Result<TcpStream> {
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
        Ok(TcpStream::from_std(std::net::TcpStream::from(socket)))
    }

    fn set_nonblocking(&mut self, socket: &TcpStream) -> io::Result<()> {
        SockRef::from(socket).set_nonblocking(true)
    }

    fn start_connect(
        &mut self,
        socket: &TcpStream,
        addr: SocketAddrV4,
    ) -> io::Result<ConnectProgress> {
        match SockRef::from(socket).connect(&SockAddr::from(addr)) {
            Ok(()) => Ok(ConnectProgress::Connected),
            Err(e) if is_in_progress(&e) => Ok(ConnectProgress::InProgress),
            Err(e) => Err(e),
        }
    }

    fn wait_writable(
        &mut self,
        socket: &mut TcpStream,
        timeout: Option<Duration>,
    ) -> io::Result<Readiness> {
        self.poll
            .registry()
            .register(socket, WAIT_TOKEN, Interest::WRITABLE)?;
        let readiness = self.poll_until(timeout);
        if let Err(e) = self.poll.registry().deregister(socket) {
            debug!("Deregister failed: {}", e);
        }
        readiness
    }

    fn take_error(&mut self, socket: &TcpStream) -> io::Result<Option<io::Error>> {
        socket.take_error()
    }

    fn recv(&mut self, socket: &mut TcpStream, buf: &mut [u8]) -> io::Result<usize> {
        socket.read(buf)
    }

    fn send(&mut self, socket: &mut TcpStream, buf: &[u8]) -> io::Result<usize> {
        socket.write(buf)
    }

    fn close(&mut self, socket: TcpStream) {
        drop(socket);
    }
}
