//! TCP-backed VFS.
//!
//! Guest calls arrive one at a time and must each return a single result,
//! while TCP connection setup is asynchronous by nature. `open` bridges the
//! two with a non-blocking connect bounded by the configured timeout; `read`
//! is a poll (0 means "nothing yet", only [`ErrorCode::Eof`] ends a stream);
//! `write` drains the whole buffer or fails.
//!
//! ```rust,ignore
//! let mut vfs = TcpVfs::new(TcpVfsConfig::default())?;
//! let fd = vfs.open("tcp://example.com:80")?;
//! vfs.write(fd, b"GET / HTTP/1.0\r\n\r\n")?;
//!
//! let mut buf = [0u8; 256];
//! loop {
//!     match vfs.read(fd, &mut buf) {
//!         Ok(0) => continue, // try later
//!         Ok(n) => handle(&buf[..n]),
//!         Err(e) if e.code() == ErrorCode::Eof => break,
//!         Err(e) => return Err(e),
//!     }
//! }
//! vfs.close(fd)?;
//! ```
//!
//! [`ErrorCode::Eof`]: crate::ErrorCode::Eof

use crate::config::TcpVfsConfig;
use crate::error::VfsError;
use crate::native::NativeStack;
use crate::net::{ConnectProgress, NetStack, Readiness, is_disconnect, is_transient};
use crate::table::{Descriptor, DescriptorTable};
use crate::uri::ConnectionTarget;
use std::io;
use std::net::SocketAddrV4;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Uniform open/read/write/close contract shared by the host VFS backends.
///
/// Descriptor ids are the raw integers the guest holds.
pub trait Vfs {
    /// Open `path`; returns the new descriptor id.
    fn open(&mut self, flags: u8, path: &str) -> Result<i32, VfsError>;

    /// Read up to `buf.len()` bytes.
    fn read(&mut self, fd: i32, buf: &mut [u8]) -> Result<usize, VfsError>;

    /// Write all of `data`.
    fn write(&mut self, fd: i32, data: &[u8]) -> Result<usize, VfsError>;

    fn close(&mut self, fd: i32) -> Result<(), VfsError>;
}

/// Diagnostic counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VfsStats {
    pub opens: u64,
    pub failed_opens: u64,
    pub closes: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

/// TCP connections exposed as VFS descriptors
pub struct TcpVfs<N: NetStack = NativeStack> {
    config: TcpVfsConfig,
    net: N,
    table: DescriptorTable<N::Socket>,
    stats: VfsStats,
}

impl TcpVfs<NativeStack> {
    /// Create a TCP VFS on the host network stack
    pub fn new(config: TcpVfsConfig) -> Result<Self, VfsError> {
        let net = NativeStack::new().map_err(VfsError::Socket)?;
        Ok(Self::with_stack(config, net))
    }

    /// Create with default configuration
    pub fn with_defaults() -> Result<Self, VfsError> {
        Self::new(TcpVfsConfig::default())
    }
}

impl<N: NetStack> TcpVfs<N> {
    /// Create a TCP VFS on an explicit network stack
    pub fn with_stack(config: TcpVfsConfig, net: N) -> Self {
        info!(
            "TCP VFS initialized ({} descriptors, connect timeout {:?})",
            config.max_descriptors,
            config.connect_timeout()
        );

        Self {
            table: DescriptorTable::new(config.max_descriptors),
            config,
            net,
            stats: VfsStats::default(),
        }
    }

    pub fn config(&self) -> &TcpVfsConfig {
        &self.config
    }

    pub fn stats(&self) -> &VfsStats {
        &self.stats
    }

    /// Number of descriptors currently open
    pub fn open_descriptors(&self) -> usize {
        self.table.len()
    }

    /// The underlying network stack
    pub fn stack(&self) -> &N {
        &self.net
    }

    /// Current descriptor for a raw guest id
    pub fn descriptor(&self, fd: i32) -> Result<Descriptor, VfsError> {
        self.table.descriptor_at(fd).ok_or(VfsError::BadDescriptor(fd))
    }

    /// Open a connection to a `tcp://host:port` path.
    pub fn open(&mut self, path: &str) -> Result<Descriptor, VfsError> {
        info!("TCP open: {}", path);

        let result = self.try_open(path);
        match &result {
            Ok(desc) => {
                self.stats.opens += 1;
                info!("TCP open {} -> {}", path, desc);
            }
            Err(e) => {
                self.stats.failed_opens += 1;
                warn!("TCP open {} failed: {}", path, e);
            }
        }
        result
    }

    fn try_open(&mut self, path: &str) -> Result<Descriptor, VfsError> {
        let target = ConnectionTarget::parse(path)?;

        // Slot availability is checked before any network activity.
        if !self.table.has_free_slot() {
            return Err(VfsError::TooManyOpen(self.table.capacity()));
        }

        let socket = self.establish(&target)?;

        self.table.insert(socket).map_err(|socket| {
            self.net.close(socket);
            VfsError::TooManyOpen(self.table.capacity())
        })
    }

    fn establish(&mut self, target: &ConnectionTarget) -> Result<N::Socket, VfsError> {
        let addr = self
            .net
            .resolve_ipv4(&target.host, target.port)
            .map_err(|source| VfsError::Resolve {
                host: target.host.clone(),
                source,
            })?;
        debug!("Resolved {} -> {}", target, addr);

        let mut socket = self.net.stream_socket().map_err(VfsError::Socket)?;

        if let Err(e) = self.net.set_nonblocking(&socket) {
            self.net.close(socket);
            return Err(VfsError::Socket(e));
        }

        match self.net.start_connect(&socket, addr) {
            Ok(ConnectProgress::Connected) => {
                debug!("Connected to {} immediately", addr);
                Ok(socket)
            }
            Ok(ConnectProgress::InProgress) => {
                debug!("Connect to {} in progress", addr);
                match self.finish_connect(&mut socket, addr) {
                    Ok(()) => Ok(socket),
                    Err(e) => {
                        self.net.close(socket);
                        Err(e)
                    }
                }
            }
            Err(source) => {
                self.net.close(socket);
                Err(VfsError::Refused { addr, source })
            }
        }
    }

    fn finish_connect(&mut self, socket: &mut N::Socket, addr: SocketAddrV4) -> Result<(), VfsError> {
        let timeout = self.config.connect_timeout();

        match self.net.wait_writable(socket, Some(timeout))? {
            Readiness::TimedOut => Err(VfsError::TimedOut {
                op: "connect",
                after: timeout,
            }),
            Readiness::Ready => match self.net.take_error(socket)? {
                None => Ok(()),
                Some(source) => Err(VfsError::Refused { addr, source }),
            },
        }
    }

    /// Receive whatever is available, up to `buf.len()` bytes.
    ///
    /// `Ok(0)` means no data has arrived yet; the caller polls again.
    pub fn read(&mut self, desc: Descriptor, buf: &mut [u8]) -> Result<usize, VfsError> {
        let socket = self
            .table
            .get_mut(desc)
            .ok_or(VfsError::BadDescriptor(desc.id()))?;

        if buf.is_empty() {
            return Ok(0);
        }

        match self.net.recv(socket, buf) {
            Ok(0) => {
                debug!("TCP read {}: peer closed", desc);
                Err(VfsError::Eof)
            }
            Ok(len) => {
                self.stats.bytes_read += len as u64;
                Ok(len)
            }
            Err(e) if is_transient(&e) => Ok(0),
            Err(e) if is_disconnect(&e) => Err(VfsError::Eof),
            Err(e) => Err(VfsError::Io(e)),
        }
    }

    /// Send all of `data`, waiting for socket space as needed.
    ///
    /// Either the whole buffer is sent and its length returned, or the call
    /// fails. Without a configured write timeout this can block for as long
    /// as the peer stops accepting data.
    pub fn write(&mut self, desc: Descriptor, data: &[u8]) -> Result<usize, VfsError> {
        let socket = self
            .table
            .get_mut(desc)
            .ok_or(VfsError::BadDescriptor(desc.id()))?;

        if data.is_empty() {
            return Ok(0);
        }

        let write_timeout = self.config.write_timeout();
        let deadline = write_timeout.map(|t| Instant::now() + t);
        let timed_out = |after| VfsError::TimedOut { op: "write", after };

        let mut offset = 0;
        while offset < data.len() {
            match self.net.send(socket, &data[offset..]) {
                Ok(0) => return Err(VfsError::Io(io::ErrorKind::WriteZero.into())),
                Ok(sent) => offset += sent,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if is_transient(&e) => {
                    let remaining = match (deadline, write_timeout) {
                        (Some(deadline), Some(limit)) => {
                            let left = deadline.saturating_duration_since(Instant::now());
                            if left.is_zero() {
                                return Err(timed_out(limit));
                            }
                            Some(left)
                        }
                        _ => None,
                    };
                    match self.net.wait_writable(socket, remaining) {
                        Ok(Readiness::Ready) => {}
                        Ok(Readiness::TimedOut) => {
                            return Err(timed_out(write_timeout.unwrap_or_default()));
                        }
                        Err(e) => return Err(VfsError::Io(e)),
                    }
                }
                Err(e) if is_disconnect(&e) => {
                    debug!("TCP write {}: peer gone", desc);
                    return Err(VfsError::Eof);
                }
                Err(e) => return Err(VfsError::Io(e)),
            }
        }

        self.stats.bytes_written += data.len() as u64;
        Ok(data.len())
    }

    /// Release the connection behind `desc`.
    pub fn close(&mut self, desc: Descriptor) -> Result<(), VfsError> {
        info!("TCP close: {}", desc);

        let socket = self
            .table
            .remove(desc)
            .ok_or(VfsError::BadDescriptor(desc.id()))?;
        self.net.close(socket);
        self.stats.closes += 1;
        Ok(())
    }
}

impl<N: NetStack> Vfs for TcpVfs<N> {
    fn open(&mut self, _flags: u8, path: &str) -> Result<i32, VfsError> {
        TcpVfs::open(self, path).map(|desc| desc.id())
    }

    fn read(&mut self, fd: i32, buf: &mut [u8]) -> Result<usize, VfsError> {
        let desc = self.descriptor(fd)?;
        TcpVfs::read(self, desc, buf)
    }

    fn write(&mut self, fd: i32, data: &[u8]) -> Result<usize, VfsError> {
        let desc = self.descriptor(fd)?;
        TcpVfs::write(self, desc, data)
    }

    fn close(&mut self, fd: i32) -> Result<(), VfsError> {
        let desc = self.descriptor(fd)?;
        TcpVfs::close(self, desc)
    }
}

impl<N: NetStack> Drop for TcpVfs<N> {
    fn drop(&mut self) {
        let leaked: Vec<_> = self.table.drain().collect();
        if !leaked.is_empty() {
            warn!("Closing {} TCP descriptors left open", leaked.len());
        }
        for (_, socket) in leaked {
            self.net.close(socket);
        }
    }
}
