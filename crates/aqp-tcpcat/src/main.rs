//! aqp-tcpcat: drive the TCP VFS from a terminal
//!
//! Opens one `tcp://host:port` descriptor exactly the way a guest would,
//! forwards stdin lines as writes and polls reads to stdout until the peer
//! closes the connection or stdin ends.

use anyhow::{Context, Result, bail};
use aqp_tcpvfs::{ErrorCode, TcpVfs, TcpVfsConfig, Vfs, VfsError};
use crossbeam_channel::{Receiver, TryRecvError};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

// Use mimalloc as the global allocator for reduced memory fragmentation
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Idle delay between polls when neither side has data
const POLL_INTERVAL: Duration = Duration::from_millis(10);

fn usage() -> ! {
    eprintln!("Usage: aqp-tcpcat <tcp://host:port> [config.toml]");
    std::process::exit(2);
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else { usage() };
    let config_path = args.next().map(PathBuf::from);
    if args.next().is_some() {
        usage();
    }

    let config = match &config_path {
        Some(p) => TcpVfsConfig::from_toml_file(p)
            .with_context(|| format!("Loading config {}", p.display()))?,
        None => TcpVfsConfig::default(),
    };

    let mut vfs = TcpVfs::new(config).context("Creating TCP VFS")?;

    let fd = match Vfs::open(&mut vfs, 0, &path) {
        Ok(fd) => fd,
        Err(e) => bail!("open {} failed with {}: {}", path, e.code(), e),
    };
    info!("Connected to {} as descriptor {}", path, fd);

    let lines = spawn_stdin_reader();
    let result = relay(&mut vfs, fd, &lines);

    if let Err(e) = Vfs::close(&mut vfs, fd) {
        warn!("close failed: {}", e);
    }

    let stats = vfs.stats();
    info!(
        "Session done: {} bytes sent, {} bytes received",
        stats.bytes_written, stats.bytes_read
    );
    result
}

/// Read stdin on a helper thread so the relay loop never blocks on it.
fn spawn_stdin_reader() -> Receiver<Vec<u8>> {
    let (tx, rx) = crossbeam_channel::unbounded();

    thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(mut line) = line else { break };
                line.push('\n');
                if tx.send(line.into_bytes()).is_err() {
                    break;
                }
            }
            debug!("stdin closed");
        })
        .expect("Failed to spawn stdin thread");

    rx
}

fn relay<V: Vfs>(vfs: &mut V, fd: i32, lines: &Receiver<Vec<u8>>) -> Result<()> {
    let mut stdout = std::io::stdout();
    let mut buf = [0u8; 1024];
    let mut stdin_open = true;

    loop {
        let mut idle = true;

        if stdin_open {
            match lines.try_recv() {
                Ok(line) => {
                    vfs.write(fd, &line).context("write")?;
                    idle = false;
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    debug!("stdin exhausted, draining remaining input");
                    stdin_open = false;
                }
            }
        }

        match vfs.read(fd, &mut buf) {
            Ok(0) => {}
            Ok(n) => {
                stdout.write_all(&buf[..n])?;
                stdout.flush()?;
                idle = false;
            }
            Err(VfsError::Eof) => {
                info!("Peer closed the connection");
                return Ok(());
            }
            Err(e) => bail!("read failed with {}: {}", e.code(), e),
        }

        if idle {
            if !stdin_open {
                // Nothing more to send and nothing pending; stop once the
                // peer has had a moment to answer.
                thread::sleep(POLL_INTERVAL * 10);
                match vfs.read(fd, &mut buf) {
                    Ok(0) => return Ok(()),
                    Ok(n) => {
                        stdout.write_all(&buf[..n])?;
                        stdout.flush()?;
                        continue;
                    }
                    Err(e) if e.code() == ErrorCode::Eof => return Ok(()),
                    Err(e) => bail!("read failed with {}: {}", e.code(), e),
                }
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}
