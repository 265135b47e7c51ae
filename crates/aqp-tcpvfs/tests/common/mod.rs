//! Loopback peers for the integration tests.
//!
//! Each peer runs on its own single-threaded tokio runtime in a background
//! thread and lives until the test process exits.

#![allow(dead_code)]

use aqp_tcpvfs::{ErrorCode, TcpVfs, Vfs, VfsError};
use std::future::Future;
use std::net::SocketAddr;
use std::thread;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

/// Accept connections forever, handing each one to `handler`.
pub fn spawn_peer<F, Fut>(handler: F) -> SocketAddr
where
    F: Fn(TcpStream) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();

    thread::Builder::new()
        .name("loopback-peer".to_string())
        .spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("Failed to build peer runtime");

            runtime.block_on(async move {
                let listener = TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("Failed to bind peer");
                let _ = tx.send(listener.local_addr().expect("Peer has no address"));

                while let Ok((stream, _)) = listener.accept().await {
                    tokio::spawn(handler(stream));
                }
            });
        })
        .expect("Failed to spawn peer thread");

    rx.blocking_recv().expect("Peer failed to start")
}

async fn echo(mut stream: TcpStream) {
    let mut buf = vec![0u8; 4096];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if stream.write_all(&buf[..n]).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Peer that echoes everything back
pub fn spawn_echo() -> SocketAddr {
    spawn_peer(echo)
}

/// Peer that sends `payload` and then closes the connection
pub fn spawn_oneshot(payload: &'static [u8]) -> SocketAddr {
    spawn_peer(move |mut stream| async move {
        let _ = stream.write_all(payload).await;
        let _ = stream.shutdown().await;
    })
}

/// Peer that accepts and then never reads
pub fn spawn_silent() -> SocketAddr {
    spawn_peer(|stream| async move {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        drop(stream);
    })
}

pub fn tcp_path(addr: SocketAddr) -> String {
    format!("tcp://{}:{}", addr.ip(), addr.port())
}

/// Poll `read` until `expected` bytes arrived, the stream ends, or the
/// deadline passes.
pub fn read_until<V: Vfs>(vfs: &mut V, fd: i32, expected: usize, deadline: Duration) -> (Vec<u8>, Option<VfsError>) {
    let start = Instant::now();
    let mut received = Vec::new();
    let mut buf = [0u8; 512];

    while received.len() < expected && start.elapsed() < deadline {
        match vfs.read(fd, &mut buf) {
            Ok(0) => thread::sleep(Duration::from_millis(5)),
            Ok(n) => received.extend_from_slice(&buf[..n]),
            Err(e) => return (received, Some(e)),
        }
    }
    (received, None)
}

pub fn code<T: std::fmt::Debug>(result: Result<T, VfsError>) -> ErrorCode {
    result.unwrap_err().code()
}

pub fn native_vfs() -> TcpVfs {
    TcpVfs::with_defaults().expect("Failed to create TCP VFS")
}
