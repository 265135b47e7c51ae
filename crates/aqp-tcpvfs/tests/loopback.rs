//! End-to-end behaviour against real loopback sockets.

mod common;

use aqp_tcpvfs::{ErrorCode, TcpVfs, TcpVfsConfig, Vfs, VfsError, WireResult};
use common::*;
use std::net::TcpListener;
use std::time::{Duration, Instant};

#[test]
fn test_echo_round_trip() {
    let addr = spawn_echo();
    let mut vfs = native_vfs();

    let fd = Vfs::open(&mut vfs, 0, &tcp_path(addr)).unwrap();
    assert!(fd >= 0);

    let payload: Vec<u8> = (0..2000u32).map(|i| (i % 251) as u8).collect();
    assert_eq!(Vfs::write(&mut vfs, fd, &payload).unwrap(), payload.len());

    let (received, err) = read_until(&mut vfs, fd, payload.len(), Duration::from_secs(5));
    assert!(err.is_none(), "unexpected error: {:?}", err);
    assert_eq!(received, payload);

    assert_eq!(vfs.stats().bytes_written, 2000);
    assert_eq!(vfs.stats().bytes_read, 2000);
    assert_eq!(Vfs::close(&mut vfs, fd).into_wire(), 0);
}

#[test]
fn test_localhost_name_resolves() {
    let addr = spawn_echo();
    let mut vfs = native_vfs();

    let fd = Vfs::open(&mut vfs, 0, &format!("tcp://localhost:{}", addr.port())).unwrap();
    assert_eq!(Vfs::write(&mut vfs, fd, b"ping").unwrap(), 4);

    let (received, _) = read_until(&mut vfs, fd, 4, Duration::from_secs(5));
    assert_eq!(received, b"ping");
}

#[test]
fn test_zero_length_io() {
    let addr = spawn_echo();
    let mut vfs = native_vfs();
    let fd = Vfs::open(&mut vfs, 0, &tcp_path(addr)).unwrap();

    assert_eq!(Vfs::read(&mut vfs, fd, &mut []).unwrap(), 0);
    assert_eq!(Vfs::write(&mut vfs, fd, &[]).unwrap(), 0);
    // Nothing sent yet, so a real read has nothing to return either.
    assert_eq!(Vfs::read(&mut vfs, fd, &mut [0u8; 16]).unwrap(), 0);
}

#[test]
fn test_peer_close_reports_eof_once_data_is_drained() {
    let addr = spawn_oneshot(b"hello from peer");
    let mut vfs = native_vfs();
    let fd = Vfs::open(&mut vfs, 0, &tcp_path(addr)).unwrap();

    let (received, err) = read_until(&mut vfs, fd, usize::MAX, Duration::from_secs(5));
    assert_eq!(received, b"hello from peer");
    assert_eq!(err.map(|e| e.code()), Some(ErrorCode::Eof));

    // The stream stays ended; no data is replayed.
    assert_eq!(Vfs::read(&mut vfs, fd, &mut [0u8; 64]).into_wire(), -4);
    assert_eq!(Vfs::close(&mut vfs, fd).into_wire(), 0);
}

#[test]
fn test_capacity_exhaustion_and_reuse() {
    let addr = spawn_echo();
    let path = tcp_path(addr);
    let mut vfs = native_vfs();

    let ids: Vec<i32> = (0..10).map(|_| Vfs::open(&mut vfs, 0, &path).unwrap()).collect();
    assert_eq!(ids, (0..10).collect::<Vec<_>>());

    assert_eq!(Vfs::open(&mut vfs, 0, &path).into_wire(), -2);

    Vfs::close(&mut vfs, 3).unwrap();
    assert_eq!(Vfs::open(&mut vfs, 0, &path).unwrap(), 3);
    assert_eq!(vfs.open_descriptors(), 10);
}

#[test]
fn test_operations_after_close_are_param() {
    let addr = spawn_echo();
    let mut vfs = native_vfs();
    let fd = Vfs::open(&mut vfs, 0, &tcp_path(addr)).unwrap();

    Vfs::close(&mut vfs, fd).unwrap();

    assert_eq!(code(Vfs::read(&mut vfs, fd, &mut [0u8; 8])), ErrorCode::Param);
    assert_eq!(code(Vfs::write(&mut vfs, fd, b"late")), ErrorCode::Param);
    assert_eq!(code(Vfs::close(&mut vfs, fd)), ErrorCode::Param);
}

#[test]
fn test_stale_descriptor_after_reopen() {
    let addr = spawn_echo();
    let path = tcp_path(addr);
    let mut vfs = native_vfs();

    let old = vfs.open(&path).unwrap();
    vfs.close(old).unwrap();
    let new = vfs.open(&path).unwrap();

    assert_eq!(old.id(), new.id());
    assert!(matches!(vfs.write(old, b"x"), Err(VfsError::BadDescriptor(_))));
    assert_eq!(vfs.write(new, b"x").unwrap(), 1);
}

#[test]
fn test_malformed_paths() {
    let mut vfs = native_vfs();

    for path in ["tcp://host", "tcp://host:abc", "http://host:80", "tcp://host:99999"] {
        assert_eq!(code(Vfs::open(&mut vfs, 0, path)), ErrorCode::Param, "{}", path);
    }
    assert_eq!(vfs.open_descriptors(), 0);
}

#[test]
fn test_unresolvable_host_is_not_found() {
    let mut vfs = native_vfs();
    assert_eq!(
        code(Vfs::open(&mut vfs, 0, "tcp://no-such-host.invalid:80")),
        ErrorCode::NotFound
    );
}

#[test]
fn test_closed_port_fails_within_bound() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let mut vfs = native_vfs();

    let start = Instant::now();
    let result = Vfs::open(&mut vfs, 0, &format!("tcp://127.0.0.1:{}", port));

    assert!(matches!(code(result), ErrorCode::NotFound | ErrorCode::Other));
    assert!(start.elapsed() < Duration::from_secs(6));
    assert_eq!(vfs.open_descriptors(), 0);
}

#[test]
fn test_write_timeout_against_stalled_peer() {
    let addr = spawn_silent();
    let config = TcpVfsConfig {
        write_timeout_ms: Some(300),
        ..TcpVfsConfig::default()
    };
    let mut vfs = TcpVfs::new(config).unwrap();
    let fd = Vfs::open(&mut vfs, 0, &tcp_path(addr)).unwrap();

    // Far more than loopback socket buffers can absorb.
    let payload = vec![0x5a; 32 * 1024 * 1024];
    let start = Instant::now();
    let err = Vfs::write(&mut vfs, fd, &payload).unwrap_err();

    assert!(matches!(err, VfsError::TimedOut { op: "write", .. }));
    assert_eq!(err.code(), ErrorCode::Other);
    assert!(start.elapsed() < Duration::from_secs(5));
}
