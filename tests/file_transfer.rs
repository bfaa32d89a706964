//! File transfer over RPC:
//! - sendfile/getfile round trips, including empty files
//! - the executable-bit flag
//! - failure replies that leave the connection usable
//! - rm and its per-path outcome list

#![cfg(unix)]

mod support;

use std::io::Cursor;

use testagent_protocol::rpc::sendfile_flags;
use testagentd::ClientError;

#[test]
fn test_send_then_get_round_trip() {
    let addr = support::start_server();
    let mut client = support::connect(addr);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("payload.bin");
    let path = path.to_str().unwrap();

    let body = b"hello";
    client
        .send_file(path, 0, &mut Cursor::new(&body[..]), body.len() as u64)
        .unwrap();
    assert_eq!(std::fs::read(path).unwrap(), body);

    let mut fetched = Vec::new();
    let size = client.get_file(path, &mut fetched).unwrap();
    assert_eq!(size, body.len() as u64);
    assert_eq!(fetched, body);
}

#[test]
fn test_empty_file_round_trip() {
    let addr = support::start_server();
    let mut client = support::connect(addr);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty");
    let path = path.to_str().unwrap();

    client
        .send_file(path, 0, &mut Cursor::new(&b""[..]), 0)
        .unwrap();
    let mut fetched = Vec::new();
    assert_eq!(client.get_file(path, &mut fetched).unwrap(), 0);
    assert!(fetched.is_empty());
}

#[test]
fn test_sendfile_exe_flag_sets_the_executable_bit() {
    use std::os::unix::fs::PermissionsExt;

    let addr = support::start_server();
    let mut client = support::connect(addr);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tool.sh");
    let path = path.to_str().unwrap();

    let body = b"#!/bin/sh\nexit 0\n";
    client
        .send_file(
            path,
            sendfile_flags::SENDFILE_EXE,
            &mut Cursor::new(&body[..]),
            body.len() as u64,
        )
        .unwrap();
    let mode = std::fs::metadata(path).unwrap().permissions().mode();
    assert_eq!(mode & 0o111, 0o111, "file should be executable");
}

#[test]
fn test_sendfile_to_unwritable_path_reports_and_recovers() {
    let addr = support::start_server();
    let mut client = support::connect(addr);

    let err = client
        .send_file("/no/such/dir/file", 0, &mut Cursor::new(&b"data"[..]), 4)
        .unwrap_err();
    assert!(matches!(err, ClientError::Agent(_)), "unexpected error: {err}");
    assert!(
        err.to_string().contains("/no/such/dir/file"),
        "error should name the path: {err}"
    );

    // The server drained the blob, so the stream is still aligned.
    client.ping().unwrap();
}

#[test]
fn test_getfile_missing_file_reports_and_recovers() {
    let addr = support::start_server();
    let mut client = support::connect(addr);

    let mut sink = Vec::new();
    let err = client.get_file("/no/such/file", &mut sink).unwrap_err();
    assert!(
        err.to_string().contains("/no/such/file"),
        "error should name the path: {err}"
    );
    assert!(sink.is_empty());
    client.ping().unwrap();
}

#[test]
fn test_rm_all_successes_is_an_empty_reply() {
    let addr = support::start_server();
    let mut client = support::connect(addr);
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    std::fs::write(&a, "x").unwrap();
    std::fs::write(&b, "y").unwrap();

    let results = client
        .rm(&[a.to_str().unwrap(), b.to_str().unwrap()])
        .unwrap();
    assert_eq!(results, vec![None, None]);
    assert!(!a.exists());
    assert!(!b.exists());
}

#[test]
fn test_rm_reports_per_path_outcomes_in_request_order() {
    let addr = support::start_server();
    let mut client = support::connect(addr);
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a");
    let missing = dir.path().join("missing");
    let c = dir.path().join("c");
    std::fs::write(&a, "x").unwrap();
    std::fs::write(&c, "z").unwrap();

    let results = client
        .rm(&[
            a.to_str().unwrap(),
            missing.to_str().unwrap(),
            c.to_str().unwrap(),
        ])
        .unwrap();

    assert_eq!(results.len(), 3);
    assert!(results[0].is_none(), "first deletion should succeed");
    let failure = results[1].as_ref().expect("missing path should fail");
    assert!(
        failure.contains(missing.to_str().unwrap()),
        "failure should name the path: {failure}"
    );
    assert!(results[2].is_none(), "deletions after a failure still run");
    assert!(!a.exists());
    assert!(!c.exists());

    // A partial failure is not fatal.
    client.ping().unwrap();
}
