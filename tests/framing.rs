//! Protocol robustness against a live daemon:
//! - unknown opcodes are drained and reported
//! - argument type and arity mismatches keep the stream aligned
//! - sanity-limit violations end the connection after a fatal reply

#![cfg(unix)]

mod support;

use std::time::Duration;

use testagent_protocol::rpc::RpcId;
use testagent_protocol::{Encoder, MAX_LIST_SIZE};

#[test]
fn test_unknown_opcode_is_reported_and_skipped() {
    let addr = support::start_server();
    let mut client = support::connect(addr);

    {
        let mut enc = Encoder::new(client.stream());
        enc.write_raw_u32(999).unwrap();
        enc.write_list_size(2).unwrap();
        enc.write_string("ignored").unwrap();
        enc.write_u32(42).unwrap();
    }
    let message = client.expect_error_reply().unwrap();
    assert!(
        message.contains("999"),
        "error should name the opcode: {message}"
    );

    // The arguments were drained; the connection keeps working.
    client.ping().unwrap();
}

#[test]
fn test_wrong_argument_type_keeps_the_stream_aligned() {
    let addr = support::start_server();
    let mut client = support::connect(addr);

    // run expects its flags as a uint32; send a string instead.
    {
        let mut enc = Encoder::new(client.stream());
        enc.write_raw_u32(RpcId::Run as u32).unwrap();
        enc.write_list_size(5).unwrap();
        enc.write_string("not-a-number").unwrap();
        enc.write_string("").unwrap();
        enc.write_string("").unwrap();
        enc.write_string("").unwrap();
        enc.write_string("/bin/true").unwrap();
    }
    let message = client.expect_error_reply().unwrap();
    assert!(
        message.contains("uint32"),
        "error should name the expected type: {message}"
    );
    client.ping().unwrap();
}

#[test]
fn test_sendfile_without_blob_entry_recovers() {
    let addr = support::start_server();
    let mut client = support::connect(addr);
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("never-written");

    // The third entry must be a data blob; send a string instead.
    {
        let mut enc = Encoder::new(client.stream());
        enc.write_raw_u32(RpcId::SendFile as u32).unwrap();
        enc.write_list_size(3).unwrap();
        enc.write_string(target.to_str().unwrap()).unwrap();
        enc.write_u32(0).unwrap();
        enc.write_string("not a blob").unwrap();
    }
    let message = client.expect_error_reply().unwrap();
    assert!(
        message.contains("data entry"),
        "error should name the expected type: {message}"
    );
    // No partial file survives and the stream stays aligned.
    assert!(!target.exists());
    client.ping().unwrap();
}

#[test]
fn test_upgrade_without_blob_entry_recovers() {
    let addr = support::start_server();
    let mut client = support::connect(addr);

    {
        let mut enc = Encoder::new(client.stream());
        enc.write_raw_u32(RpcId::Upgrade as u32).unwrap();
        enc.write_list_size(1).unwrap();
        enc.write_string("not a binary").unwrap();
    }
    let message = client.expect_error_reply().unwrap();
    assert!(
        message.contains("data entry"),
        "error should name the expected type: {message}"
    );
    // The aborted upgrade must not shut the daemon down.
    client.ping().unwrap();
}

#[test]
fn test_wrong_arity_keeps_the_stream_aligned() {
    let addr = support::start_server();
    let mut client = support::connect(addr);

    // getcwd takes no arguments.
    {
        let mut enc = Encoder::new(client.stream());
        enc.write_raw_u32(RpcId::GetCwd as u32).unwrap();
        enc.write_list_size(1).unwrap();
        enc.write_string("extra").unwrap();
    }
    let message = client.expect_error_reply().unwrap();
    assert!(
        message.contains("0"),
        "error should carry the expected arity: {message}"
    );
    client.ping().unwrap();
}

#[test]
fn test_missing_run_arguments_are_reported() {
    let addr = support::start_server();
    let mut client = support::connect(addr);

    // run needs flags, three redirects, and at least one argv entry.
    {
        let mut enc = Encoder::new(client.stream());
        enc.write_raw_u32(RpcId::Run as u32).unwrap();
        enc.write_list_size(4).unwrap();
        enc.write_u32(0).unwrap();
        enc.write_string("").unwrap();
        enc.write_string("").unwrap();
        enc.write_string("").unwrap();
    }
    let message = client.expect_error_reply().unwrap();
    assert!(
        message.contains("at least"),
        "error should explain the arity: {message}"
    );
    client.ping().unwrap();
}

#[test]
fn test_oversized_list_is_fatal() {
    let addr = support::start_server();
    let mut client = support::connect(addr);
    client
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();

    {
        let mut enc = Encoder::new(client.stream());
        enc.write_raw_u32(RpcId::Ping as u32).unwrap();
        // Claim more arguments than the sanity limit allows.
        enc.write_raw_u32(MAX_LIST_SIZE + 1).unwrap();
    }
    let message = client.expect_error_reply().unwrap();
    assert!(
        message.starts_with("fatal:"),
        "reply should carry the fatal marker: {message}"
    );
    assert!(
        message.contains("sanity limit"),
        "reply should name the violation: {message}"
    );

    // The server hung up; nothing more gets through.
    assert!(client.ping().is_err());
}
