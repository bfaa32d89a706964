//! End-to-end RPC sessions against a live daemon:
//! - version banner and liveness
//! - process launch, wait, and status collection
//! - server properties and working directory
//! - clock adjustment inside the leeway window
//! - reconnecting after a dropped connection

#![cfg(unix)]

mod support;

use testagent_protocol::PROTOCOL_VERSION;

#[test]
fn test_banner_and_ping() {
    let addr = support::start_server();
    let mut client = support::connect(addr);
    assert_eq!(client.version(), PROTOCOL_VERSION);
    client.ping().unwrap();
    client.ping().unwrap();
}

#[test]
fn test_run_and_wait_collects_the_exit_status() {
    let addr = support::start_server();
    let mut client = support::connect(addr);

    let handle = client
        .run(&["/bin/sh", "-c", "exit 7"], 0, "", "", "")
        .unwrap();
    assert!(handle > 0);

    let status = client.wait2(handle, 30).unwrap();
    // Raw wait() status word: the exit code sits in the second byte.
    assert_eq!(status, 7 << 8);

    // Collection removed the record; the handle is gone now.
    let err = client.wait2(handle, 5).unwrap_err();
    assert!(
        err.to_string().contains("does not exist"),
        "unexpected error: {err}"
    );
}

#[test]
fn test_wait_without_timeout() {
    let addr = support::start_server();
    let mut client = support::connect(addr);

    let handle = client.run(&["/bin/true"], 0, "", "", "").unwrap();
    assert_eq!(client.wait(handle).unwrap(), 0);
}

#[test]
fn test_properties_report_version_and_arch() {
    let addr = support::start_server();
    let mut client = support::connect(addr);

    let (version, arch) = client.get_properties().unwrap();
    assert_eq!(version, PROTOCOL_VERSION);
    assert_eq!(arch, std::env::consts::ARCH);
}

#[test]
fn test_cwd_matches_the_server_process() {
    let addr = support::start_server();
    let mut client = support::connect(addr);

    let cwd = client.get_cwd().unwrap();
    let expected = std::env::current_dir().unwrap();
    assert_eq!(cwd, expected.to_string_lossy());
}

#[test]
fn test_settime_within_leeway_succeeds_unprivileged() {
    let addr = support::start_server();
    let mut client = support::connect(addr);

    // Inside the leeway the server never touches the clock, so this
    // works without root.
    let now = chrono::Utc::now().timestamp() as u64;
    client.set_time(now, 300).unwrap();
}

#[test]
fn test_reconnect_after_disconnect() {
    let addr = support::start_server();
    {
        let mut first = support::connect(addr);
        first.ping().unwrap();
    }
    let mut second = support::connect(addr);
    second.ping().unwrap();
}

#[test]
fn test_full_session() {
    let addr = support::start_server();
    {
        let mut client = support::connect(addr);
        assert_eq!(client.version(), PROTOCOL_VERSION);
        client.ping().unwrap();

        let handle = client.run(&["/bin/true"], 0, "", "", "").unwrap();
        assert!(handle > 0);
        assert_eq!(client.wait2(handle, 5).unwrap(), 0);

        assert!(client.rm(&[]).unwrap().is_empty());
    }
    // The daemon survives the disconnect and takes the next client.
    let mut next = support::connect(addr);
    next.ping().unwrap();
}
