//! Shared helpers for the integration suites: a daemon on an ephemeral
//! port plus a connected client.

use std::net::SocketAddr;
use std::thread;

use testagentd::{Server, ServerConfig, TestAgentClient};

/// Starts a daemon on an ephemeral port. It keeps serving in the
/// background for the rest of the test process; each test gets its own
/// so the one-client-at-a-time design cannot make tests block each
/// other.
pub fn start_server() -> SocketAddr {
    let server = Server::bind(ServerConfig {
        port: 0,
        srchost: None,
    })
    .expect("unable to bind the test server");
    let addr = server.local_addr().expect("listener has no local address");
    thread::spawn(move || {
        let _ = server.run();
    });
    addr
}

pub fn connect(addr: SocketAddr) -> TestAgentClient {
    TestAgentClient::connect(addr).expect("unable to connect to the test server")
}
