//! testagentd is a remote-execution daemon for unattended test machines.
//!
//! It listens on a TCP port for a single controller at a time and
//! services typed RPCs: file transfer in both directions, process
//! launching with handle-based wait/collect, clock adjustment, and
//! self-upgrade. The wire format lives in the `testagent-protocol`
//! crate; this crate holds the daemon and a typed client.

pub mod children;
pub mod client;
pub mod connection;
pub mod dispatcher;
pub mod handlers;
pub mod platform;
pub mod server;
pub mod status;

pub use children::{ChildRegistry, Collect, SpawnError};
pub use client::{ClientError, TestAgentClient};
pub use connection::Connection;
pub use server::{Server, ServerConfig, ServerError};
pub use status::{Level, Status};
