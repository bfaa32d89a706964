//! Waits for a tracked child to exit, bounded by a timeout and by the
//! client staying connected.
//!
//! The wait runs in slices: each slice blocks on the client socket so a
//! disconnect cancels the wait promptly instead of orphaning the server
//! in a long sleep. A timeout leaves the child tracked so the client can
//! ask again.

use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use testagent_protocol::rpc::NO_TIMEOUT;

use crate::children::{ChildRegistry, Collect, POLL_INTERVAL};
use crate::connection::Connection;
use crate::handlers::{HandlerResult, Outcome};
use crate::platform;

pub fn handle(
    conn: &mut Connection,
    children: &ChildRegistry,
    handle: u64,
    timeout: u32,
) -> HandlerResult {
    let deadline = if timeout == NO_TIMEOUT {
        None
    } else {
        Some(Instant::now() + Duration::from_secs(u64::from(timeout)))
    };
    loop {
        match children.try_collect(handle) {
            Collect::Reaped(status) => {
                debug!(handle, status, "collected child");
                let sent = {
                    let mut enc = conn.encoder();
                    enc.write_list_size(1).and_then(|()| enc.write_u32(status))
                };
                sent?;
                return Ok(Outcome::Done);
            }
            Collect::NoSuchChild => {
                conn.error(format!(
                    "the {handle} process does not exist or is not a child process"
                ));
                return Ok(Outcome::Failed);
            }
            Collect::Running => {}
        }

        let slice = match deadline {
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    conn.error("timed out waiting for the child process");
                    return Ok(Outcome::Failed);
                }
                left.min(POLL_INTERVAL)
            }
            None => POLL_INTERVAL,
        };

        match platform::wait_readable(conn.stream(), slice) {
            Ok(false) => {}
            Ok(true) => match platform::peer_closed(conn.stream()) {
                Ok(true) => {
                    conn.fatal("connection closed");
                    return Ok(Outcome::Failed);
                }
                Ok(false) => {
                    // The client sent its next request early. Sleep out
                    // the slice so the pending bytes cannot turn this
                    // loop into a busy spin.
                    thread::sleep(slice);
                }
                Err(err) => {
                    conn.fatal(format!("connection error: {err}"));
                    return Ok(Outcome::Failed);
                }
            },
            Err(err) => {
                conn.fatal(format!("connection error: {err}"));
                return Ok(Outcome::Failed);
            }
        }
    }
}
