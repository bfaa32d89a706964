//! Drops a child from the registry without collecting its status.

use tracing::debug;

use crate::children::ChildRegistry;
use crate::connection::Connection;
use crate::handlers::{HandlerResult, Outcome};

pub fn handle(conn: &mut Connection, children: &ChildRegistry, handle: u64) -> HandlerResult {
    if children.remove(handle) {
        debug!(handle, "forgot child");
        conn.reply_empty()?;
        Ok(Outcome::Done)
    } else {
        conn.error(format!(
            "the {handle} process does not exist or is not a child process"
        ));
        Ok(Outcome::Failed)
    }
}
