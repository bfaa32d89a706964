//! Liveness check; replies with an empty list.

use crate::connection::Connection;
use crate::handlers::{HandlerResult, Outcome};

pub fn handle(conn: &mut Connection) -> HandlerResult {
    conn.reply_empty()?;
    Ok(Outcome::Done)
}
