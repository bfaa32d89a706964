//! Sets the system clock, within a client-supplied leeway.

use crate::connection::Connection;
use crate::handlers::{HandlerResult, Outcome};
use crate::platform;

pub fn handle(conn: &mut Connection, epoch: u64, leeway: u32) -> HandlerResult {
    match platform::set_system_time(epoch, leeway) {
        Ok(()) => {
            conn.reply_empty()?;
            Ok(Outcome::Done)
        }
        Err(err) => {
            conn.error(format!("unable to set the system time: {err}"));
            Ok(Outcome::Failed)
        }
    }
}
