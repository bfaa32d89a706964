//! Starts a child process and replies with its handle.

use crate::children::ChildRegistry;
use crate::connection::Connection;
use crate::handlers::{HandlerResult, Outcome};

#[allow(clippy::too_many_arguments)]
pub fn handle(
    conn: &mut Connection,
    children: &ChildRegistry,
    flags: u32,
    stdin: &str,
    stdout: &str,
    stderr: &str,
    argv: &[String],
) -> HandlerResult {
    match children.start(argv, flags, stdin, stdout, stderr) {
        Ok(handle) => {
            let sent = {
                let mut enc = conn.encoder();
                enc.write_list_size(1).and_then(|()| enc.write_u64(handle))
            };
            sent?;
            Ok(Outcome::Done)
        }
        Err(err) => {
            conn.error(err.to_string());
            Ok(Outcome::Failed)
        }
    }
}
