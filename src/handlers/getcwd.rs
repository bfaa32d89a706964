//! Reports the server's current working directory.

use crate::connection::Connection;
use crate::handlers::{HandlerResult, Outcome};

pub fn handle(conn: &mut Connection) -> HandlerResult {
    match std::env::current_dir() {
        Ok(dir) => {
            let dir = dir.to_string_lossy();
            let sent = {
                let mut enc = conn.encoder();
                enc.write_list_size(1).and_then(|()| enc.write_string(&dir))
            };
            sent?;
            Ok(Outcome::Done)
        }
        Err(err) => {
            conn.error(format!("unable to get the current directory: {err}"));
            Ok(Outcome::Failed)
        }
    }
}
