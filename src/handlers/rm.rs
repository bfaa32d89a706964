//! Deletes files, reporting per-path outcomes when any of them fail.

use tracing::debug;

use crate::connection::Connection;
use crate::handlers::{HandlerResult, Outcome};

pub fn handle(conn: &mut Connection, paths: &[String]) -> HandlerResult {
    let results: Vec<Option<String>> = paths
        .iter()
        .map(|path| match std::fs::remove_file(path) {
            Ok(()) => None,
            Err(err) => Some(format!("unable to delete '{path}': {err}")),
        })
        .collect();

    let failed = results.iter().filter(|r| r.is_some()).count();
    if failed == 0 {
        conn.reply_empty()?;
        return Ok(Outcome::Done);
    }

    debug!(total = paths.len(), failed, "rm failures");
    // Mixed outcome: one entry per path, in request order, so the client
    // can tell which deletions went through.
    let sent = {
        let mut enc = conn.encoder();
        let mut result = enc.write_list_size(results.len() as u32);
        for outcome in &results {
            if result.is_err() {
                break;
            }
            result = match outcome {
                None => enc.write_undefined(),
                Some(message) => enc.write_error(message),
            };
        }
        result
    };
    sent?;
    conn.error(format!("failed to delete {failed} of {} files", paths.len()));
    Ok(Outcome::Done)
}
