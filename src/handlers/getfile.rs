//! Streams a file's contents back to the client.

use std::fs::File;

use tracing::debug;

use testagent_protocol::WireError;

use crate::connection::Connection;
use crate::handlers::{HandlerResult, Outcome};

pub fn handle(conn: &mut Connection, path: &str) -> HandlerResult {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) => {
            conn.error(format!("unable to open '{path}' for reading: {err}"));
            return Ok(Outcome::Failed);
        }
    };
    let size = match file.metadata() {
        Ok(meta) => meta.len(),
        Err(err) => {
            conn.error(format!("unable to stat '{path}': {err}"));
            return Ok(Outcome::Failed);
        }
    };
    debug!(path, size, "sending file");

    // The blob header commits the reply to `size` bytes, so source
    // trouble past this point is patched over with zeros to keep the
    // stream aligned.
    let result = {
        let mut enc = conn.encoder();
        enc.write_list_size(1)
            .and_then(|()| enc.write_blob_from(&mut file, size))
    };
    match result {
        Ok(sent) if sent == size => Ok(Outcome::Done),
        Ok(sent) => {
            conn.error(format!("'{path}' shrank while sending ({sent} of {size} bytes)"));
            Ok(Outcome::Done)
        }
        Err(err @ WireError::Source(_)) => {
            conn.error(format!("unable to read '{path}': {err}"));
            Ok(Outcome::Done)
        }
        Err(err) => Err(err),
    }
}
