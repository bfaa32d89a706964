//! Receives a file from the client, optionally marking it executable.

use std::fs::File;
use std::net::TcpStream;
use std::path::Path;

use tracing::debug;

use testagent_protocol::rpc::sendfile_flags;
use testagent_protocol::{Decoder, WireError};

use crate::connection::Connection;
use crate::handlers::{HandlerResult, Outcome};
use crate::platform;

/// The file blob is still pending on `dec` when this runs. Whatever
/// happens, the blob must be consumed so the stream stays aligned.
pub fn handle(
    conn: &mut Connection,
    dec: &mut Decoder<TcpStream>,
    path: &str,
    flags: u32,
) -> HandlerResult {
    let mut file = match File::create(path) {
        Ok(file) => file,
        Err(err) => {
            dec.skip_entry()?;
            conn.error(format!("unable to open '{path}' for writing: {err}"));
            return Ok(Outcome::Failed);
        }
    };
    match dec.read_blob_to_sink(&mut file) {
        Ok(size) => {
            drop(file);
            if flags & sendfile_flags::SENDFILE_EXE != 0 {
                if let Err(err) = platform::make_executable(Path::new(path)) {
                    let _ = std::fs::remove_file(path);
                    conn.error(format!("unable to make '{path}' executable: {err}"));
                    return Ok(Outcome::Failed);
                }
            }
            debug!(path, size, "received file");
            conn.reply_empty()?;
            Ok(Outcome::Done)
        }
        Err(WireError::Sink(err)) => {
            // The decoder drained the rest of the blob; only the partial
            // file needs cleaning up.
            drop(file);
            let _ = std::fs::remove_file(path);
            conn.error(format!("unable to write '{path}': {err}"));
            Ok(Outcome::Failed)
        }
        Err(err) if !err.is_fatal() => {
            // Wrong entry type where the blob belongs; the decoder already
            // realigned the stream.
            drop(file);
            let _ = std::fs::remove_file(path);
            conn.error(err.to_string());
            Ok(Outcome::Failed)
        }
        Err(err) => {
            drop(file);
            let _ = std::fs::remove_file(path);
            Err(err)
        }
    }
}
