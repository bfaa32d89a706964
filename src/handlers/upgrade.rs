//! Replaces the server binary with one uploaded by the client.
//!
//! The running executable cannot be overwritten in place, so the blob
//! lands next to it and a detached helper script performs the swap and
//! relaunch after this process exits. On success the reply goes out
//! first, then the accept loop is told to quit.

use std::ffi::OsString;
use std::fs::File;
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use testagent_protocol::{Decoder, WireError};

use crate::connection::Connection;
use crate::handlers::{HandlerResult, Outcome};
use crate::platform;

pub fn handle(conn: &mut Connection, dec: &mut Decoder<TcpStream>) -> HandlerResult {
    let server = match std::env::current_exe() {
        Ok(path) => path,
        Err(err) => {
            dec.skip_entry()?;
            conn.error(format!("unable to locate the server binary: {err}"));
            return Ok(Outcome::Failed);
        }
    };
    let replacement = staged_path(&server, ".new");

    let mut file = match File::create(&replacement) {
        Ok(file) => file,
        Err(err) => {
            dec.skip_entry()?;
            conn.error(format!(
                "unable to open '{}' for writing: {err}",
                replacement.display()
            ));
            return Ok(Outcome::Failed);
        }
    };
    match dec.read_blob_to_sink(&mut file) {
        Ok(size) => {
            drop(file);
            debug!(size, path = %replacement.display(), "received replacement binary");
        }
        Err(WireError::Sink(err)) => {
            drop(file);
            let _ = std::fs::remove_file(&replacement);
            conn.error(format!(
                "unable to write '{}': {err}",
                replacement.display()
            ));
            return Ok(Outcome::Failed);
        }
        Err(err) if !err.is_fatal() => {
            drop(file);
            let _ = std::fs::remove_file(&replacement);
            conn.error(err.to_string());
            return Ok(Outcome::Failed);
        }
        Err(err) => {
            drop(file);
            let _ = std::fs::remove_file(&replacement);
            return Err(err);
        }
    }

    if let Err(err) = platform::make_executable(&replacement) {
        let _ = std::fs::remove_file(&replacement);
        conn.error(format!(
            "unable to make '{}' executable: {err}",
            replacement.display()
        ));
        return Ok(Outcome::Failed);
    }

    let script = staged_path(&server, ".sh");
    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(err) = platform::write_upgrade_script(&script, &replacement, &server, &args) {
        cleanup(&replacement, &script);
        conn.error(format!("unable to write '{}': {err}", script.display()));
        return Ok(Outcome::Failed);
    }

    // The helper outlives this process on purpose; it is not tracked.
    if let Err(err) = Command::new(&script).spawn() {
        cleanup(&replacement, &script);
        conn.error(format!("unable to run '{}': {err}", script.display()));
        return Ok(Outcome::Failed);
    }

    info!("upgrade staged; shutting down for the swap");
    conn.reply_empty()?;
    conn.request_quit();
    Ok(Outcome::Done)
}

fn cleanup(replacement: &Path, script: &Path) {
    let _ = std::fs::remove_file(replacement);
    let _ = std::fs::remove_file(script);
}

/// Appends `suffix` to the file name; `agent.bin` stages to
/// `agent.bin.new`.
fn staged_path(server: &Path, suffix: &str) -> PathBuf {
    let mut name = server.file_name().map(OsString::from).unwrap_or_default();
    name.push(suffix);
    server.with_file_name(name)
}
