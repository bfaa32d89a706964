//! Per-connection request loop: decode, dispatch, reply, recover.

use std::net::TcpStream;

use tracing::{debug, info, warn};

use testagent_protocol::rpc::NO_TIMEOUT;
use testagent_protocol::{decode_request, Decoder, Request, WireError};

use crate::children::ChildRegistry;
use crate::connection::Connection;
use crate::handlers::{self, Outcome};

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEnd {
    /// The peer disconnected or the connection failed; keep accepting.
    Disconnected,
    /// An upgrade asked the daemon to stop accepting.
    Quit,
}

/// Services one accepted connection until the peer goes away, the
/// connection turns fatal, or an upgrade requests shutdown.
pub fn serve(stream: TcpStream, children: &ChildRegistry) -> ConnectionEnd {
    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown".into());
    info!(peer = %peer, "client connected");

    let mut conn = Connection::new(stream);
    if let Err(err) = conn.send_banner() {
        warn!(peer = %peer, error = %err, "unable to send the version banner");
        return ConnectionEnd::Disconnected;
    }
    let reader = match conn.try_clone_stream() {
        Ok(reader) => reader,
        Err(err) => {
            warn!(peer = %peer, error = %err, "unable to clone the connection");
            return ConnectionEnd::Disconnected;
        }
    };
    let mut dec = Decoder::new(reader);

    loop {
        match conn.await_request() {
            Ok(true) => {}
            Ok(false) => {
                info!(peer = %peer, "client disconnected");
                break;
            }
            Err(err) => {
                warn!(peer = %peer, error = %err, "connection lost");
                break;
            }
        }

        let request = match decode_request(&mut dec) {
            Ok(request) => request,
            Err(err) if err.is_fatal() => {
                conn.fatal(err.to_string());
                warn!(peer = %peer, error = %err, "request stream is unrecoverable");
                // When the failure was not I/O itself the transport may
                // still work, so tell the client before hanging up.
                if !matches!(err, WireError::Io(_)) {
                    let _ = conn.send_error_reply();
                }
                break;
            }
            Err(err) => {
                // The decoder realigned the stream; report and carry on.
                conn.error(err.to_string());
                if conn.send_error_reply().is_err() {
                    break;
                }
                continue;
            }
        };

        conn.begin_op(request.name());
        debug!(peer = %peer, op = request.name(), "request");

        match dispatch(&mut conn, &mut dec, children, request) {
            Ok(Outcome::Done) => {}
            Ok(Outcome::Failed) => {
                if conn.status().is_fatal() {
                    // The client vanished mid-operation; nothing to send.
                    break;
                }
                if conn.send_error_reply().is_err() {
                    break;
                }
            }
            Err(err) => {
                conn.fatal(err.to_string());
                warn!(peer = %peer, error = %err, "connection failed");
                if !matches!(err, WireError::Io(_)) {
                    let _ = conn.send_error_reply();
                }
                break;
            }
        }

        if conn.should_quit() {
            return ConnectionEnd::Quit;
        }
    }
    ConnectionEnd::Disconnected
}

fn dispatch(
    conn: &mut Connection,
    dec: &mut Decoder<TcpStream>,
    children: &ChildRegistry,
    request: Request,
) -> handlers::HandlerResult {
    match request {
        Request::Ping => handlers::ping::handle(conn),
        Request::GetFile { path } => handlers::getfile::handle(conn, &path),
        Request::SendFile { path, flags } => handlers::sendfile::handle(conn, dec, &path, flags),
        Request::Run {
            flags,
            stdin,
            stdout,
            stderr,
            argv,
        } => handlers::run::handle(conn, children, flags, &stdin, &stdout, &stderr, &argv),
        Request::Wait { handle } => handlers::wait::handle(conn, children, handle, NO_TIMEOUT),
        Request::Wait2 { handle, timeout } => handlers::wait::handle(conn, children, handle, timeout),
        Request::Rm { paths } => handlers::rm::handle(conn, &paths),
        Request::RmChildProc { handle } => handlers::rmchildproc::handle(conn, children, handle),
        Request::SetTime { epoch, leeway } => handlers::settime::handle(conn, epoch, leeway),
        Request::GetProperties => handlers::getproperties::handle(conn),
        Request::Upgrade => handlers::upgrade::handle(conn, dec),
        Request::GetCwd => handlers::getcwd::handle(conn),
        Request::Unknown { id, argc } => {
            debug!(id, argc, "unknown operation");
            conn.error(format!("unknown RPC id: {id}"));
            Ok(Outcome::Failed)
        }
    }
}
