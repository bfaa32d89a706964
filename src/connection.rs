//! Per-connection state: the transport plus the outcome of the last
//! operation on it.

use std::io;
use std::net::TcpStream;

use tracing::debug;

use testagent_protocol::{Encoder, WireError, PROTOCOL_VERSION};

use crate::status::{Level, Status};

/// One accepted client connection and everything scoped to it.
pub struct Connection {
    stream: TcpStream,
    status: Status,
    /// Set by a successful upgrade; ends the accept loop.
    quit: bool,
    /// Operation currently being serviced, for diagnostics.
    current_op: &'static str,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            status: Status::new(),
            quit: false,
            current_op: "none",
        }
    }

    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    /// Duplicates the socket so requests can be decoded independently of
    /// reply writing.
    pub fn try_clone_stream(&self) -> io::Result<TcpStream> {
        self.stream.try_clone()
    }

    /// A reply encoder over the socket. Encoders are stateless, so
    /// handlers create one per reply.
    pub fn encoder(&self) -> Encoder<&TcpStream> {
        Encoder::new(&self.stream)
    }

    /// Blocks until the next request's first byte is available without
    /// consuming it. Returns false once the peer has shut down.
    pub fn await_request(&self) -> io::Result<bool> {
        let mut byte = [0u8; 1];
        Ok(self.stream.peek(&mut byte)? != 0)
    }

    pub fn begin_op(&mut self, name: &'static str) {
        self.current_op = name;
    }

    pub fn current_op(&self) -> &'static str {
        self.current_op
    }

    /// Records a recoverable failure of the current operation.
    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        debug!(op = self.current_op, "error: {message}");
        self.status.set(Level::Error, message);
    }

    /// Records a failure the connection cannot recover from.
    pub fn fatal(&mut self, message: impl Into<String>) {
        let message = message.into();
        debug!(op = self.current_op, "fatal: {message}");
        self.status.set(Level::Fatal, message);
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn request_quit(&mut self) {
        self.quit = true;
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    /// Sends the version banner a client reads right after connecting.
    pub fn send_banner(&mut self) -> Result<(), WireError> {
        let mut enc = Encoder::new(&self.stream);
        enc.write_string(PROTOCOL_VERSION)
    }

    /// Sends a success reply that carries no values.
    pub fn reply_empty(&mut self) -> Result<(), WireError> {
        let mut enc = Encoder::new(&self.stream);
        enc.write_list_size(0)
    }

    /// Sends the current status as a single-entry error reply.
    pub fn send_error_reply(&mut self) -> Result<(), WireError> {
        let message = self.status.wire_message();
        let mut enc = Encoder::new(&self.stream);
        enc.write_list_size(1)?;
        enc.write_error(&message)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::net::{TcpListener, TcpStream};

    use testagent_protocol::{Decoder, PROTOCOL_VERSION};

    use super::*;

    fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (server, client)
    }

    #[test]
    fn test_banner_is_a_string_entry() {
        let (server, client) = socket_pair();
        let mut conn = Connection::new(server);
        conn.send_banner().unwrap();
        let mut dec = Decoder::new(&client);
        assert_eq!(dec.read_string().unwrap(), PROTOCOL_VERSION);
    }

    #[test]
    fn test_error_reply_carries_status_message() {
        let (server, client) = socket_pair();
        let mut conn = Connection::new(server);
        conn.error("no such file");
        conn.send_error_reply().unwrap();
        let mut dec = Decoder::new(&client);
        assert_eq!(dec.read_list_size().unwrap(), 1);
        assert_eq!(dec.read_error().unwrap(), "no such file");
    }

    #[test]
    fn test_fatal_reply_is_prefixed() {
        let (server, client) = socket_pair();
        let mut conn = Connection::new(server);
        conn.fatal("list size 70000 exceeds the sanity limit");
        conn.send_error_reply().unwrap();
        let mut dec = Decoder::new(&client);
        assert_eq!(dec.read_list_size().unwrap(), 1);
        assert_eq!(
            dec.read_error().unwrap(),
            "fatal: list size 70000 exceeds the sanity limit"
        );
    }

    #[test]
    fn test_await_request_sees_pending_byte_without_consuming() {
        use std::io::Write;

        let (server, mut client) = socket_pair();
        let conn = Connection::new(server);
        client.write_all(&[0x42]).unwrap();
        assert!(conn.await_request().unwrap());
        // The byte is still there for the decoder.
        let mut buf = [0u8; 1];
        let mut reader = conn.stream();
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(buf[0], 0x42);
    }

    #[test]
    fn test_await_request_reports_shutdown() {
        let (server, client) = socket_pair();
        let conn = Connection::new(server);
        drop(client);
        assert!(!conn.await_request().unwrap());
    }
}
