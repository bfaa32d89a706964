//! Typed client for the daemon's RPC protocol.
//!
//! Each method sends one request and parses its reply. A server-side
//! error reply surfaces as [`ClientError::Agent`] carrying the message
//! text the daemon produced.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use thiserror::Error;

use testagent_protocol::rpc::RpcId;
use testagent_protocol::{Decoder, Encoder, EntryType, WireError};

#[derive(Debug, Error)]
pub enum ClientError {
    /// The daemon reported the operation failed.
    #[error("agent error: {0}")]
    Agent(String),
    /// The reply did not have the shape this operation calls for.
    #[error("unexpected reply: {0}")]
    Reply(String),
    #[error(transparent)]
    Wire(#[from] WireError),
}

pub struct TestAgentClient {
    stream: TcpStream,
    /// Version banner the server sent on connect.
    version: String,
}

impl TestAgentClient {
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).map_err(WireError::Io)?;
        let version = {
            let mut dec = Decoder::new(&stream);
            dec.read_string()?
        };
        Ok(Self { stream, version })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// The raw socket, for tests that hand-craft requests.
    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.stream.set_read_timeout(timeout)
    }

    pub fn ping(&mut self) -> Result<(), ClientError> {
        self.send_plain(RpcId::Ping, &[])?;
        self.expect_empty_reply()
    }

    /// Downloads `path` from the server into `sink`, returning the byte
    /// count the server declared.
    pub fn get_file<W: Write>(&mut self, path: &str, sink: &mut W) -> Result<u64, ClientError> {
        self.send_plain(RpcId::GetFile, &[path])?;
        let mut dec = Decoder::new(&self.stream);
        let count = begin_reply(&mut dec)?;
        if count != 1 {
            return Err(ClientError::Reply(format!(
                "getfile returned {count} entries"
            )));
        }
        Ok(dec.read_blob_to_sink(sink)?)
    }

    /// Uploads `size` bytes from `source` to `path` on the server.
    pub fn send_file<R: Read>(
        &mut self,
        path: &str,
        flags: u32,
        source: &mut R,
        size: u64,
    ) -> Result<(), ClientError> {
        {
            let mut enc = Encoder::new(&self.stream);
            enc.write_raw_u32(RpcId::SendFile as u32)?;
            enc.write_list_size(3)?;
            enc.write_string(path)?;
            enc.write_u32(flags)?;
            enc.write_blob_from(source, size)?;
        }
        self.expect_empty_reply()
    }

    /// Starts a process on the server and returns its handle.
    pub fn run(
        &mut self,
        argv: &[&str],
        flags: u32,
        stdin: &str,
        stdout: &str,
        stderr: &str,
    ) -> Result<u64, ClientError> {
        {
            let mut enc = Encoder::new(&self.stream);
            enc.write_raw_u32(RpcId::Run as u32)?;
            enc.write_list_size(4 + argv.len() as u32)?;
            enc.write_u32(flags)?;
            enc.write_string(stdin)?;
            enc.write_string(stdout)?;
            enc.write_string(stderr)?;
            for arg in argv {
                enc.write_string(arg)?;
            }
        }
        let mut dec = Decoder::new(&self.stream);
        let count = begin_reply(&mut dec)?;
        if count != 1 {
            return Err(ClientError::Reply(format!("run returned {count} entries")));
        }
        Ok(dec.read_u64()?)
    }

    /// Blocks until the child exits and returns its native exit status.
    pub fn wait(&mut self, handle: u64) -> Result<u32, ClientError> {
        self.send_wait(RpcId::Wait, handle, None)
    }

    /// Like [`wait`](Self::wait) with an upper bound in seconds.
    pub fn wait2(&mut self, handle: u64, timeout: u32) -> Result<u32, ClientError> {
        self.send_wait(RpcId::Wait2, handle, Some(timeout))
    }

    /// Deletes files on the server. The result has one slot per path:
    /// None for a successful deletion, the failure message otherwise.
    pub fn rm(&mut self, paths: &[&str]) -> Result<Vec<Option<String>>, ClientError> {
        {
            let mut enc = Encoder::new(&self.stream);
            enc.write_raw_u32(RpcId::Rm as u32)?;
            enc.write_list_size(paths.len() as u32)?;
            for path in paths {
                enc.write_string(path)?;
            }
        }
        let mut dec = Decoder::new(&self.stream);
        let count = dec.read_list_size()?;
        if count == 0 {
            return Ok(vec![None; paths.len()]);
        }
        if count as usize != paths.len() {
            if count == 1 {
                let header = dec.peek_entry()?;
                if header.tag == EntryType::Error.tag() {
                    return Err(ClientError::Agent(dec.read_error()?));
                }
            }
            return Err(ClientError::Reply(format!(
                "rm returned {count} entries for {} paths",
                paths.len()
            )));
        }
        let mut results = Vec::with_capacity(paths.len());
        for _ in 0..count {
            let header = dec.peek_entry()?;
            if header.tag == EntryType::Undefined.tag() {
                dec.read_undefined()?;
                results.push(None);
            } else {
                results.push(Some(dec.read_error()?));
            }
        }
        Ok(results)
    }

    pub fn rm_child_proc(&mut self, handle: u64) -> Result<(), ClientError> {
        {
            let mut enc = Encoder::new(&self.stream);
            enc.write_raw_u32(RpcId::RmChildProc as u32)?;
            enc.write_list_size(1)?;
            enc.write_u64(handle)?;
        }
        self.expect_empty_reply()
    }

    pub fn set_time(&mut self, epoch: u64, leeway: u32) -> Result<(), ClientError> {
        {
            let mut enc = Encoder::new(&self.stream);
            enc.write_raw_u32(RpcId::SetTime as u32)?;
            enc.write_list_size(2)?;
            enc.write_u64(epoch)?;
            enc.write_u32(leeway)?;
        }
        self.expect_empty_reply()
    }

    /// Returns the server's protocol version and architecture.
    pub fn get_properties(&mut self) -> Result<(String, String), ClientError> {
        self.send_plain(RpcId::GetProperties, &[])?;
        let mut dec = Decoder::new(&self.stream);
        let count = begin_reply(&mut dec)?;
        if count != 2 {
            return Err(ClientError::Reply(format!(
                "getproperties returned {count} entries"
            )));
        }
        let version = dec.read_string()?;
        let arch = dec.read_string()?;
        Ok((version, arch))
    }

    /// Uploads a replacement server binary. On success the server swaps
    /// itself out and stops accepting connections.
    pub fn upgrade<R: Read>(&mut self, source: &mut R, size: u64) -> Result<(), ClientError> {
        {
            let mut enc = Encoder::new(&self.stream);
            enc.write_raw_u32(RpcId::Upgrade as u32)?;
            enc.write_list_size(1)?;
            enc.write_blob_from(source, size)?;
        }
        self.expect_empty_reply()
    }

    pub fn get_cwd(&mut self) -> Result<String, ClientError> {
        self.send_plain(RpcId::GetCwd, &[])?;
        let mut dec = Decoder::new(&self.stream);
        let count = begin_reply(&mut dec)?;
        if count != 1 {
            return Err(ClientError::Reply(format!(
                "getcwd returned {count} entries"
            )));
        }
        Ok(dec.read_string()?)
    }

    /// Reads one reply and requires it to be an error reply; used by
    /// tests that send deliberately broken requests.
    pub fn expect_error_reply(&mut self) -> Result<String, ClientError> {
        let mut dec = Decoder::new(&self.stream);
        match begin_reply(&mut dec) {
            Err(ClientError::Agent(message)) => Ok(message),
            Ok(count) => Err(ClientError::Reply(format!(
                "expected an error reply, got {count} entries"
            ))),
            Err(other) => Err(other),
        }
    }

    /// Sends a request whose arguments are all strings.
    fn send_plain(&mut self, id: RpcId, args: &[&str]) -> Result<(), ClientError> {
        let mut enc = Encoder::new(&self.stream);
        enc.write_raw_u32(id as u32)?;
        enc.write_list_size(args.len() as u32)?;
        for arg in args {
            enc.write_string(arg)?;
        }
        Ok(())
    }

    fn send_wait(
        &mut self,
        id: RpcId,
        handle: u64,
        timeout: Option<u32>,
    ) -> Result<u32, ClientError> {
        {
            let mut enc = Encoder::new(&self.stream);
            enc.write_raw_u32(id as u32)?;
            enc.write_list_size(if timeout.is_some() { 2 } else { 1 })?;
            enc.write_u64(handle)?;
            if let Some(timeout) = timeout {
                enc.write_u32(timeout)?;
            }
        }
        let mut dec = Decoder::new(&self.stream);
        let count = begin_reply(&mut dec)?;
        if count != 1 {
            return Err(ClientError::Reply(format!("wait returned {count} entries")));
        }
        Ok(dec.read_u32()?)
    }

    fn expect_empty_reply(&mut self) -> Result<(), ClientError> {
        let mut dec = Decoder::new(&self.stream);
        let count = begin_reply(&mut dec)?;
        if count != 0 {
            return Err(ClientError::Reply(format!(
                "expected an empty reply, got {count} entries"
            )));
        }
        Ok(())
    }
}

/// Reads a reply list header. A single-entry reply whose entry is an
/// error string is the server reporting failure; everything else is
/// returned to the caller as the entry count.
fn begin_reply<R: Read>(dec: &mut Decoder<R>) -> Result<u32, ClientError> {
    let count = dec.read_list_size()?;
    if count == 1 {
        let header = dec.peek_entry()?;
        if header.tag == EntryType::Error.tag() {
            return Err(ClientError::Agent(dec.read_error()?));
        }
    }
    Ok(count)
}
