//! RPC identifiers and the decoded request model.

use std::io::Read;

use crate::decoder::Decoder;
use crate::error::WireError;

/// Wire operation ids, in the order the protocol grew: the file/run/wait
/// core first, later additions appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcId {
    Ping = 0,
    GetFile = 1,
    SendFile = 2,
    Run = 3,
    Wait = 4,
    Rm = 5,
    Wait2 = 6,
    SetTime = 7,
    GetProperties = 8,
    Upgrade = 9,
    RmChildProc = 10,
    GetCwd = 11,
}

impl RpcId {
    pub fn from_u32(id: u32) -> Option<Self> {
        match id {
            0 => Some(Self::Ping),
            1 => Some(Self::GetFile),
            2 => Some(Self::SendFile),
            3 => Some(Self::Run),
            4 => Some(Self::Wait),
            5 => Some(Self::Rm),
            6 => Some(Self::Wait2),
            7 => Some(Self::SetTime),
            8 => Some(Self::GetProperties),
            9 => Some(Self::Upgrade),
            10 => Some(Self::RmChildProc),
            11 => Some(Self::GetCwd),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::GetFile => "getfile",
            Self::SendFile => "sendfile",
            Self::Run => "run",
            Self::Wait => "wait",
            Self::Rm => "rm",
            Self::Wait2 => "wait2",
            Self::SetTime => "settime",
            Self::GetProperties => "getproperties",
            Self::Upgrade => "upgrade",
            Self::RmChildProc => "rmchildproc",
            Self::GetCwd => "getcwd",
        }
    }
}

/// Flags accepted by the `run` operation.
pub mod run_flags {
    /// Detach: launch without tracking, no handle bookkeeping.
    pub const RUN_DNT: u32 = 1;
    /// Do not truncate the stdout redirect file at open.
    pub const RUN_DNTRUNC_OUT: u32 = 2;
    /// Do not truncate the stderr redirect file at open.
    pub const RUN_DNTRUNC_ERR: u32 = 4;
}

/// Flags accepted by the `sendfile` operation.
pub mod sendfile_flags {
    /// Mark the received file executable.
    pub const SENDFILE_EXE: u32 = 1;
}

/// `wait2` timeout value meaning "block indefinitely".
pub const NO_TIMEOUT: u32 = 0xFFFF_FFFF;

/// One decoded request: the operation and its typed arguments.
///
/// `SendFile` and `Upgrade` carry a trailing blob that is deliberately not
/// decoded here: it stays on the stream for the handler to stream to its
/// destination, or to drain when the destination cannot be opened.
#[derive(Debug)]
pub enum Request {
    Ping,
    GetFile {
        path: String,
    },
    /// File data blob still pending on the stream.
    SendFile {
        path: String,
        flags: u32,
    },
    Run {
        flags: u32,
        stdin: String,
        stdout: String,
        stderr: String,
        argv: Vec<String>,
    },
    Wait {
        handle: u64,
    },
    Rm {
        paths: Vec<String>,
    },
    Wait2 {
        handle: u64,
        timeout: u32,
    },
    SetTime {
        epoch: u64,
        leeway: u32,
    },
    GetProperties,
    /// New server binary blob still pending on the stream.
    Upgrade,
    RmChildProc {
        handle: u64,
    },
    GetCwd,
    /// Unrecognized operation id; the declared arguments were already
    /// drained entry-by-entry, so the stream is aligned on the next id.
    Unknown {
        id: u32,
        argc: u32,
    },
}

impl Request {
    /// Operation name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ping => RpcId::Ping.name(),
            Self::GetFile { .. } => RpcId::GetFile.name(),
            Self::SendFile { .. } => RpcId::SendFile.name(),
            Self::Run { .. } => RpcId::Run.name(),
            Self::Wait { .. } => RpcId::Wait.name(),
            Self::Rm { .. } => RpcId::Rm.name(),
            Self::Wait2 { .. } => RpcId::Wait2.name(),
            Self::SetTime { .. } => RpcId::SetTime.name(),
            Self::GetProperties => RpcId::GetProperties.name(),
            Self::Upgrade => RpcId::Upgrade.name(),
            Self::RmChildProc { .. } => RpcId::RmChildProc.name(),
            Self::GetCwd => RpcId::GetCwd.name(),
            Self::Unknown { .. } => "unknown",
        }
    }
}

/// Argument-list reader that keeps the stream aligned: when one argument
/// fails to decode recoverably, the remaining declared entries are drained
/// before the error surfaces.
struct Args<'a, R> {
    dec: &'a mut Decoder<R>,
    left: u32,
}

impl<'a, R: Read> Args<'a, R> {
    fn new(dec: &'a mut Decoder<R>, declared: u32) -> Self {
        Self {
            dec,
            left: declared,
        }
    }

    fn finish<T>(&mut self, result: Result<T, WireError>) -> Result<T, WireError> {
        debug_assert!(self.left > 0, "argument read past the declared count");
        self.left -= 1;
        match result {
            Ok(value) => Ok(value),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                // The failed entry's payload is already drained; discard
                // the rest of the declared list too.
                self.dec.skip_entries(self.left)?;
                self.left = 0;
                Err(err)
            }
        }
    }

    fn u32(&mut self) -> Result<u32, WireError> {
        let result = self.dec.read_u32();
        self.finish(result)
    }

    fn u64(&mut self) -> Result<u64, WireError> {
        let result = self.dec.read_u64();
        self.finish(result)
    }

    fn string(&mut self) -> Result<String, WireError> {
        let result = self.dec.read_string();
        self.finish(result)
    }
}

/// Reads one request: the 4-byte operation id, then the argument list per
/// the operation's signature.
pub fn decode_request<R: Read>(dec: &mut Decoder<R>) -> Result<Request, WireError> {
    let id = dec.read_raw_u32()?;
    let Some(op) = RpcId::from_u32(id) else {
        // Unknown ids still declare a well-formed argument list; consume
        // it so the connection stays usable.
        let argc = dec.read_list_size()?;
        dec.skip_entries(argc)?;
        return Ok(Request::Unknown { id, argc });
    };

    let request = match op {
        RpcId::Ping => {
            dec.expect_list_size(0)?;
            Request::Ping
        }
        RpcId::GetFile => {
            dec.expect_list_size(1)?;
            let mut args = Args::new(dec, 1);
            Request::GetFile {
                path: args.string()?,
            }
        }
        RpcId::SendFile => {
            dec.expect_list_size(3)?;
            let mut args = Args::new(dec, 3);
            let path = args.string()?;
            let flags = args.u32()?;
            Request::SendFile { path, flags }
        }
        RpcId::Run => {
            let argc = dec.read_list_size()?;
            if argc < 5 {
                dec.skip_entries(argc)?;
                return Err(WireError::ListTooShort {
                    min: 5,
                    actual: argc,
                });
            }
            let mut args = Args::new(dec, argc);
            let flags = args.u32()?;
            let stdin = args.string()?;
            let stdout = args.string()?;
            let stderr = args.string()?;
            let mut argv = Vec::new();
            for _ in 0..argc - 4 {
                argv.push(args.string()?);
            }
            Request::Run {
                flags,
                stdin,
                stdout,
                stderr,
                argv,
            }
        }
        RpcId::Wait => {
            dec.expect_list_size(1)?;
            let mut args = Args::new(dec, 1);
            Request::Wait {
                handle: args.u64()?,
            }
        }
        RpcId::Rm => {
            let argc = dec.read_list_size()?;
            let mut args = Args::new(dec, argc);
            let mut paths = Vec::new();
            for _ in 0..argc {
                paths.push(args.string()?);
            }
            Request::Rm { paths }
        }
        RpcId::Wait2 => {
            dec.expect_list_size(2)?;
            let mut args = Args::new(dec, 2);
            let handle = args.u64()?;
            let timeout = args.u32()?;
            Request::Wait2 { handle, timeout }
        }
        RpcId::SetTime => {
            dec.expect_list_size(2)?;
            let mut args = Args::new(dec, 2);
            let epoch = args.u64()?;
            let leeway = args.u32()?;
            Request::SetTime { epoch, leeway }
        }
        RpcId::GetProperties => {
            dec.expect_list_size(0)?;
            Request::GetProperties
        }
        RpcId::Upgrade => {
            dec.expect_list_size(1)?;
            Request::Upgrade
        }
        RpcId::RmChildProc => {
            dec.expect_list_size(1)?;
            let mut args = Args::new(dec, 1);
            Request::RmChildProc {
                handle: args.u64()?,
            }
        }
        RpcId::GetCwd => {
            dec.expect_list_size(0)?;
            Request::GetCwd
        }
    };
    Ok(request)
}
