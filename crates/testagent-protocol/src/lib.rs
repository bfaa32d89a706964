//! TestAgent Wire Protocol
//!
//! Typed, length-prefixed binary framing for the testagentd RPC protocol.
//! Every value on the wire is an entry: a one-byte type tag, an 8-byte
//! big-endian length, and the payload. Integers are big-endian; 64-bit
//! values travel as two 32-bit halves, high word first. Argument and reply
//! lists are a raw 4-byte big-endian count followed by that many entries.
//!
//! This crate owns framing and the decoded request model only. What the
//! operations actually do (file transfer, process tracking, clock changes)
//! lives in the daemon.

pub mod decoder;
pub mod encoder;
pub mod entry;
pub mod error;
pub mod rpc;

pub use decoder::Decoder;
pub use encoder::Encoder;
pub use entry::EntryType;
pub use error::WireError;
pub use rpc::{decode_request, Request, RpcId};

/// Version banner sent to every accepted client, also returned by
/// `getproperties` as the protocol version property.
pub const PROTOCOL_VERSION: &str = "testagentd 1.0";

/// Chunk size for streamed blob transfers and entry draining.
pub const BLOB_CHUNK_SIZE: usize = 4096;

/// Ceiling on a declared list size. Argument lists are tiny (the largest is
/// `run`'s argv); a count beyond this is garbage being misread as framing
/// and the connection cannot be trusted afterwards.
pub const MAX_LIST_SIZE: u32 = 65_536;

/// Ceiling on a declared string length. Strings carry paths, argv elements
/// and status messages; bulk data travels as blobs.
pub const MAX_STRING_SIZE: u64 = 1 << 20;
