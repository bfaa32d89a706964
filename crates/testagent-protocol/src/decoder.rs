//! Typed streaming decoder.

use std::io::{self, Read, Write};

use crate::entry::{EntryHeader, EntryType};
use crate::error::WireError;
use crate::{BLOB_CHUNK_SIZE, MAX_LIST_SIZE, MAX_STRING_SIZE};

/// Reads typed entries off a byte stream.
///
/// Methods keep the stream aligned wherever recovery is possible: a wrong
/// tag, length or arity drains the declared payload before the error is
/// returned, so the next read starts at the following value. Fatal errors
/// (transport failure, sanity-ceiling violations) leave the stream
/// unusable by definition and drain nothing.
#[derive(Debug)]
pub struct Decoder<R> {
    inner: R,
    /// Header read ahead of its payload by `peek_entry`.
    pending: Option<EntryHeader>,
}

impl<R: Read> Decoder<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            pending: None,
        }
    }

    /// Reads a raw big-endian u32 with no entry framing: operation ids and
    /// list counts.
    pub fn read_raw_u32(&mut self) -> Result<u32, WireError> {
        debug_assert!(self.pending.is_none(), "raw read with an entry pending");
        let mut buf = [0u8; 4];
        self.inner.read_exact(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    /// Reads a list count and applies the sanity ceiling.
    pub fn read_list_size(&mut self) -> Result<u32, WireError> {
        let size = self.read_raw_u32()?;
        if size > MAX_LIST_SIZE {
            return Err(WireError::OversizedList(size));
        }
        Ok(size)
    }

    /// Reads a list count that must equal `expected`. On mismatch the
    /// declared entries are drained so the stream is left at the next
    /// operation id.
    pub fn expect_list_size(&mut self, expected: u32) -> Result<(), WireError> {
        let actual = self.read_list_size()?;
        if actual != expected {
            self.skip_entries(actual)?;
            return Err(WireError::ListSize { expected, actual });
        }
        Ok(())
    }

    /// Reads the next entry header without consuming its payload. Repeated
    /// calls return the same header until a payload-consuming read runs.
    pub fn peek_entry(&mut self) -> Result<EntryHeader, WireError> {
        if let Some(header) = self.pending {
            return Ok(header);
        }
        let mut tag = [0u8; 1];
        self.inner.read_exact(&mut tag)?;
        let mut len = [0u8; 8];
        self.inner.read_exact(&mut len)?;
        let header = EntryHeader {
            tag: tag[0],
            length: u64::from_be_bytes(len),
        };
        self.pending = Some(header);
        Ok(header)
    }

    fn next_entry(&mut self) -> Result<EntryHeader, WireError> {
        let header = self.peek_entry()?;
        self.pending = None;
        Ok(header)
    }

    /// Consumes the next header and checks it against the expected type
    /// (and size, for the fixed-size kinds), draining the payload when the
    /// entry is not what the caller asked for. Returns the declared length.
    fn expect_entry(&mut self, expected: EntryType, size: Option<u64>) -> Result<u64, WireError> {
        let header = self.next_entry()?;
        if header.tag != expected.tag() {
            self.drain(header.length)?;
            return Err(WireError::UnexpectedType {
                expected,
                got: header.tag,
            });
        }
        if let Some(size) = size {
            if header.length != size {
                self.drain(header.length)?;
                return Err(WireError::SizeMismatch {
                    entry: expected,
                    expected: size,
                    actual: header.length,
                });
            }
        }
        Ok(header.length)
    }

    /// Reads a uint32 entry.
    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        self.expect_entry(EntryType::UInt32, Some(4))?;
        let mut buf = [0u8; 4];
        self.inner.read_exact(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    /// Reads a uint64 entry: two big-endian 32-bit halves, high word first.
    pub fn read_u64(&mut self) -> Result<u64, WireError> {
        self.expect_entry(EntryType::UInt64, Some(8))?;
        let mut buf = [0u8; 4];
        self.inner.read_exact(&mut buf)?;
        let high = u32::from_be_bytes(buf);
        self.inner.read_exact(&mut buf)?;
        let low = u32::from_be_bytes(buf);
        Ok((u64::from(high) << 32) | u64::from(low))
    }

    fn read_text(&mut self, expected: EntryType) -> Result<String, WireError> {
        let length = self.expect_entry(expected, None)?;
        if length > MAX_STRING_SIZE {
            return Err(WireError::OversizedString(length));
        }
        if length == 0 {
            return Ok(String::new());
        }
        let mut buf = vec![0u8; length as usize];
        self.inner.read_exact(&mut buf)?;
        // The declared length includes the terminator; it is trusted, not
        // verified.
        buf.pop();
        String::from_utf8(buf).map_err(|_| WireError::InvalidUtf8)
    }

    /// Reads a string entry.
    pub fn read_string(&mut self) -> Result<String, WireError> {
        self.read_text(EntryType::String)
    }

    /// Reads an error entry: error replies and per-path `rm` failures.
    pub fn read_error(&mut self) -> Result<String, WireError> {
        self.read_text(EntryType::Error)
    }

    /// Reads an undefined entry (placeholder, no payload).
    pub fn read_undefined(&mut self) -> Result<(), WireError> {
        self.expect_entry(EntryType::Undefined, Some(0))?;
        Ok(())
    }

    /// Streams a blob entry into `sink` through a fixed-size chunk buffer
    /// and returns the declared byte count. A sink write failure is
    /// recoverable: the remaining declared bytes are drained off the wire
    /// before the error is returned.
    pub fn read_blob_to_sink<W: Write>(&mut self, sink: &mut W) -> Result<u64, WireError> {
        let length = self.expect_entry(EntryType::Blob, None)?;
        let mut chunk = [0u8; BLOB_CHUNK_SIZE];
        let mut left = length;
        while left > 0 {
            let want = left.min(BLOB_CHUNK_SIZE as u64) as usize;
            self.inner.read_exact(&mut chunk[..want])?;
            left -= want as u64;
            if let Err(err) = sink.write_all(&chunk[..want]) {
                self.drain(left)?;
                return Err(WireError::Sink(err));
            }
        }
        Ok(length)
    }

    /// Discards one whole entry, header and payload.
    pub fn skip_entry(&mut self) -> Result<(), WireError> {
        let header = self.next_entry()?;
        self.drain(header.length)
    }

    /// Discards `count` entries; re-aligns the stream after arity
    /// mismatches and for unknown operations.
    pub fn skip_entries(&mut self, count: u32) -> Result<(), WireError> {
        for _ in 0..count {
            self.skip_entry()?;
        }
        Ok(())
    }

    /// Reads and discards `length` payload bytes.
    fn drain(&mut self, length: u64) -> Result<(), WireError> {
        let copied = io::copy(&mut self.inner.by_ref().take(length), &mut io::sink())?;
        if copied < length {
            return Err(WireError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream ended while draining an entry",
            )));
        }
        Ok(())
    }
}
