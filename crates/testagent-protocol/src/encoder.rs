//! Typed streaming encoder.

use std::io::{Read, Write};

use crate::entry::EntryType;
use crate::error::WireError;
use crate::BLOB_CHUNK_SIZE;

/// Writes typed entries onto a byte stream.
///
/// Any transport write failure is fatal for the connection; encoding never
/// needs the drain discipline the decoder has because nothing malformed can
/// arrive from this side.
#[derive(Debug)]
pub struct Encoder<W> {
    inner: W,
}

impl<W: Write> Encoder<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Writes a raw big-endian u32 with no entry framing: operation ids and
    /// list counts.
    pub fn write_raw_u32(&mut self, value: u32) -> Result<(), WireError> {
        self.inner.write_all(&value.to_be_bytes())?;
        Ok(())
    }

    /// Writes a list count.
    pub fn write_list_size(&mut self, count: u32) -> Result<(), WireError> {
        self.write_raw_u32(count)
    }

    fn write_header(&mut self, ty: EntryType, length: u64) -> Result<(), WireError> {
        self.inner.write_all(&[ty.tag()])?;
        self.inner.write_all(&length.to_be_bytes())?;
        Ok(())
    }

    /// Writes a uint32 entry.
    pub fn write_u32(&mut self, value: u32) -> Result<(), WireError> {
        self.write_header(EntryType::UInt32, 4)?;
        self.inner.write_all(&value.to_be_bytes())?;
        Ok(())
    }

    /// Writes a uint64 entry as two big-endian 32-bit halves, high word
    /// first.
    pub fn write_u64(&mut self, value: u64) -> Result<(), WireError> {
        self.write_header(EntryType::UInt64, 8)?;
        self.inner.write_all(&((value >> 32) as u32).to_be_bytes())?;
        self.inner.write_all(&(value as u32).to_be_bytes())?;
        Ok(())
    }

    fn write_text(&mut self, ty: EntryType, value: &str) -> Result<(), WireError> {
        self.write_header(ty, value.len() as u64 + 1)?;
        self.inner.write_all(value.as_bytes())?;
        self.inner.write_all(&[0])?;
        Ok(())
    }

    /// Writes a string entry; the declared length includes the NUL
    /// terminator appended here.
    pub fn write_string(&mut self, value: &str) -> Result<(), WireError> {
        self.write_text(EntryType::String, value)
    }

    /// Writes an error entry carrying a status message.
    pub fn write_error(&mut self, message: &str) -> Result<(), WireError> {
        self.write_text(EntryType::Error, message)
    }

    /// Writes an undefined entry (placeholder, no payload).
    pub fn write_undefined(&mut self) -> Result<(), WireError> {
        self.write_header(EntryType::Undefined, 0)
    }

    /// Streams a blob entry of exactly `length` bytes taken from `source`.
    ///
    /// The header goes out before the payload, so the declared length is a
    /// commitment: if the source ends early or fails mid-stream, the
    /// remaining bytes are zero-filled to keep the frame intact. Returns
    /// the number of real source bytes sent; a source read error is
    /// reported as [`WireError::Source`] once the frame is complete.
    pub fn write_blob_from<R: Read>(
        &mut self,
        source: &mut R,
        length: u64,
    ) -> Result<u64, WireError> {
        self.write_header(EntryType::Blob, length)?;
        let mut chunk = [0u8; BLOB_CHUNK_SIZE];
        let mut sent = 0u64;
        let mut source_err = None;
        while sent < length {
            let want = (length - sent).min(BLOB_CHUNK_SIZE as u64) as usize;
            let got = match source.read(&mut chunk[..want]) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    source_err = Some(err);
                    break;
                }
            };
            self.inner.write_all(&chunk[..got])?;
            sent += got as u64;
        }
        if sent < length {
            self.zero_fill(length - sent)?;
        }
        match source_err {
            Some(err) => Err(WireError::Source(err)),
            None => Ok(sent),
        }
    }

    fn zero_fill(&mut self, mut remaining: u64) -> Result<(), WireError> {
        let zeros = [0u8; BLOB_CHUNK_SIZE];
        while remaining > 0 {
            let want = remaining.min(BLOB_CHUNK_SIZE as u64) as usize;
            self.inner.write_all(&zeros[..want])?;
            remaining -= want as u64;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), WireError> {
        self.inner.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::Decoder;
    use std::io::{self, Cursor};

    #[test]
    fn test_golden_header_layout() {
        let mut bytes = Vec::new();
        Encoder::new(&mut bytes).write_u32(0x0102_0304).unwrap();
        assert_eq!(
            bytes,
            vec![b'I', 0, 0, 0, 0, 0, 0, 0, 4, 0x01, 0x02, 0x03, 0x04]
        );
    }

    #[test]
    fn test_golden_string_includes_terminator() {
        let mut bytes = Vec::new();
        Encoder::new(&mut bytes).write_string("hi").unwrap();
        assert_eq!(bytes, vec![b's', 0, 0, 0, 0, 0, 0, 0, 3, b'h', b'i', 0]);
    }

    #[test]
    fn test_golden_empty_string_is_one_nul() {
        let mut bytes = Vec::new();
        Encoder::new(&mut bytes).write_string("").unwrap();
        assert_eq!(bytes, vec![b's', 0, 0, 0, 0, 0, 0, 0, 1, 0]);
    }

    #[test]
    fn test_golden_undefined_has_no_payload() {
        let mut bytes = Vec::new();
        Encoder::new(&mut bytes).write_undefined().unwrap();
        assert_eq!(bytes, vec![b'u', 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_golden_u64_high_word_first() {
        let mut bytes = Vec::new();
        Encoder::new(&mut bytes)
            .write_u64(0xAABB_CCDD_0011_2233)
            .unwrap();
        assert_eq!(
            bytes,
            vec![b'Q', 0, 0, 0, 0, 0, 0, 0, 8, 0xAA, 0xBB, 0xCC, 0xDD, 0x00, 0x11, 0x22, 0x33]
        );
    }

    #[test]
    fn test_error_entry_uses_error_tag() {
        let mut bytes = Vec::new();
        Encoder::new(&mut bytes).write_error("boom").unwrap();
        assert_eq!(bytes[0], b'e');
        let mut dec = Decoder::new(Cursor::new(bytes));
        assert_eq!(dec.read_error().unwrap(), "boom");
    }

    #[test]
    fn test_short_source_is_zero_filled() {
        let mut bytes = Vec::new();
        let mut source: &[u8] = b"abc";
        let sent = Encoder::new(&mut bytes)
            .write_blob_from(&mut source, 8)
            .unwrap();
        assert_eq!(sent, 3);
        // Frame is complete: declared 8 payload bytes are all present.
        assert_eq!(bytes.len(), 1 + 8 + 8);
        assert_eq!(&bytes[9..], b"abc\0\0\0\0\0");
    }

    #[test]
    fn test_failing_source_still_completes_frame() {
        struct FailingReader;
        impl io::Read for FailingReader {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::Other, "media error"))
            }
        }

        let mut bytes = Vec::new();
        let err = Encoder::new(&mut bytes)
            .write_blob_from(&mut FailingReader, 5)
            .unwrap_err();
        assert!(matches!(err, WireError::Source(_)));
        assert!(!err.is_fatal());
        assert_eq!(bytes.len(), 1 + 8 + 5);
    }
}
