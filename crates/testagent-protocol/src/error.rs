//! Wire-level errors and the fatal/recoverable split.

use std::io;

use thiserror::Error;

use crate::entry::EntryType;

/// Errors arising while encoding or decoding wire traffic.
///
/// Fatal variants mean framing alignment or the transport itself can no
/// longer be trusted and the connection must be dropped. Recoverable
/// variants leave the stream positioned at the next value (the offending
/// payload has been drained) and surface to the peer as an error reply.
#[derive(Debug, Error)]
pub enum WireError {
    /// Raw transport failure: read/write error or premature EOF mid-payload.
    #[error("connection I/O error: {0}")]
    Io(#[from] io::Error),

    /// Declared list size above [`crate::MAX_LIST_SIZE`].
    #[error("list size {0} exceeds the sanity limit")]
    OversizedList(u32),

    /// Declared string length above [`crate::MAX_STRING_SIZE`].
    #[error("string length {0} exceeds the sanity limit")]
    OversizedString(u64),

    /// Received tag differs from the expected one; the payload was drained.
    #[error("expected a {expected} entry, got tag {got:#04x}")]
    UnexpectedType { expected: EntryType, got: u8 },

    /// Fixed-size entry declared the wrong length; the payload was drained.
    #[error("{entry} entry has length {actual} instead of {expected}")]
    SizeMismatch {
        entry: EntryType,
        expected: u64,
        actual: u64,
    },

    /// Argument list arity differs from the operation signature; the
    /// declared entries were drained.
    #[error("expected a list of {expected} entries, got {actual}")]
    ListSize { expected: u32, actual: u32 },

    /// Variadic argument list shorter than the operation's fixed prefix;
    /// the declared entries were drained.
    #[error("expected a list of at least {min} entries, got {actual}")]
    ListTooShort { min: u32, actual: u32 },

    /// String payload is not valid UTF-8; the payload was consumed.
    #[error("string entry is not valid UTF-8")]
    InvalidUtf8,

    /// The local sink failed while a blob was being received; the remaining
    /// declared bytes were drained off the wire.
    #[error("unable to write the received data: {0}")]
    Sink(io::Error),

    /// The local source failed while a blob was being sent; the remaining
    /// declared bytes were zero-filled on the wire.
    #[error("unable to read the data to send: {0}")]
    Source(io::Error),
}

impl WireError {
    /// True when the stream can no longer be trusted and the connection
    /// must be dropped without further traffic.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::OversizedList(_) | Self::OversizedString(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_split() {
        let eof = WireError::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"));
        assert!(eof.is_fatal());
        assert!(WireError::OversizedList(u32::MAX).is_fatal());
        assert!(WireError::OversizedString(u64::MAX).is_fatal());

        let mismatch = WireError::UnexpectedType {
            expected: EntryType::String,
            got: b'I',
        };
        assert!(!mismatch.is_fatal());
        assert!(!WireError::ListSize {
            expected: 2,
            actual: 3
        }
        .is_fatal());
        let sink = WireError::Sink(io::Error::new(io::ErrorKind::Other, "disk full"));
        assert!(!sink.is_fatal());
    }

    #[test]
    fn test_messages_name_the_problem() {
        let err = WireError::UnexpectedType {
            expected: EntryType::UInt64,
            got: b's',
        };
        assert_eq!(err.to_string(), "expected a uint64 entry, got tag 0x73");

        let err = WireError::ListSize {
            expected: 2,
            actual: 5,
        };
        assert_eq!(err.to_string(), "expected a list of 2 entries, got 5");
    }
}
