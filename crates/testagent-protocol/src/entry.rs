//! Entry framing: the smallest protocol unit.

use std::fmt;

/// Type tag of a wire entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    /// 32-bit unsigned integer; length is always 4.
    UInt32,
    /// 64-bit unsigned integer; length is always 8, sent as two big-endian
    /// 32-bit halves, high word first.
    UInt64,
    /// NUL-terminated text; the declared length includes the terminator.
    String,
    /// Opaque bytes, streamed rather than buffered.
    Blob,
    /// Placeholder with no payload; length is always 0.
    Undefined,
    /// A status message, framed like a string.
    Error,
}

impl EntryType {
    /// The wire tag byte.
    pub fn tag(self) -> u8 {
        match self {
            Self::UInt32 => b'I',
            Self::UInt64 => b'Q',
            Self::String => b's',
            Self::Blob => b'd',
            Self::Undefined => b'u',
            Self::Error => b'e',
        }
    }

    /// Maps a received tag byte back to its entry type.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            b'I' => Some(Self::UInt32),
            b'Q' => Some(Self::UInt64),
            b's' => Some(Self::String),
            b'd' => Some(Self::Blob),
            b'u' => Some(Self::Undefined),
            b'e' => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UInt32 => write!(f, "uint32"),
            Self::UInt64 => write!(f, "uint64"),
            Self::String => write!(f, "string"),
            Self::Blob => write!(f, "data"),
            Self::Undefined => write!(f, "undefined"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Decoded `[tag][length]` prefix of one entry, with the payload still on
/// the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader {
    pub tag: u8,
    pub length: u64,
}

impl EntryHeader {
    /// The entry type, when the tag byte is a known one.
    pub fn entry_type(&self) -> Option<EntryType> {
        EntryType::from_tag(self.tag)
    }
}
