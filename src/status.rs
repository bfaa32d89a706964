//! Last-operation outcome, reported into by every handler.

use std::fmt;

/// Severity of the last operation's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Operation succeeded.
    Ok,
    /// Operation failed; the connection remains usable.
    Error,
    /// The connection can no longer be trusted and must be dropped.
    Fatal,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Error => write!(f, "error"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// Outcome of the most recent operation on a connection.
///
/// FATAL is sticky: a later ERROR does not downgrade it. Only an explicit
/// OK clears it, which happens when a fresh connection starts.
#[derive(Debug)]
pub struct Status {
    level: Level,
    message: String,
}

impl Status {
    pub fn new() -> Self {
        Self {
            level: Level::Ok,
            message: String::new(),
        }
    }

    /// Records an outcome, honoring FATAL stickiness.
    pub fn set(&mut self, level: Level, message: impl Into<String>) {
        if self.level == Level::Fatal && level == Level::Error {
            return;
        }
        self.level = level;
        self.message = message.into();
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_fatal(&self) -> bool {
        self.level == Level::Fatal
    }

    /// The literal text sent in an error reply: bare for ERROR, prefixed
    /// with the level name for the other levels. The asymmetry is part of
    /// the wire contract.
    pub fn wire_message(&self) -> String {
        match self.level {
            Level::Error => self.message.clone(),
            level => format!("{}: {}", level, self.message),
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::new()
    }
}
