//! RPC operation handlers.
//!
//! Each handler consumes any argument bytes still pending on the stream,
//! performs its operation, and either writes its own success reply or
//! reports the failure into the connection status so the dispatcher can
//! send it as an error reply.

pub mod getcwd;
pub mod getfile;
pub mod getproperties;
pub mod ping;
pub mod rm;
pub mod rmchildproc;
pub mod run;
pub mod sendfile;
pub mod settime;
pub mod upgrade;
pub mod wait;

use testagent_protocol::WireError;

/// What a handler did with the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The success reply has been written.
    Done,
    /// The operation failed; the connection status carries the message
    /// and the dispatcher sends the error reply.
    Failed,
}

pub type HandlerResult = Result<Outcome, WireError>;
