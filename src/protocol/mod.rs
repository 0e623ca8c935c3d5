//! protocol
//!
//! The git remote-helper line protocol (see `gitremote-helpers(7)`).
//!
//! # Modules
//!
//! - [`command`] - parsing of input lines and batches
//! - [`writer`] - response lines
//! - [`session`] - the read-eval loop driving the remote engine
//!
//! # Framing
//!
//! Every line ends with `\n`. A blank line terminates a response, a `push`
//! batch, or a `fetch` batch; a blank line (or end of input) in place of a
//! command ends the session. Anything git should not see as protocol goes
//! to stderr.

pub mod command;
pub mod session;
pub mod writer;

pub use command::{Command, FetchSpec, ProtocolReader, PushSpec};
pub use session::{HelperConfig, RemoteHelperSession, SessionError, TransportOptions};
pub use writer::{ProtocolWriter, CAPABILITIES};

use thiserror::Error;

/// Protocol violations and I/O failures on the protocol streams.
///
/// Always fatal to the session.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A command git is not expected to send.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// A known command with unusable arguments.
    #[error("malformed '{line}': {reason}")]
    Malformed {
        /// The offending line
        line: String,
        /// What is wrong with it
        reason: String,
    },

    /// A command of a different kind inside a batch.
    #[error("unexpected '{line}' inside {batch} batch")]
    UnexpectedCommand {
        /// Batch kind (`push` or `fetch`)
        batch: &'static str,
        /// The offending line
        line: String,
    },

    /// Input ended before the blank line closing a batch.
    #[error("input ended inside {batch} batch")]
    UnexpectedEof {
        /// Batch kind (`push` or `fetch`)
        batch: &'static str,
    },

    /// Reading stdin or writing stdout failed.
    #[error("protocol I/O error: {0}")]
    Io(#[from] std::io::Error),
}
