//! remote::error
//!
//! Failure taxonomy of push and fetch.
//!
//! Every failure of a single ref update or fetch batch is a [`SyncError`].
//! Push failures are reported to git per ref as `error <ref> <message>`
//! using [`SyncError::wire_message`]; fetch failures abort the batch.

use thiserror::Error;

use crate::core::object::ObjectError;
use crate::git::GitError;
use crate::storage::StorageError;

use super::lock::LockError;
use super::refs::RefError;

/// Errors from synchronizing one ref or one fetch batch.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A ref or object that must exist is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// The lock could not be obtained within the attempt budget.
    #[error("failed to lock {path} after {attempts} attempts")]
    LockTimeout {
        /// Lock record path
        path: String,
        /// Attempts made
        attempts: u32,
    },

    /// The update would discard remote history.
    #[error("non-fast-forward")]
    NonFastForward,

    /// The remote moved to a commit this repository does not have.
    #[error("fetch first")]
    FetchFirst,

    /// Downloaded bytes do not hash to the requested id.
    #[error("corrupt object {expected}: content hashes to {actual}")]
    CorruptObject {
        /// Requested id
        expected: String,
        /// Id of the received content
        actual: String,
    },

    /// Stored bytes are not a git object or a ref file is unreadable.
    #[error("malformed remote data: {0}")]
    Malformed(String),

    /// Storage failure that outlived the retry budget.
    #[error("storage error: {0}")]
    BackendTransport(#[from] StorageError),

    /// Local repository failure.
    #[error("local repository error: {0}")]
    Git(#[from] GitError),

    /// Deleting the branch remote HEAD points at.
    #[error("refusing to delete the current branch")]
    RefusedDelete,

    /// The source of a push does not resolve locally.
    #[error("src refspec {0} does not match any")]
    UnknownSource(String),
}

impl SyncError {
    /// Single-line message for an `error <ref> <message>` response.
    pub fn wire_message(&self) -> String {
        match self {
            SyncError::LockTimeout { path, .. } => format!("failed to lock {path}"),
            other => other.to_string().replace(['\n', '\r'], " "),
        }
    }
}

impl From<ObjectError> for SyncError {
    fn from(err: ObjectError) -> Self {
        match err {
            ObjectError::NotFound { oid } => SyncError::NotFound(oid),
            ObjectError::Corrupt { expected, actual } => {
                SyncError::CorruptObject { expected, actual }
            }
            ObjectError::Malformed { message } => SyncError::Malformed(message),
            ObjectError::Storage(e) => SyncError::BackendTransport(e),
        }
    }
}

impl From<LockError> for SyncError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Timeout { path, attempts } => SyncError::LockTimeout { path, attempts },
            LockError::Storage(e) => SyncError::BackendTransport(e),
        }
    }
}

impl From<RefError> for SyncError {
    fn from(err: RefError) -> Self {
        match err {
            RefError::Storage(e) => SyncError::BackendTransport(e),
            malformed @ RefError::Malformed { .. } => SyncError::Malformed(malformed.to_string()),
        }
    }
}
