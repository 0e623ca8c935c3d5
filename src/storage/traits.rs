//! storage::traits
//!
//! Storage backend trait definition.
//!
//! # Design
//!
//! The `StorageBackend` trait is the narrow file-oriented interface the
//! synchronization engine needs from a remote: read, create-or-overwrite,
//! delete, list. Paths are `/`-separated and relative to the root of the
//! remote; the engine derives them through [`crate::core::paths`].
//!
//! Implementations must be thread-safe (Send + Sync): object uploads and
//! downloads fan out across a worker pool.
//!
//! # Example
//!
//! ```
//! use git_remote_rclone::storage::{MemoryBackend, StorageBackend, StorageError, WriteMode};
//!
//! let backend = MemoryBackend::new();
//! backend.write("repo/HEAD", b"ref: refs/heads/main\n", WriteMode::CreateOnly).unwrap();
//!
//! // Create-only never overwrites
//! let again = backend.write("repo/HEAD", b"other", WriteMode::CreateOnly);
//! assert!(matches!(again, Err(StorageError::AlreadyExists { .. })));
//! assert_eq!(backend.read("repo/HEAD").unwrap(), b"ref: refs/heads/main\n");
//! ```

use thiserror::Error;

/// Errors from storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The path does not exist.
    #[error("not found: {path}")]
    NotFound {
        /// The missing path
        path: String,
    },

    /// A create-only write found the path already present.
    #[error("already exists: {path}")]
    AlreadyExists {
        /// The existing path
        path: String,
    },

    /// Network or backend failure that may succeed on retry.
    #[error("storage transport error: {0}")]
    Transport(String),

    /// Failure that retrying cannot fix (bad arguments, missing binary,
    /// path outside the storage root).
    #[error("storage command failed: {0}")]
    Command(String),

    /// Local I/O error.
    #[error("storage i/o error on {path}: {source}")]
    Io {
        /// The path being accessed
        path: String,
        /// The underlying error
        source: std::io::Error,
    },
}

impl StorageError {
    /// Whether the operation may succeed if attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Transport(_))
    }

    /// Whether this error means the path is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

/// How [`StorageBackend::write`] treats an existing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Fail with [`StorageError::AlreadyExists`] if the path exists.
    CreateOnly,
    /// Replace any existing content.
    Overwrite,
}

/// A file returned by [`StorageBackend::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Path relative to the listed directory, `/`-separated
    pub path: String,
    /// Size in bytes
    pub size: u64,
}

/// Trait for remote file storage.
///
/// # Error Handling
///
/// - Absent paths are reported as [`StorageError::NotFound`], never as a
///   generic failure, so callers can treat "empty repository" as benign.
/// - [`StorageError::Transport`] is the only retryable category.
pub trait StorageBackend: Send + Sync {
    /// Create a directory (and parents). Existing directories are fine.
    fn mkdir(&self, path: &str) -> Result<(), StorageError>;

    /// List files under a directory.
    ///
    /// Returns [`StorageError::NotFound`] if the directory does not exist.
    /// Only files are returned; with `recursive` the paths include
    /// subdirectory components.
    fn list(&self, path: &str, recursive: bool) -> Result<Vec<Entry>, StorageError>;

    /// Read a whole file.
    fn read(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    /// Write a whole file.
    fn write(&self, path: &str, data: &[u8], mode: WriteMode) -> Result<(), StorageError>;

    /// Delete a file.
    ///
    /// Returns [`StorageError::NotFound`] if the file does not exist.
    fn delete(&self, path: &str) -> Result<(), StorageError>;

    /// Recursively delete a directory and everything below it.
    fn purge(&self, path: &str) -> Result<(), StorageError>;

    /// Check if a file exists.
    ///
    /// Default implementation reads the file; backends with a cheaper
    /// metadata probe should override it.
    fn exists(&self, path: &str) -> Result<bool, StorageError> {
        match self.read(path) {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
