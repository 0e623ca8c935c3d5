//! storage
//!
//! Remote file storage abstraction.
//!
//! # Architecture
//!
//! The synchronization engine only ever talks to [`StorageBackend`]. The
//! concrete implementation is chosen once, by [`create_backend`], from the
//! loaded configuration and the remote URL:
//!
//! - [`RcloneBackend`] - drives the `rclone` CLI (default)
//! - [`LocalBackend`] - a directory on the local filesystem
//! - [`MemoryBackend`] - in-process map for tests
//!
//! Production backends are wrapped in [`RetryingBackend`] so transient
//! failures are absorbed below the engine.
//!
//! This is the only module that spawns external processes.

pub mod local;
pub mod memory;
pub mod rclone;
pub mod retry;
pub mod traits;

pub use local::LocalBackend;
pub use memory::{FailOn, MemoryBackend, MockOperation};
pub use rclone::RcloneBackend;
pub use retry::{RetryPolicy, RetryingBackend};
pub use traits::{Entry, StorageBackend, StorageError, WriteMode};

use std::sync::Arc;

use crate::core::config::Config;
use crate::core::url::RemoteUrl;

/// Storage backend implementations selectable through configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// The rclone CLI
    Rclone,
    /// A local directory (`storage.local_root`)
    Local,
}

impl BackendKind {
    /// Configuration name of this backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Rclone => "rclone",
            BackendKind::Local => "local",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the configured backend for `url`.
///
/// For the local backend the URL's remote alias becomes a directory under
/// `storage.local_root`, so `rclone://a/x` and `rclone://b/x` stay apart.
///
/// # Errors
///
/// Returns [`StorageError::Command`] if the local backend is selected
/// without a root directory.
pub fn create_backend(
    config: &Config,
    url: &RemoteUrl,
) -> Result<Arc<dyn StorageBackend>, StorageError> {
    let inner: Box<dyn StorageBackend> = match config.backend() {
        BackendKind::Rclone => Box::new(RcloneBackend::new(
            url.remote(),
            config.rclone_binary(),
            config.storage_timeout(),
        )),
        BackendKind::Local => {
            let root = config.local_root().ok_or_else(|| {
                StorageError::Command("storage.local_root is not configured".to_string())
            })?;
            Box::new(LocalBackend::new(root.join(url.remote())))
        }
    };

    tracing::debug!(backend = %config.backend(), remote = url.remote(), "storage backend selected");

    let policy = RetryPolicy {
        attempts: config.storage_retries(),
        initial_backoff: config.storage_retry_backoff(),
        ..RetryPolicy::default()
    };
    Ok(Arc::new(RetryingBackend::new(inner, policy)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{ConfigFile, StorageSection};
    use tempfile::TempDir;

    #[test]
    fn backend_kind_display() {
        assert_eq!(BackendKind::Rclone.to_string(), "rclone");
        assert_eq!(BackendKind::Local.to_string(), "local");
    }

    #[test]
    fn local_backend_rooted_per_remote() {
        let temp = TempDir::new().unwrap();
        let config = Config {
            global: ConfigFile {
                storage: Some(StorageSection {
                    backend: Some("local".into()),
                    local_root: Some(temp.path().to_path_buf()),
                    ..Default::default()
                }),
                ..Default::default()
            },
            repo: None,
        };
        let url = RemoteUrl::parse("rclone://share/repo.git").unwrap();

        let backend = create_backend(&config, &url).unwrap();
        backend
            .write("repo.git/HEAD", b"ref: refs/heads/main\n", WriteMode::CreateOnly)
            .unwrap();

        assert!(temp.path().join("share/repo.git/HEAD").is_file());
    }

    #[test]
    fn local_backend_without_root_fails() {
        let config = Config {
            global: ConfigFile {
                storage: Some(StorageSection {
                    backend: Some("local".into()),
                    ..Default::default()
                }),
                ..Default::default()
            },
            repo: None,
        };
        let url = RemoteUrl::parse("rclone://share/repo.git").unwrap();
        assert!(create_backend(&config, &url).is_err());
    }
}
