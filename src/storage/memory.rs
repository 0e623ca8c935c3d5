//! storage::memory
//!
//! In-memory storage backend for deterministic testing.
//!
//! # Design
//!
//! Files live in a map behind `Arc<Mutex<...>>`, so clones share state and
//! concurrent writers from several threads see a single consistent store.
//! Failures can be injected per operation, and every call is recorded so
//! tests can assert on exactly which paths were touched.
//!
//! # Example
//!
//! ```
//! use git_remote_rclone::storage::{FailOn, MemoryBackend, StorageBackend, WriteMode};
//!
//! let backend = MemoryBackend::new();
//! backend.fail_next(FailOn::Read, 1);
//! assert!(backend.read("missing").is_err());
//!
//! backend.write("a/b", b"data", WriteMode::Overwrite).unwrap();
//! assert_eq!(backend.read("a/b").unwrap(), b"data");
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use super::traits::{Entry, StorageBackend, StorageError, WriteMode};

/// Which operation should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailOn {
    Mkdir,
    List,
    Read,
    Write,
    Delete,
    Purge,
    Exists,
}

/// Recorded operation for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    Mkdir { path: String },
    List { path: String, recursive: bool },
    Read { path: String },
    Write { path: String, mode: WriteMode },
    Delete { path: String },
    Purge { path: String },
    Exists { path: String },
}

impl MockOperation {
    /// The path this operation targeted.
    pub fn path(&self) -> &str {
        match self {
            MockOperation::Mkdir { path }
            | MockOperation::List { path, .. }
            | MockOperation::Read { path }
            | MockOperation::Write { path, .. }
            | MockOperation::Delete { path }
            | MockOperation::Purge { path }
            | MockOperation::Exists { path } => path,
        }
    }
}

/// In-memory storage backend.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    files: BTreeMap<String, Vec<u8>>,
    /// Remaining injected transport failures per operation.
    failures: HashMap<FailOn, u32>,
    operations: Vec<MockOperation>,
}

impl MemoryBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls of `op` fail with a transport error.
    pub fn fail_next(&self, op: FailOn, count: u32) {
        self.lock().failures.insert(op, count);
    }

    /// All recorded operations, oldest first.
    pub fn operations(&self) -> Vec<MockOperation> {
        self.lock().operations.clone()
    }

    /// Forget recorded operations.
    pub fn clear_operations(&self) {
        self.lock().operations.clear();
    }

    /// Every stored path, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.lock().files.keys().cloned().collect()
    }

    /// Direct read without recording or failure injection.
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().files.get(path).cloned()
    }

    /// Direct write without recording or failure injection.
    pub fn put(&self, path: &str, data: impl Into<Vec<u8>>) {
        self.lock().files.insert(path.to_string(), data.into());
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        // A panicking test thread must not wedge the others.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record `op` and consume an injected failure if one is pending.
    fn begin(
        &self,
        fail: FailOn,
        op: MockOperation,
    ) -> Result<MutexGuard<'_, MemoryInner>, StorageError> {
        let mut inner = self.lock();
        let path = op.path().to_string();
        inner.operations.push(op);
        if let Some(remaining) = inner.failures.get_mut(&fail) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StorageError::Transport(format!(
                    "injected {fail:?} failure on {path}"
                )));
            }
        }
        Ok(inner)
    }

    fn dir_prefix(path: &str) -> String {
        let path = path.trim_matches('/');
        if path.is_empty() {
            String::new()
        } else {
            format!("{path}/")
        }
    }
}

impl StorageBackend for MemoryBackend {
    fn mkdir(&self, path: &str) -> Result<(), StorageError> {
        self.begin(
            FailOn::Mkdir,
            MockOperation::Mkdir {
                path: path.to_string(),
            },
        )
        .map(drop)
    }

    fn list(&self, path: &str, recursive: bool) -> Result<Vec<Entry>, StorageError> {
        let inner = self.begin(
            FailOn::List,
            MockOperation::List {
                path: path.to_string(),
                recursive,
            },
        )?;

        let prefix = Self::dir_prefix(path);
        let mut found_any = false;
        let mut entries = Vec::new();
        for (key, data) in inner.files.range(prefix.clone()..) {
            let Some(relative) = key.strip_prefix(&prefix) else {
                break;
            };
            found_any = true;
            if recursive || !relative.contains('/') {
                entries.push(Entry {
                    path: relative.to_string(),
                    size: data.len() as u64,
                });
            }
        }

        if !found_any {
            return Err(StorageError::NotFound {
                path: path.to_string(),
            });
        }
        Ok(entries)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let inner = self.begin(
            FailOn::Read,
            MockOperation::Read {
                path: path.to_string(),
            },
        )?;
        inner
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                path: path.to_string(),
            })
    }

    fn write(&self, path: &str, data: &[u8], mode: WriteMode) -> Result<(), StorageError> {
        let mut inner = self.begin(
            FailOn::Write,
            MockOperation::Write {
                path: path.to_string(),
                mode,
            },
        )?;
        if mode == WriteMode::CreateOnly && inner.files.contains_key(path) {
            return Err(StorageError::AlreadyExists {
                path: path.to_string(),
            });
        }
        inner.files.insert(path.to_string(), data.to_vec());
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<(), StorageError> {
        let mut inner = self.begin(
            FailOn::Delete,
            MockOperation::Delete {
                path: path.to_string(),
            },
        )?;
        inner
            .files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound {
                path: path.to_string(),
            })
    }

    fn purge(&self, path: &str) -> Result<(), StorageError> {
        let mut inner = self.begin(
            FailOn::Purge,
            MockOperation::Purge {
                path: path.to_string(),
            },
        )?;
        let prefix = Self::dir_prefix(path);
        let before = inner.files.len();
        inner.files.retain(|key, _| !key.starts_with(&prefix));
        if inner.files.len() == before {
            return Err(StorageError::NotFound {
                path: path.to_string(),
            });
        }
        Ok(())
    }

    fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let inner = self.begin(
            FailOn::Exists,
            MockOperation::Exists {
                path: path.to_string(),
            },
        )?;
        Ok(inner.files.contains_key(path))
    }
}
