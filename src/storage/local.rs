//! storage::local
//!
//! Filesystem-backed storage.
//!
//! Serves two purposes: a remote on a mounted share, and a real on-disk
//! backend for integration tests that does not need an rclone install.
//!
//! # Atomicity
//!
//! Every write goes to a hidden temp file in the target directory first.
//! - Overwrite: the temp file is renamed over the target
//! - CreateOnly: the temp file is hard-linked to the target, which fails
//!   if the target already exists, so two racing creators cannot both win
//!
//! Readers never observe a partially written file.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use super::traits::{Entry, StorageBackend, StorageError, WriteMode};

/// Storage rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// Create a backend rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a storage path onto the filesystem, refusing to leave the root.
    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(path.trim_start_matches('/'));
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => {
                    return Err(StorageError::Command(format!(
                        "path escapes storage root: {path}"
                    )))
                }
            }
        }
        Ok(self.root.join(relative))
    }

    fn io_error(path: &str, source: io::Error) -> StorageError {
        if source.kind() == io::ErrorKind::NotFound {
            StorageError::NotFound {
                path: path.to_string(),
            }
        } else {
            StorageError::Io {
                path: path.to_string(),
                source,
            }
        }
    }

    /// Write `data` to a fresh temp file next to `target`.
    fn write_temp(target: &Path, data: &[u8]) -> io::Result<PathBuf> {
        let dir = target.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;

        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp = dir.join(format!(".{}.tmp-{}", name, uuid::Uuid::new_v4().simple()));

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp)?;
        file.write_all(data)?;
        file.sync_all()?;
        Ok(temp)
    }

    fn walk(dir: &Path, base: &Path, recursive: bool, out: &mut Vec<Entry>) -> io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let path = entry.path();

            if file_type.is_dir() {
                if recursive {
                    Self::walk(&path, base, recursive, out)?;
                }
                continue;
            }

            // In-flight temp files are not part of the store
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }

            let relative = path
                .strip_prefix(base)
                .unwrap_or(&path)
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            out.push(Entry {
                path: relative,
                size: entry.metadata()?.len(),
            });
        }
        Ok(())
    }
}

impl StorageBackend for LocalBackend {
    fn mkdir(&self, path: &str) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        fs::create_dir_all(&full).map_err(|e| Self::io_error(path, e))
    }

    fn list(&self, path: &str, recursive: bool) -> Result<Vec<Entry>, StorageError> {
        let full = self.resolve(path)?;
        let mut entries = Vec::new();
        Self::walk(&full, &full, recursive, &mut entries).map_err(|e| Self::io_error(path, e))?;
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let full = self.resolve(path)?;
        fs::read(&full).map_err(|e| Self::io_error(path, e))
    }

    fn write(&self, path: &str, data: &[u8], mode: WriteMode) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        let temp = Self::write_temp(&full, data).map_err(|e| Self::io_error(path, e))?;

        let result = match mode {
            WriteMode::Overwrite => fs::rename(&temp, &full),
            WriteMode::CreateOnly => {
                let linked = fs::hard_link(&temp, &full);
                let _ = fs::remove_file(&temp);
                linked
            }
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(StorageError::AlreadyExists {
                    path: path.to_string(),
                })
            }
            Err(e) => {
                let _ = fs::remove_file(&temp);
                Err(Self::io_error(path, e))
            }
        }
    }

    fn delete(&self, path: &str) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        fs::remove_file(&full).map_err(|e| Self::io_error(path, e))
    }

    fn purge(&self, path: &str) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        fs::remove_dir_all(&full).map_err(|e| Self::io_error(path, e))
    }

    fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let full = self.resolve(path)?;
        match fs::metadata(&full) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Self::io_error(path, e)),
        }
    }
}
