//! remote::lock
//!
//! Advisory locks stored as files on the remote.
//!
//! # Architecture
//!
//! The storage backend has no compare-and-swap, so ref updates are
//! serialized with a lock record written next to the ref (or one record
//! for the whole repository, depending on [`LockScope`]). A record holds a
//! random token and the time it was taken.
//!
//! # Protocol
//!
//! Acquire (`Unlocked -> Acquiring -> Held`):
//! 1. Create the record with [`WriteMode::CreateOnly`]
//! 2. Read it back; if the token is ours, the lock is held
//! 3. If another holder's record is older than `stale_after` (or is
//!    unreadable), overwrite it and read back again (steal)
//! 4. Otherwise sleep with exponential backoff plus jitter and retry, up to
//!    `max_attempts`, then fail with [`LockError::Timeout`]
//!
//! Release (`Held -> Unlocked`) deletes the record only if it still holds
//! our token. A mismatch means the lock was stolen; it is logged and left
//! alone.
//!
//! # Invariants
//!
//! - A lock is never deleted by anyone but its holder, except by stealing
//!   a stale record
//! - [`LockGuard`] releases on drop, so every exit path from a locked
//!   section gives the lock back
//!
//! # Known Race
//!
//! This is not a linearizable lock. On backends without atomic create
//! (rclone's create-only write is an existence probe followed by the
//! upload), two acquirers can both see no record, both write, and each
//! read back its own token before the other's write lands; both then
//! believe they hold the lock. The same applies to two processes stealing
//! one stale record at once, and a holder that stalls past `stale_after`
//! can be stolen from and still go on to write. The ref re-read under the
//! lock does not detect any of these: it only catches a ref that moved
//! before we looked.
//!
//! A write that fails after storing our record (the upload landed, the
//! acknowledgement did not) would otherwise leave the lock held until it
//! goes stale, so every failed acquisition makes a token-checked release
//! before returning the error.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::paths::RemoteLayout;
use crate::core::types::{RefName, UtcTimestamp};
use crate::storage::{StorageBackend, StorageError, WriteMode};

/// Errors from locking operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// The lock stayed held by someone else for every attempt.
    #[error("timed out acquiring lock {path} after {attempts} attempts")]
    Timeout {
        /// Lock record path
        path: String,
        /// Attempts made
        attempts: u32,
    },

    /// Storage failure while reading or writing the record.
    #[error("lock storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Lock granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockScope {
    /// One lock per ref (`refs/heads/main.lock`)
    #[default]
    Ref,
    /// One lock for the whole repository (`lock`)
    Repository,
}

/// Lock timing parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConfig {
    /// Lock granularity
    pub scope: LockScope,
    /// Age after which a record is considered abandoned
    pub stale_after: Duration,
    /// Acquisition attempts before giving up
    pub max_attempts: u32,
    /// First backoff delay
    pub initial_backoff: Duration,
    /// Cap on the backoff delay
    pub max_backoff: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            scope: LockScope::Ref,
            stale_after: Duration::from_secs(300),
            max_attempts: 20,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// Contents of a lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Random token identifying the holder
    pub token: String,
    /// When the lock was taken
    pub acquired_at: UtcTimestamp,
    /// Process id of the holder, for diagnostics
    #[serde(default)]
    pub pid: u32,
}

impl LockRecord {
    /// A fresh record for `token`, stamped now.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            acquired_at: UtcTimestamp::now(),
            pid: std::process::id(),
        }
    }

    /// Serialize to JSON bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Parse from JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Whether this record is older than `stale_after` at `now`.
    pub fn is_stale(&self, now: UtcTimestamp, stale_after: Duration) -> bool {
        self.acquired_at.age_at(now) > stale_after
    }
}

/// What sits at a lock path right now.
enum Observed {
    Free,
    Ours,
    Held(LockRecord),
    Unreadable,
}

/// Acquires and releases remote locks.
#[derive(Clone)]
pub struct LockManager {
    backend: Arc<dyn StorageBackend>,
    layout: RemoteLayout,
    config: LockConfig,
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("layout", &self.layout)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LockManager {
    /// Create a manager for the repository at `layout`.
    pub fn new(backend: Arc<dyn StorageBackend>, layout: RemoteLayout, config: LockConfig) -> Self {
        Self {
            backend,
            layout,
            config,
        }
    }

    /// The configuration in effect.
    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Lock record path guarding `name` under the configured scope.
    pub fn lock_path(&self, name: &RefName) -> String {
        match self.config.scope {
            LockScope::Ref => self.layout.ref_lock_path(name),
            LockScope::Repository => self.layout.repository_lock_path(),
        }
    }

    /// Acquire the lock guarding `name`.
    pub fn acquire(&self, name: &RefName) -> Result<LockGuard<'_>, LockError> {
        self.acquire_path(&self.lock_path(name))
    }

    /// Acquire the lock at `path`.
    ///
    /// # Errors
    ///
    /// - [`LockError::Timeout`] if the lock stays held for every attempt
    /// - [`LockError::Storage`] on storage failure
    pub fn acquire_path(&self, path: &str) -> Result<LockGuard<'_>, LockError> {
        let token = uuid::Uuid::new_v4().to_string();
        let attempts = self.config.max_attempts.max(1);
        let mut backoff = self.config.initial_backoff;

        for attempt in 1..=attempts {
            match self
                .backend
                .write(path, &LockRecord::new(&token).to_bytes(), WriteMode::CreateOnly)
            {
                // AlreadyExists may be our own earlier write; the read settles it
                Ok(()) | Err(StorageError::AlreadyExists { .. }) => {}
                Err(e) => return Err(self.abandon(path, &token, e.into())),
            }

            let observed = self
                .observe(path, &token)
                .map_err(|e| self.abandon(path, &token, e))?;
            let stale = match observed {
                Observed::Ours => return Ok(self.guard(path, token)),
                // Released between our write and read
                Observed::Free => continue,
                Observed::Unreadable => {
                    tracing::warn!(path, "lock record is unreadable, treating as stale");
                    true
                }
                Observed::Held(record) => {
                    let stale = record.is_stale(UtcTimestamp::now(), self.config.stale_after);
                    if stale {
                        tracing::warn!(
                            path,
                            acquired_at = %record.acquired_at,
                            pid = record.pid,
                            "stealing stale lock"
                        );
                    } else {
                        tracing::debug!(path, attempt, holder_pid = record.pid, "lock is held");
                    }
                    stale
                }
            };

            if stale {
                let stolen = self
                    .backend
                    .write(path, &LockRecord::new(&token).to_bytes(), WriteMode::Overwrite)
                    .map_err(LockError::from)
                    .and_then(|()| self.observe(path, &token))
                    .map_err(|e| self.abandon(path, &token, e))?;
                if let Observed::Ours = stolen {
                    return Ok(self.guard(path, token));
                }
                // Someone else stole it first
                continue;
            }

            if attempt < attempts {
                let base = backoff.as_millis() as u64;
                let jitter = rand::rng().random_range(0..=base / 2);
                std::thread::sleep(Duration::from_millis(base + jitter));
                backoff = (backoff * 2).min(self.config.max_backoff);
            }
        }

        Err(LockError::Timeout {
            path: path.to_string(),
            attempts,
        })
    }

    /// Release the lock at `path` if it still carries `token`.
    ///
    /// A record carrying another token (the lock was stolen) or a missing
    /// record is logged and left alone.
    pub fn release(&self, path: &str, token: &str) -> Result<(), LockError> {
        match self.observe(path, token)? {
            Observed::Ours => match self.backend.delete(path) {
                Ok(()) | Err(StorageError::NotFound { .. }) => {
                    tracing::debug!(path, "released lock");
                    Ok(())
                }
                Err(e) => Err(e.into()),
            },
            Observed::Free => {
                tracing::warn!(path, "lock already released by someone else");
                Ok(())
            }
            Observed::Held(record) => {
                tracing::warn!(path, holder_pid = record.pid, "lock was taken over, not releasing");
                Ok(())
            }
            Observed::Unreadable => {
                tracing::warn!(path, "lock record is unreadable, not releasing");
                Ok(())
            }
        }
    }

    /// Remove a record we may have stored before `err`, then hand `err` back.
    fn abandon(&self, path: &str, token: &str, err: LockError) -> LockError {
        if let Err(cleanup) = self.release(path, token) {
            tracing::warn!(
                path,
                error = %cleanup,
                "cannot clean up after failed lock attempt"
            );
        }
        err
    }

    fn observe(&self, path: &str, token: &str) -> Result<Observed, LockError> {
        let bytes = match self.backend.read(path) {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound { .. }) => return Ok(Observed::Free),
            Err(e) => return Err(e.into()),
        };
        Ok(match LockRecord::from_bytes(&bytes) {
            Ok(record) if record.token == token => Observed::Ours,
            Ok(record) => Observed::Held(record),
            Err(_) => Observed::Unreadable,
        })
    }

    fn guard(&self, path: &str, token: String) -> LockGuard<'_> {
        tracing::debug!(path, "acquired lock");
        LockGuard {
            manager: self,
            path: path.to_string(),
            token,
            released: false,
        }
    }
}

/// A held lock.
///
/// The lock is released when this guard is dropped (RAII pattern). Call
/// [`LockGuard::release`] to observe release errors.
#[derive(Debug)]
pub struct LockGuard<'a> {
    manager: &'a LockManager,
    path: String,
    token: String,
    released: bool,
}

impl LockGuard<'_> {
    /// Path of the lock record.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Our token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Release the lock now.
    pub fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        self.manager.release(&self.path, &self.token)
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        // Best-effort release on drop
        if let Err(e) = self.manager.release(&self.path, &self.token) {
            tracing::warn!(path = %self.path, error = %e, "failed to release lock");
        }
    }
}
