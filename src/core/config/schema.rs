//! core::config::schema
//!
//! Configuration schema types.
//!
//! Both scopes (global and repository) share one file format. Every key is
//! optional; absent keys fall through to the other scope and then to the
//! built-in defaults.
//!
//! # Validation
//!
//! Config values are validated after parsing so that a bad file fails the
//! helper up front instead of halfway through a push.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Storage backend implementation names.
pub const VALID_BACKENDS: &[&str] = &["rclone", "local"];

/// Lock scope names.
pub const VALID_LOCK_SCOPES: &[&str] = &["ref", "repository"];

/// One configuration file (either scope).
///
/// # Example
///
/// ```toml
/// verbosity = 1
///
/// [storage]
/// backend = "rclone"
/// rclone_binary = "/usr/local/bin/rclone"
/// timeout_secs = 60
/// retries = 3
///
/// [lock]
/// scope = "ref"
/// stale_after_secs = 300
///
/// [transfer]
/// jobs = 8
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// Initial verbosity (git's scale: 0 quiet, 1 normal, 2+ verbose)
    pub verbosity: Option<u8>,

    /// Storage backend settings
    pub storage: Option<StorageSection>,

    /// Lock settings
    pub lock: Option<LockSection>,

    /// Transfer settings
    pub transfer: Option<TransferSection>,
}

impl ConfigFile {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(storage) = &self.storage {
            storage.validate()?;
        }
        if let Some(lock) = &self.lock {
            lock.validate()?;
        }
        if let Some(transfer) = &self.transfer {
            transfer.validate()?;
        }
        Ok(())
    }
}

/// `[storage]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSection {
    /// Backend implementation ("rclone" or "local")
    pub backend: Option<String>,

    /// Path or name of the rclone executable
    pub rclone_binary: Option<String>,

    /// Root directory for the local backend
    pub local_root: Option<PathBuf>,

    /// Timeout for a single storage operation
    pub timeout_secs: Option<u64>,

    /// Attempts for transient failures
    pub retries: Option<u32>,

    /// Initial backoff between attempts
    pub retry_backoff_ms: Option<u64>,
}

impl StorageSection {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(backend) = &self.backend {
            if !VALID_BACKENDS.contains(&backend.as_str()) {
                return Err(ConfigError::InvalidValue(format!(
                    "invalid storage backend '{}', must be one of: {}",
                    backend,
                    VALID_BACKENDS.join(", ")
                )));
            }
        }

        if let Some(binary) = &self.rclone_binary {
            if binary.trim().is_empty() {
                return Err(ConfigError::InvalidValue(
                    "rclone_binary cannot be empty".to_string(),
                ));
            }
        }

        if self.timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue(
                "timeout_secs must be positive".to_string(),
            ));
        }

        if self.retries == Some(0) {
            return Err(ConfigError::InvalidValue(
                "retries must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// `[lock]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LockSection {
    /// "ref" (one lock per ref) or "repository" (one lock for everything)
    pub scope: Option<String>,

    /// Age after which a lock is considered abandoned
    pub stale_after_secs: Option<u64>,

    /// Acquisition attempts before giving up
    pub max_attempts: Option<u32>,

    /// First backoff delay
    pub initial_backoff_ms: Option<u64>,

    /// Cap on the backoff delay
    pub max_backoff_ms: Option<u64>,
}

impl LockSection {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(scope) = &self.scope {
            if !VALID_LOCK_SCOPES.contains(&scope.as_str()) {
                return Err(ConfigError::InvalidValue(format!(
                    "invalid lock scope '{}', must be one of: {}",
                    scope,
                    VALID_LOCK_SCOPES.join(", ")
                )));
            }
        }

        if self.max_attempts == Some(0) {
            return Err(ConfigError::InvalidValue(
                "lock max_attempts must be at least 1".to_string(),
            ));
        }

        if let (Some(initial), Some(max)) = (self.initial_backoff_ms, self.max_backoff_ms) {
            if initial > max {
                return Err(ConfigError::InvalidValue(format!(
                    "lock initial_backoff_ms ({initial}) exceeds max_backoff_ms ({max})"
                )));
            }
        }

        Ok(())
    }
}

/// `[transfer]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TransferSection {
    /// Worker threads for uploads, downloads, and existence probes
    pub jobs: Option<usize>,
}

impl TransferSection {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.jobs == Some(0) {
            return Err(ConfigError::InvalidValue(
                "transfer jobs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
