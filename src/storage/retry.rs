//! storage::retry
//!
//! Bounded retry for transient storage failures.
//!
//! [`RetryingBackend`] wraps any backend and re-attempts operations that
//! fail with a retryable error ([`StorageError::is_retryable`]), sleeping
//! with exponential backoff between attempts. Non-retryable errors and
//! `NotFound`/`AlreadyExists` outcomes pass straight through.
//!
//! A create-only write that timed out after the server stored it will come
//! back as `AlreadyExists` on the next attempt. Callers already treat that
//! as "someone wrote it" and verify content where it matters.

use std::time::Duration;

use super::traits::{Entry, StorageBackend, StorageError, WriteMode};

/// Retry parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first (at least 1)
    pub attempts: u32,
    /// Delay after the first failure
    pub initial_backoff: Duration,
    /// Cap on the delay
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt number `attempt` (1-based; attempt 1 has none).
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt - 2).unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Decorator adding retries to a backend.
pub struct RetryingBackend {
    inner: Box<dyn StorageBackend>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for RetryingBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingBackend")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RetryingBackend {
    /// Wrap `inner` with `policy`.
    pub fn new(inner: Box<dyn StorageBackend>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// The retry policy in effect.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    fn retry<T, F>(&self, op: &str, path: &str, f: F) -> Result<T, StorageError>
    where
        F: Fn(&dyn StorageBackend) -> Result<T, StorageError>,
    {
        let attempts = self.policy.attempts.max(1);
        let mut attempt = 1;
        loop {
            match f(self.inner.as_ref()) {
                Err(e) if e.is_retryable() && attempt < attempts => {
                    attempt += 1;
                    let delay = self.policy.backoff(attempt);
                    tracing::debug!(
                        op,
                        path,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying storage operation"
                    );
                    std::thread::sleep(delay);
                }
                result => return result,
            }
        }
    }
}

impl StorageBackend for RetryingBackend {
    fn mkdir(&self, path: &str) -> Result<(), StorageError> {
        self.retry("mkdir", path, |b| b.mkdir(path))
    }

    fn list(&self, path: &str, recursive: bool) -> Result<Vec<Entry>, StorageError> {
        self.retry("list", path, |b| b.list(path, recursive))
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        self.retry("read", path, |b| b.read(path))
    }

    fn write(&self, path: &str, data: &[u8], mode: WriteMode) -> Result<(), StorageError> {
        self.retry("write", path, |b| b.write(path, data, mode))
    }

    fn delete(&self, path: &str) -> Result<(), StorageError> {
        self.retry("delete", path, |b| b.delete(path))
    }

    fn purge(&self, path: &str) -> Result<(), StorageError> {
        self.retry("purge", path, |b| b.purge(path))
    }

    fn exists(&self, path: &str) -> Result<bool, StorageError> {
        self.retry("exists", path, |b| b.exists(path))
    }
}
