//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`Oid`] - Git object identifier (SHA-1 or SHA-256 hex)
//! - [`HashKind`] - Hash algorithm implied by an object id's length
//! - [`ObjectKind`] - Git object type (commit, tree, blob, tag)
//! - [`RefName`] - Validated Git reference name
//! - [`UtcTimestamp`] - RFC3339 timestamp
//!
//! # Validation
//!
//! These types enforce validity at construction time. Invalid values
//! cannot be represented, so a ref path or object path derived from them
//! can never escape the remote repository prefix.
//!
//! # Examples
//!
//! ```
//! use git_remote_rclone::core::types::{Oid, RefName};
//!
//! let oid = Oid::new("abc123def4567890abc123def4567890abc12345").unwrap();
//! let refname = RefName::new("refs/heads/main").unwrap();
//! assert!(refname.is_branch_ref());
//! assert_eq!(oid.fanout().0, "ab");
//!
//! assert!(RefName::new("refs/heads/bad..name").is_err());
//! assert!(Oid::new("not-a-sha").is_err());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid object id: {0}")]
    InvalidOid(String),

    #[error("invalid ref name: {0}")]
    InvalidRefName(String),

    #[error("invalid object kind: {0}")]
    InvalidObjectKind(String),
}

/// Hash algorithm of a repository's object ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashKind {
    /// 20-byte SHA-1 ids (40 hex characters).
    Sha1,
    /// 32-byte SHA-256 ids (64 hex characters).
    Sha256,
}

impl HashKind {
    /// Length of a raw (binary) id in bytes.
    pub fn raw_len(self) -> usize {
        match self {
            HashKind::Sha1 => 20,
            HashKind::Sha256 => 32,
        }
    }

    /// Length of a hex id in characters.
    pub fn hex_len(self) -> usize {
        self.raw_len() * 2
    }
}

/// A Git object identifier (SHA-1 or SHA-256).
///
/// OIDs are normalized to lowercase for consistency.
///
/// # Example
///
/// ```
/// use git_remote_rclone::core::types::{HashKind, Oid};
///
/// // Create from hex string (normalized to lowercase)
/// let oid = Oid::new("ABC123DEF4567890ABC123DEF4567890ABC12345").unwrap();
/// assert_eq!(oid.as_str(), "abc123def4567890abc123def4567890abc12345");
/// assert_eq!(oid.hash_kind(), HashKind::Sha1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Oid(String);

impl Oid {
    /// Create a new validated object id.
    ///
    /// The OID is normalized to lowercase.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidOid` if the string is not a valid hex OID.
    pub fn new(oid: impl Into<String>) -> Result<Self, TypeError> {
        let oid = oid.into().to_ascii_lowercase();
        Self::validate(&oid)?;
        Ok(Self(oid))
    }

    /// Create an object id from its raw binary form.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidOid` if `raw` is neither 20 nor 32 bytes.
    pub fn from_raw(raw: &[u8]) -> Result<Self, TypeError> {
        Self::new(hex::encode(raw))
    }

    /// The id in binary form, as stored inside tree objects.
    pub fn to_raw(&self) -> Vec<u8> {
        // Validated as hex at construction
        hex::decode(&self.0).unwrap_or_default()
    }

    /// Wrap a digest produced by one of the supported hash functions.
    pub(crate) fn from_digest(digest: &[u8]) -> Self {
        Self(hex::encode(digest))
    }

    /// The hash algorithm this id was produced by.
    pub fn hash_kind(&self) -> HashKind {
        if self.0.len() == HashKind::Sha256.hex_len() {
            HashKind::Sha256
        } else {
            HashKind::Sha1
        }
    }

    /// Split the id into the fan-out directory and the file name used by
    /// the remote object layout (`ab` / `cdef...`).
    pub fn fanout(&self) -> (&str, &str) {
        self.0.split_at(2)
    }

    /// Validate an object id.
    fn validate(oid: &str) -> Result<(), TypeError> {
        // SHA-1 is 40 hex chars, SHA-256 is 64
        if oid.len() != HashKind::Sha1.hex_len() && oid.len() != HashKind::Sha256.hex_len() {
            return Err(TypeError::InvalidOid(format!(
                "expected 40 or 64 hex characters, got {}",
                oid.len()
            )));
        }
        if !oid.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidOid(
                "object id must be hexadecimal".into(),
            ));
        }
        Ok(())
    }

    /// Get the object id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Oid {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Oid> for String {
    fn from(oid: Oid) -> Self {
        oid.0
    }
}

impl AsRef<str> for Oid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Oid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The type of a Git object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Commit,
    Tree,
    Blob,
    Tag,
}

impl ObjectKind {
    /// The name used in loose object headers (`commit`, `tree`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Commit => "commit",
            ObjectKind::Tree => "tree",
            ObjectKind::Blob => "blob",
            ObjectKind::Tag => "tag",
        }
    }

    /// Parse a loose object header type name.
    pub fn parse(name: &str) -> Result<Self, TypeError> {
        match name {
            "commit" => Ok(ObjectKind::Commit),
            "tree" => Ok(ObjectKind::Tree),
            "blob" => Ok(ObjectKind::Blob),
            "tag" => Ok(ObjectKind::Tag),
            other => Err(TypeError::InvalidObjectKind(other.to_string())),
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated Git reference name.
///
/// Reference names must conform to Git's refname rules (see
/// `git check-ref-format`) and live under `refs/`. The symbolic `HEAD`
/// pointer is handled separately and is never a `RefName`.
///
/// # Example
///
/// ```
/// use git_remote_rclone::core::types::RefName;
///
/// let refname = RefName::new("refs/heads/feature/foo").unwrap();
/// assert!(refname.is_branch_ref());
/// assert!(RefName::new("HEAD").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RefName(String);

impl RefName {
    /// Create a new validated ref name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidRefName` if the name violates Git's refname
    /// rules or is outside the `refs/` namespace.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// Check if this ref is a branch ref.
    pub fn is_branch_ref(&self) -> bool {
        self.0.starts_with("refs/heads/")
    }

    /// Check `name` against `git check-ref-format` rules, restricted to
    /// the `refs/` namespace.
    fn validate(name: &str) -> Result<(), TypeError> {
        const FORBIDDEN_SEQUENCES: [&str; 3] = ["..", "@{", "//"];
        const FORBIDDEN_CHARS: [char; 8] = [' ', '~', '^', ':', '\\', '?', '*', '['];

        let invalid = |reason: String| Err(TypeError::InvalidRefName(reason));

        let Some(rest) = name.strip_prefix("refs/") else {
            return invalid(format!("ref name must be under refs/: '{name}'"));
        };
        if rest.is_empty() || name.ends_with('/') {
            return invalid(format!("ref name has an empty component: '{name}'"));
        }
        if let Some(seq) = FORBIDDEN_SEQUENCES.iter().find(|s| name.contains(*s)) {
            return invalid(format!("ref name cannot contain '{seq}'"));
        }
        if let Some(c) = name
            .chars()
            .find(|c| FORBIDDEN_CHARS.contains(c) || c.is_ascii_control())
        {
            return invalid(format!("ref name cannot contain {c:?}"));
        }
        if name.split('/').any(|part| part.starts_with('.') || part.ends_with(".lock")) {
            return invalid(format!(
                "ref name components cannot start with '.' or end with '.lock': '{name}'"
            ));
        }
        Ok(())
    }

    /// Get the ref name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RefName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RefName> for String {
    fn from(name: RefName) -> Self {
        name.0
    }
}

impl AsRef<str> for RefName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RefName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A UTC timestamp in RFC3339 format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UtcTimestamp(chrono::DateTime<chrono::Utc>);

impl UtcTimestamp {
    /// Create a timestamp for the current moment.
    pub fn now() -> Self {
        Self(chrono::Utc::now())
    }

    /// Create a timestamp from a chrono DateTime.
    pub fn from_datetime(dt: chrono::DateTime<chrono::Utc>) -> Self {
        Self(dt)
    }

    /// Time elapsed between this timestamp and `now`.
    ///
    /// Timestamps in the future (clock skew between writers) count as zero.
    pub fn age_at(&self, now: UtcTimestamp) -> std::time::Duration {
        (now.0 - self.0).to_std().unwrap_or(std::time::Duration::ZERO)
    }
}

impl std::fmt::Display for UtcTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
