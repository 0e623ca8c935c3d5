//! core::paths
//!
//! Centralized path routing for the remote repository layout.
//!
//! # Architecture
//!
//! Every remote path the helper touches is computed here. No other module
//! formats `objects/` or `refs/` paths by hand, so the layout can only
//! change in one place.
//!
//! # Storage Layout
//!
//! All data lives under the repository prefix taken from the remote URL:
//! - `HEAD` - symbolic pointer (`ref: refs/heads/<branch>`)
//! - `refs/heads/<branch>` - file containing an object id
//! - `refs/heads/<branch>.lock` - per-ref lock record
//! - `lock` - repository-wide lock record
//! - `objects/<2 hex>/<rest of hex>` - zlib-compressed loose objects
//!
//! # Example
//!
//! ```
//! use git_remote_rclone::core::paths::RemoteLayout;
//! use git_remote_rclone::core::types::{Oid, RefName};
//!
//! let layout = RemoteLayout::new("backups/project.git");
//! let oid = Oid::new("abc123def4567890abc123def4567890abc12345").unwrap();
//! let main = RefName::new("refs/heads/main").unwrap();
//!
//! assert_eq!(
//!     layout.object_path(&oid),
//!     "backups/project.git/objects/ab/c123def4567890abc123def4567890abc12345"
//! );
//! assert_eq!(layout.ref_path(&main), "backups/project.git/refs/heads/main");
//! assert_eq!(layout.ref_lock_path(&main), "backups/project.git/refs/heads/main.lock");
//! ```

use crate::core::types::{Oid, RefName};

/// Suffix marking lock records inside the ref namespace.
pub const LOCK_SUFFIX: &str = ".lock";

/// Path routing for one remote repository.
///
/// # Invariants
///
/// - The prefix never starts or ends with `/`
/// - Ref and object paths are derived only from validated [`RefName`] and
///   [`Oid`] values, so they cannot escape the prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLayout {
    prefix: String,
}

impl RemoteLayout {
    /// Create a layout rooted at `prefix` (slashes at either end are ignored).
    pub fn new(prefix: impl AsRef<str>) -> Self {
        Self {
            prefix: prefix.as_ref().trim_matches('/').to_string(),
        }
    }

    /// The repository prefix (empty for the root of the remote).
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Join a relative path onto the repository prefix.
    pub fn join(&self, relative: &str) -> String {
        let relative = relative.trim_start_matches('/');
        if self.prefix.is_empty() {
            relative.to_string()
        } else if relative.is_empty() {
            self.prefix.clone()
        } else {
            format!("{}/{}", self.prefix, relative)
        }
    }

    // =========================================================================
    // Refs
    // =========================================================================

    /// Directory holding every ref file.
    pub fn refs_dir(&self) -> String {
        self.join("refs")
    }

    /// Path of the file storing `name`'s object id.
    pub fn ref_path(&self, name: &RefName) -> String {
        self.join(name.as_str())
    }

    /// Path of the symbolic `HEAD` file.
    pub fn head_path(&self) -> String {
        self.join("HEAD")
    }

    /// Convert a path relative to [`Self::refs_dir`] back into a ref name.
    ///
    /// Returns `None` for lock records and anything that is not a valid ref.
    pub fn ref_name_from_listing(&self, relative: &str) -> Option<RefName> {
        let relative = relative.trim_start_matches('/');
        if relative.ends_with(LOCK_SUFFIX) {
            return None;
        }
        RefName::new(format!("refs/{relative}")).ok()
    }

    // =========================================================================
    // Locks
    // =========================================================================

    /// Lock record guarding a single ref.
    pub fn ref_lock_path(&self, name: &RefName) -> String {
        format!("{}{}", self.ref_path(name), LOCK_SUFFIX)
    }

    /// Lock record guarding the whole repository.
    pub fn repository_lock_path(&self) -> String {
        self.join("lock")
    }

    // =========================================================================
    // Objects
    // =========================================================================

    /// Directory holding every object.
    pub fn objects_dir(&self) -> String {
        self.join("objects")
    }

    /// Path of a loose object: `objects/<2 hex>/<rest>`.
    pub fn object_path(&self, oid: &Oid) -> String {
        let (dir, file) = oid.fanout();
        self.join(&format!("objects/{dir}/{file}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid() -> Oid {
        Oid::new("0123456789abcdef0123456789abcdef01234567").unwrap()
    }

    #[test]
    fn prefix_slashes_trimmed() {
        let layout = RemoteLayout::new("/repo/path/");
        assert_eq!(layout.prefix(), "repo/path");
        assert_eq!(layout.head_path(), "repo/path/HEAD");
    }

    #[test]
    fn empty_prefix_yields_relative_paths() {
        let layout = RemoteLayout::new("");
        assert_eq!(layout.head_path(), "HEAD");
        assert_eq!(
            layout.object_path(&oid()),
            "objects/01/23456789abcdef0123456789abcdef01234567"
        );
        assert_eq!(layout.join(""), "");
    }

    #[test]
    fn nested_branch_paths() {
        let layout = RemoteLayout::new("r");
        let name = RefName::new("refs/heads/feature/x").unwrap();
        assert_eq!(layout.ref_path(&name), "r/refs/heads/feature/x");
        assert_eq!(layout.ref_lock_path(&name), "r/refs/heads/feature/x.lock");
    }

    #[test]
    fn listing_round_trip_skips_locks() {
        let layout = RemoteLayout::new("r");
        assert_eq!(
            layout.ref_name_from_listing("heads/main"),
            Some(RefName::new("refs/heads/main").unwrap())
        );
        assert_eq!(layout.ref_name_from_listing("heads/main.lock"), None);
        assert_eq!(layout.ref_name_from_listing("heads/bad..name"), None);
    }

    #[test]
    fn repository_lock_outside_refs() {
        let layout = RemoteLayout::new("r");
        assert_eq!(layout.repository_lock_path(), "r/lock");
        assert!(!layout.repository_lock_path().starts_with(&layout.refs_dir()));
    }
}
