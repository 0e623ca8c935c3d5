//! git
//!
//! Access to the local repository.
//!
//! # Architecture
//!
//! The synchronization engine sees the local repository only through the
//! [`LocalGitBridge`] trait. Two implementations exist:
//!
//! - [`Git`] - native libgit2 access via the `git2` crate (production)
//! - [`MemoryGit`] - in-memory object database for tests
//!
//! This module is the **only doorway** to `git2`; no other module imports
//! it, and nothing shells out to the git CLI.
//!
//! # Invariants
//!
//! - Objects are exchanged as [`RawObject`]s, never as git2 handles
//! - `write_object` returns the id git computed, which callers compare
//!   against the id they expected
//!
//! # Example
//!
//! ```
//! use git_remote_rclone::git::{LocalGitBridge, MemoryGit};
//!
//! let git = MemoryGit::new();
//! let blob = git.blob(b"content");
//! let tree = git.tree(&[("100644", "file.txt", &blob)]);
//! let commit = git.commit(&tree, &[], "initial");
//! git.set_ref("refs/heads/main", &commit);
//!
//! let objects = git.reachable_objects(&commit, &[]).unwrap();
//! assert_eq!(objects.len(), 3);
//! ```

mod interface;
mod mock;

pub use interface::{Git, GitError};
pub use mock::MemoryGit;

use crate::core::object::RawObject;
use crate::core::types::Oid;

/// Operations the helper needs from the local repository.
pub trait LocalGitBridge {
    /// Resolve a ref name (or any revision git accepts) to an object id.
    ///
    /// Annotated tags resolve to the tag object, not its target. Returns
    /// `None` if the name does not resolve.
    fn resolve_ref(&self, name: &str) -> Result<Option<Oid>, GitError>;

    /// The ref local `HEAD` points at, if it is symbolic.
    fn symbolic_head(&self) -> Result<Option<String>, GitError>;

    /// Whether the object database holds `oid`.
    fn object_exists(&self, oid: &Oid) -> Result<bool, GitError>;

    /// Read an object.
    ///
    /// # Errors
    ///
    /// [`GitError::ObjectNotFound`] if the object is absent.
    fn read_object(&self, oid: &Oid) -> Result<RawObject, GitError>;

    /// Insert an object, returning the id the repository assigned it.
    fn write_object(&self, object: &RawObject) -> Result<Oid, GitError>;

    /// Objects reachable from `from` that are not reachable from any of
    /// `excluding`.
    ///
    /// Entries of `excluding` that are not present locally are ignored.
    /// The result is an approximation from the excluded side: objects
    /// reachable only through history of an excluded tip (not its tree)
    /// may still be returned, so callers must tolerate already-present
    /// objects.
    fn reachable_objects(&self, from: &Oid, excluding: &[Oid]) -> Result<Vec<Oid>, GitError>;

    /// Whether `ancestor` is reachable from `descendant` through parent
    /// links (a commit is its own ancestor).
    fn is_ancestor(&self, ancestor: &Oid, descendant: &Oid) -> Result<bool, GitError>;
}
