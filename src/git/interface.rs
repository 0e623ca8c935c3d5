//! git::interface
//!
//! Local repository access using git2.
//!
//! # Architecture
//!
//! The `Git` struct is the native-library implementation of
//! [`LocalGitBridge`]. No other module imports `git2`. Everything crossing
//! this boundary is converted to the crate's own [`Oid`], [`ObjectKind`]
//! and [`RawObject`] types.
//!
//! # Error Handling
//!
//! Git errors are categorized into typed variants:
//! - [`GitError::NotARepo`]: no repository at the given location
//! - [`GitError::ObjectNotFound`]: requested object is not in the object database
//! - [`GitError::InvalidOid`]: an id that git2 cannot represent
//! - [`GitError::Internal`]: anything else from libgit2
//!
//! Absent refs are not errors: [`LocalGitBridge::resolve_ref`] returns `None`.
//!
//! # Example
//!
//! ```ignore
//! use git_remote_rclone::git::{Git, LocalGitBridge};
//!
//! let git = Git::open_from_env()?;
//! if let Some(oid) = git.resolve_ref("refs/heads/main")? {
//!     println!("main is at {oid}");
//! }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::LocalGitBridge;
use crate::core::object::RawObject;
use crate::core::types::{ObjectKind, Oid, TypeError};

/// Errors from local Git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// Not inside a Git repository.
    #[error("not a git repository: {path}")]
    NotARepo {
        /// The path that was searched
        path: PathBuf,
    },

    /// Object not found in the object database.
    #[error("object not found: {oid}")]
    ObjectNotFound {
        /// The OID that was not found
        oid: String,
    },

    /// Invalid object id format.
    #[error("invalid object id: {oid}")]
    InvalidOid {
        /// The invalid OID string
        oid: String,
    },

    /// Object type the helper does not transfer.
    #[error("unsupported object type for {oid}")]
    UnsupportedObject {
        /// The object's id
        oid: String,
    },

    /// Internal git2 error.
    #[error("git error: {message}")]
    Internal {
        /// The error message
        message: String,
    },
}

impl GitError {
    /// Create a GitError from a git2::Error with context.
    fn from_git2(err: git2::Error, context: &str) -> Self {
        match err.code() {
            git2::ErrorCode::NotFound => GitError::ObjectNotFound {
                oid: context.to_string(),
            },
            git2::ErrorCode::InvalidSpec => GitError::InvalidOid {
                oid: context.to_string(),
            },
            _ => GitError::Internal {
                message: format!("{}: {}", context, err.message()),
            },
        }
    }
}

impl From<git2::Error> for GitError {
    fn from(err: git2::Error) -> Self {
        GitError::Internal {
            message: err.message().to_string(),
        }
    }
}

impl From<TypeError> for GitError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::InvalidOid(msg) => GitError::InvalidOid { oid: msg },
            other => GitError::Internal {
                message: other.to_string(),
            },
        }
    }
}

/// Local repository handle.
///
/// Works for both bare and non-bare repositories: git clones into a fresh
/// repository and may run the helper from inside `.git` or a bare directory.
pub struct Git {
    /// The underlying git2 repository
    repo: git2::Repository,
}

impl std::fmt::Debug for Git {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Git")
            .field("path", &self.repo.path())
            .finish()
    }
}

impl Git {
    // =========================================================================
    // Repository Opening
    // =========================================================================

    /// Open the repository at (or above) `path`.
    ///
    /// # Errors
    ///
    /// - [`GitError::NotARepo`] if no repository is found
    pub fn open(path: &Path) -> Result<Self, GitError> {
        let repo = git2::Repository::discover(path).map_err(|_| GitError::NotARepo {
            path: path.to_path_buf(),
        })?;
        Ok(Self { repo })
    }

    /// Open the repository git launched the helper for.
    ///
    /// Honors `GIT_DIR` (always set by git when running a remote helper)
    /// and falls back to discovery from the current directory.
    pub fn open_from_env() -> Result<Self, GitError> {
        let repo = git2::Repository::open_from_env().map_err(|_| GitError::NotARepo {
            path: std::env::var_os("GIT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
        })?;
        Ok(Self { repo })
    }

    /// Path to the git directory.
    pub fn git_dir(&self) -> &Path {
        self.repo.path()
    }

    // =========================================================================
    // Conversions
    // =========================================================================

    fn to_git2(oid: &Oid) -> Result<git2::Oid, GitError> {
        git2::Oid::from_str(oid.as_str()).map_err(|e| GitError::from_git2(e, oid.as_str()))
    }

    fn from_git2(id: git2::Oid) -> Result<Oid, GitError> {
        Oid::new(id.to_string()).map_err(GitError::from)
    }

    fn to_kind(kind: Option<git2::ObjectType>, id: git2::Oid) -> Result<ObjectKind, GitError> {
        match kind {
            Some(git2::ObjectType::Commit) => Ok(ObjectKind::Commit),
            Some(git2::ObjectType::Tree) => Ok(ObjectKind::Tree),
            Some(git2::ObjectType::Blob) => Ok(ObjectKind::Blob),
            Some(git2::ObjectType::Tag) => Ok(ObjectKind::Tag),
            _ => Err(GitError::UnsupportedObject {
                oid: id.to_string(),
            }),
        }
    }

    fn from_kind(kind: ObjectKind) -> git2::ObjectType {
        match kind {
            ObjectKind::Commit => git2::ObjectType::Commit,
            ObjectKind::Tree => git2::ObjectType::Tree,
            ObjectKind::Blob => git2::ObjectType::Blob,
            ObjectKind::Tag => git2::ObjectType::Tag,
        }
    }

    // =========================================================================
    // Graph Walking
    // =========================================================================

    /// Add `tree` and everything below it to `out`, skipping subtrees that
    /// are already in `seen`. Gitlinks are not followed.
    fn walk_tree(
        &self,
        tree: git2::Oid,
        seen: &mut HashSet<git2::Oid>,
        out: &mut Vec<git2::Oid>,
    ) -> Result<(), GitError> {
        if !seen.insert(tree) {
            return Ok(());
        }
        out.push(tree);

        let tree = self
            .repo
            .find_tree(tree)
            .map_err(|e| GitError::from_git2(e, &tree.to_string()))?;
        for entry in tree.iter() {
            match entry.kind() {
                Some(git2::ObjectType::Tree) => self.walk_tree(entry.id(), seen, out)?,
                Some(git2::ObjectType::Blob) => {
                    if seen.insert(entry.id()) {
                        out.push(entry.id());
                    }
                }
                // Submodule commits are not part of this repository
                _ => {}
            }
        }
        Ok(())
    }
}

impl LocalGitBridge for Git {
    fn resolve_ref(&self, name: &str) -> Result<Option<Oid>, GitError> {
        // revparse does not peel, so annotated tags resolve to the tag object
        match self.repo.revparse_single(name) {
            Ok(object) => Ok(Some(Self::from_git2(object.id())?)),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(GitError::from_git2(e, name)),
        }
    }

    fn symbolic_head(&self) -> Result<Option<String>, GitError> {
        match self.repo.find_reference("HEAD") {
            Ok(head) => Ok(head.symbolic_target().map(str::to_string)),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(GitError::from_git2(e, "HEAD")),
        }
    }

    fn object_exists(&self, oid: &Oid) -> Result<bool, GitError> {
        let id = Self::to_git2(oid)?;
        Ok(self.repo.odb()?.exists(id))
    }

    fn read_object(&self, oid: &Oid) -> Result<RawObject, GitError> {
        let id = Self::to_git2(oid)?;
        let odb = self.repo.odb()?;
        let object = odb
            .read(id)
            .map_err(|e| GitError::from_git2(e, oid.as_str()))?;
        Ok(RawObject::new(
            Self::to_kind(Some(object.kind()), id)?,
            object.data().to_vec(),
        ))
    }

    fn write_object(&self, object: &RawObject) -> Result<Oid, GitError> {
        let odb = self.repo.odb()?;
        let id = odb.write(Self::from_kind(object.kind), &object.data)?;
        Self::from_git2(id)
    }

    fn reachable_objects(&self, from: &Oid, excluding: &[Oid]) -> Result<Vec<Oid>, GitError> {
        let odb = self.repo.odb()?;
        let mut revwalk = self.repo.revwalk()?;
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        // Everything in the excluded tips' trees is already on the remote
        let mut known = Vec::new();
        for oid in excluding {
            let id = Self::to_git2(oid)?;
            if !odb.exists(id) {
                continue;
            }
            let object = self.repo.find_object(id, None)?;
            seen.insert(id);
            if let Ok(commit) = object.peel_to_commit() {
                revwalk.hide(commit.id())?;
                self.walk_tree(commit.tree_id(), &mut seen, &mut known)?;
            }
        }

        // Peel tag chains down to the object that seeds the walk
        let mut current = Self::to_git2(from)?;
        loop {
            let object = self
                .repo
                .find_object(current, None)
                .map_err(|e| GitError::from_git2(e, &current.to_string()))?;
            match object.kind() {
                Some(git2::ObjectType::Tag) => {
                    if seen.insert(current) {
                        out.push(current);
                    }
                    let tag = object.peel_to_tag()?;
                    current = tag.target_id();
                }
                Some(git2::ObjectType::Commit) => {
                    revwalk.push(current)?;
                    break;
                }
                Some(git2::ObjectType::Tree) => {
                    self.walk_tree(current, &mut seen, &mut out)?;
                    break;
                }
                Some(git2::ObjectType::Blob) => {
                    if seen.insert(current) {
                        out.push(current);
                    }
                    break;
                }
                _ => {
                    return Err(GitError::UnsupportedObject {
                        oid: current.to_string(),
                    })
                }
            }
        }

        for commit_id in revwalk {
            let commit_id = commit_id?;
            if !seen.insert(commit_id) {
                continue;
            }
            out.push(commit_id);
            let commit = self.repo.find_commit(commit_id)?;
            self.walk_tree(commit.tree_id(), &mut seen, &mut out)?;
        }

        out.into_iter().map(Self::from_git2).collect()
    }

    fn is_ancestor(&self, ancestor: &Oid, descendant: &Oid) -> Result<bool, GitError> {
        // A commit is its own ancestor
        if ancestor == descendant {
            return Ok(true);
        }

        let ancestor_id = Self::to_git2(ancestor)?;
        let descendant_id = Self::to_git2(descendant)?;

        // Tags are compared through the commits they point at
        let peel = |id: git2::Oid, oid: &Oid| -> Result<git2::Oid, GitError> {
            let object = self
                .repo
                .find_object(id, None)
                .map_err(|e| GitError::from_git2(e, oid.as_str()))?;
            Ok(object
                .peel_to_commit()
                .map(|c| c.id())
                .unwrap_or_else(|_| object.id()))
        };
        let ancestor_id = peel(ancestor_id, ancestor)?;
        let descendant_id = peel(descendant_id, descendant)?;
        if ancestor_id == descendant_id {
            return Ok(true);
        }

        self.repo
            .graph_descendant_of(descendant_id, ancestor_id)
            .map_err(|e| GitError::Internal {
                message: e.message().to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_variants_constructible() {
        let _ = GitError::NotARepo {
            path: PathBuf::from("/tmp"),
        };
        let _ = GitError::ObjectNotFound {
            oid: "abc123".to_string(),
        };
        let _ = GitError::InvalidOid {
            oid: "not-hex".to_string(),
        };
        let _ = GitError::UnsupportedObject {
            oid: "abc123".to_string(),
        };
        let _ = GitError::Internal {
            message: "oops".to_string(),
        };
    }

    #[test]
    fn type_errors_convert() {
        let err: GitError = TypeError::InvalidOid("xyz".into()).into();
        assert!(matches!(err, GitError::InvalidOid { .. }));
    }

    #[test]
    fn kind_mapping_round_trips() {
        for kind in [
            ObjectKind::Commit,
            ObjectKind::Tree,
            ObjectKind::Blob,
            ObjectKind::Tag,
        ] {
            let mapped = Git::to_kind(Some(Git::from_kind(kind)), git2::Oid::zero()).unwrap();
            assert_eq!(mapped, kind);
        }
        assert!(Git::to_kind(Some(git2::ObjectType::Any), git2::Oid::zero()).is_err());
    }
}
