//! remote::refs
//!
//! Remote ref namespace.
//!
//! # Layout
//!
//! - `refs/<...>` files each hold one object id followed by a newline
//! - `HEAD` holds `ref: <refname>\n`
//!
//! # Invariants
//!
//! - [`RefStore::write`] and [`RefStore::delete`] are only called while the
//!   ref's lock is held (see [`super::lock`]); this module does not lock
//! - Listing tolerates concurrent writers: lock records are skipped and a
//!   ref deleted between listing and reading is omitted

use std::sync::Arc;

use thiserror::Error;

use crate::core::paths::RemoteLayout;
use crate::core::types::{Oid, RefName};
use crate::storage::{StorageBackend, StorageError, WriteMode};

/// Prefix of a symbolic ref file.
const SYMREF_PREFIX: &str = "ref: ";

/// Errors from ref storage.
#[derive(Debug, Error)]
pub enum RefError {
    /// Storage failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A ref file does not contain what it should.
    #[error("malformed ref {name}: {content:?}")]
    Malformed {
        /// The ref (or `HEAD`)
        name: String,
        /// The file content
        content: String,
    },
}

/// A remote ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ref {
    /// Full ref name
    pub name: RefName,
    /// Object the ref points at
    pub target: Oid,
}

/// Snapshot of the remote ref namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefListing {
    /// Every readable ref, sorted by name
    pub refs: Vec<Ref>,
    /// Target of the symbolic `HEAD`, if set
    pub head: Option<RefName>,
}

impl RefListing {
    /// Look up a ref's target.
    pub fn get(&self, name: &RefName) -> Option<&Oid> {
        self.refs
            .iter()
            .find(|r| &r.name == name)
            .map(|r| &r.target)
    }

    /// Targets of every ref.
    pub fn targets(&self) -> Vec<Oid> {
        self.refs.iter().map(|r| r.target.clone()).collect()
    }
}

/// Ref store over a storage backend.
#[derive(Clone)]
pub struct RefStore {
    backend: Arc<dyn StorageBackend>,
    layout: RemoteLayout,
}

impl std::fmt::Debug for RefStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefStore")
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl RefStore {
    /// Create a store for the repository at `layout`.
    pub fn new(backend: Arc<dyn StorageBackend>, layout: RemoteLayout) -> Self {
        Self { backend, layout }
    }

    /// Read a ref. `None` if it does not exist.
    pub fn resolve(&self, name: &RefName) -> Result<Option<Oid>, RefError> {
        let bytes = match self.backend.read(&self.layout.ref_path(name)) {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let content = String::from_utf8_lossy(&bytes);
        let oid = Oid::new(content.trim()).map_err(|_| RefError::Malformed {
            name: name.to_string(),
            content: content.to_string(),
        })?;
        Ok(Some(oid))
    }

    /// List every ref and the symbolic HEAD.
    ///
    /// An empty or missing ref directory yields an empty listing.
    pub fn list_all(&self) -> Result<RefListing, RefError> {
        let entries = match self.backend.list(&self.layout.refs_dir(), true) {
            Ok(entries) => entries,
            Err(StorageError::NotFound { .. }) => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let mut refs = Vec::new();
        for entry in entries {
            let Some(name) = self.layout.ref_name_from_listing(&entry.path) else {
                tracing::trace!(path = %entry.path, "skipping non-ref entry");
                continue;
            };
            match self.resolve(&name) {
                Ok(Some(target)) => refs.push(Ref { name, target }),
                // Deleted since the listing
                Ok(None) => {}
                Err(RefError::Malformed { name, content }) => {
                    tracing::warn!(%name, ?content, "ignoring malformed remote ref");
                }
                Err(e) => return Err(e),
            }
        }
        refs.sort_by(|a, b| a.name.cmp(&b.name));

        let head = match self.read_head() {
            Ok(head) => head,
            Err(RefError::Malformed { content, .. }) => {
                tracing::warn!(?content, "ignoring malformed remote HEAD");
                None
            }
            Err(e) => return Err(e),
        };

        Ok(RefListing { refs, head })
    }

    /// Point `name` at `oid`. Caller must hold the ref's lock.
    pub fn write(&self, name: &RefName, oid: &Oid) -> Result<(), RefError> {
        let content = format!("{oid}\n");
        self.backend.write(
            &self.layout.ref_path(name),
            content.as_bytes(),
            WriteMode::Overwrite,
        )?;
        Ok(())
    }

    /// Remove `name`. Caller must hold the ref's lock.
    ///
    /// Returns `false` if the ref did not exist.
    pub fn delete(&self, name: &RefName) -> Result<bool, RefError> {
        match self.backend.delete(&self.layout.ref_path(name)) {
            Ok(()) => Ok(true),
            Err(StorageError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Target of the symbolic HEAD, if present.
    pub fn read_head(&self) -> Result<Option<RefName>, RefError> {
        let bytes = match self.backend.read(&self.layout.head_path()) {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let content = String::from_utf8_lossy(&bytes);
        let target = content
            .trim()
            .strip_prefix(SYMREF_PREFIX)
            .and_then(|t| RefName::new(t.trim()).ok())
            .ok_or_else(|| RefError::Malformed {
                name: "HEAD".to_string(),
                content: content.to_string(),
            })?;
        Ok(Some(target))
    }

    /// Make HEAD point at `target`.
    ///
    /// With [`WriteMode::CreateOnly`] an existing HEAD is left alone and
    /// `false` is returned.
    pub fn write_head(&self, target: &RefName, mode: WriteMode) -> Result<bool, RefError> {
        let content = format!("{SYMREF_PREFIX}{target}\n");
        match self
            .backend
            .write(&self.layout.head_path(), content.as_bytes(), mode)
        {
            Ok(()) => Ok(true),
            Err(StorageError::AlreadyExists { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;

    fn store() -> (MemoryBackend, RefStore) {
        let backend = MemoryBackend::new();
        let store = RefStore::new(Arc::new(backend.clone()), RemoteLayout::new("repo"));
        (backend, store)
    }

    fn oid(c: char) -> Oid {
        Oid::new(c.to_string().repeat(40)).unwrap()
    }

    fn name(s: &str) -> RefName {
        RefName::new(s).unwrap()
    }

    #[test]
    fn resolve_missing_is_none() {
        let (_backend, store) = store();
        assert_eq!(store.resolve(&name("refs/heads/main")).unwrap(), None);
    }

    #[test]
    fn write_resolve_delete() {
        let (backend, store) = store();
        let main = name("refs/heads/main");

        store.write(&main, &oid('a')).unwrap();
        assert_eq!(
            backend.get("repo/refs/heads/main").unwrap(),
            format!("{}\n", oid('a')).into_bytes()
        );
        assert_eq!(store.resolve(&main).unwrap(), Some(oid('a')));

        assert!(store.delete(&main).unwrap());
        assert!(!store.delete(&main).unwrap());
        assert_eq!(store.resolve(&main).unwrap(), None);
    }

    #[test]
    fn empty_repository_lists_nothing() {
        let (_backend, store) = store();
        let listing = store.list_all().unwrap();
        assert!(listing.refs.is_empty());
        assert_eq!(listing.head, None);
    }

    #[test]
    fn list_skips_locks_and_garbage() {
        let (backend, store) = store();
        store.write(&name("refs/heads/main"), &oid('a')).unwrap();
        store.write(&name("refs/heads/feature/x"), &oid('b')).unwrap();
        store.write(&name("refs/tags/v1"), &oid('c')).unwrap();
        backend.put("repo/refs/heads/main.lock", "{}");
        backend.put("repo/refs/heads/broken", "not an oid");
        store
            .write_head(&name("refs/heads/main"), WriteMode::CreateOnly)
            .unwrap();

        let listing = store.list_all().unwrap();
        let names: Vec<_> = listing.refs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["refs/heads/feature/x", "refs/heads/main", "refs/tags/v1"]
        );
        assert_eq!(listing.head, Some(name("refs/heads/main")));
        assert_eq!(listing.get(&name("refs/heads/main")), Some(&oid('a')));
    }

    #[test]
    fn head_create_only_keeps_existing() {
        let (_backend, store) = store();
        assert!(store
            .write_head(&name("refs/heads/main"), WriteMode::CreateOnly)
            .unwrap());
        assert!(!store
            .write_head(&name("refs/heads/other"), WriteMode::CreateOnly)
            .unwrap());
        assert_eq!(store.read_head().unwrap(), Some(name("refs/heads/main")));
    }

    #[test]
    fn malformed_head_is_error() {
        let (backend, store) = store();
        backend.put("repo/HEAD", "garbage");
        assert!(matches!(
            store.read_head(),
            Err(RefError::Malformed { .. })
        ));
    }
}
