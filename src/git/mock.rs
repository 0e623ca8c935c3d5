//! git::mock
//!
//! In-memory repository for deterministic testing.
//!
//! # Design
//!
//! `MemoryGit` stores real git objects (real ids, real commit and tree
//! encodings) in a map, so the synchronization engine can be exercised
//! end to end without touching disk. Builder helpers create blobs, trees,
//! commits and tags; every `write_object` call is recorded so tests can
//! assert on insertion order.
//!
//! Thread-safe via internal `Arc<Mutex<...>>`; clones share state.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{GitError, LocalGitBridge};
use crate::core::object::RawObject;
use crate::core::types::{HashKind, ObjectKind, Oid};

/// In-memory repository.
#[derive(Debug, Clone)]
pub struct MemoryGit {
    inner: Arc<Mutex<MemoryGitInner>>,
}

#[derive(Debug)]
struct MemoryGitInner {
    hash: HashKind,
    objects: HashMap<Oid, RawObject>,
    refs: BTreeMap<String, Oid>,
    head: Option<String>,
    written: Vec<Oid>,
}

impl Default for MemoryGit {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGit {
    /// Create an empty SHA-1 repository whose HEAD points at `refs/heads/main`.
    pub fn new() -> Self {
        Self::with_hash(HashKind::Sha1)
    }

    /// Create an empty repository using `hash` for object ids.
    pub fn with_hash(hash: HashKind) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryGitInner {
                hash,
                objects: HashMap::new(),
                refs: BTreeMap::new(),
                head: Some("refs/heads/main".to_string()),
                written: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryGitInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // =========================================================================
    // Builders
    // =========================================================================

    /// Store an object without recording it as a write.
    pub fn insert(&self, object: RawObject) -> Oid {
        let mut inner = self.lock();
        let oid = object.compute_oid(inner.hash);
        inner.objects.insert(oid.clone(), object);
        oid
    }

    /// Store a blob.
    pub fn blob(&self, content: &[u8]) -> Oid {
        self.insert(RawObject::new(ObjectKind::Blob, content.to_vec()))
    }

    /// Store a tree from `(mode, name, oid)` entries.
    pub fn tree(&self, entries: &[(&str, &str, &Oid)]) -> Oid {
        let mut sorted = entries.to_vec();
        sorted.sort_by(|a, b| a.1.cmp(b.1));

        let mut data = Vec::new();
        for (mode, name, oid) in sorted {
            data.extend_from_slice(format!("{mode} {name}\0").as_bytes());
            data.extend_from_slice(&oid.to_raw());
        }
        self.insert(RawObject::new(ObjectKind::Tree, data))
    }

    /// Store a commit.
    pub fn commit(&self, tree: &Oid, parents: &[&Oid], message: &str) -> Oid {
        let mut body = format!("tree {tree}\n");
        for parent in parents {
            body.push_str(&format!("parent {parent}\n"));
        }
        body.push_str("author Test <test@example.com> 1700000000 +0000\n");
        body.push_str("committer Test <test@example.com> 1700000000 +0000\n");
        body.push('\n');
        body.push_str(message);
        body.push('\n');
        self.insert(RawObject::new(ObjectKind::Commit, body.into_bytes()))
    }

    /// Store an annotated tag.
    pub fn tag(&self, target: &Oid, target_kind: ObjectKind, name: &str) -> Oid {
        let body = format!(
            "object {target}\ntype {target_kind}\ntag {name}\ntagger Test <test@example.com> 1700000000 +0000\n\n{name}\n"
        );
        self.insert(RawObject::new(ObjectKind::Tag, body.into_bytes()))
    }

    /// Point `name` at `oid`.
    pub fn set_ref(&self, name: &str, oid: &Oid) {
        self.lock().refs.insert(name.to_string(), oid.clone());
    }

    /// Make local HEAD symbolic to `target`, or detached/absent with `None`.
    pub fn set_head(&self, target: Option<&str>) {
        self.lock().head = target.map(str::to_string);
    }

    /// Drop an object, simulating a repository that lacks it.
    pub fn remove_object(&self, oid: &Oid) -> Option<RawObject> {
        self.lock().objects.remove(oid)
    }

    /// Number of stored objects.
    pub fn object_count(&self) -> usize {
        self.lock().objects.len()
    }

    /// Ids passed through `write_object`, in call order.
    pub fn written(&self) -> Vec<Oid> {
        self.lock().written.clone()
    }

    /// Every object reachable from `from` (inclusive) among stored objects.
    fn closure(
        inner: &MemoryGitInner,
        from: &Oid,
        seen: &mut HashSet<Oid>,
        out: &mut Vec<Oid>,
    ) -> Result<(), GitError> {
        let mut stack = vec![from.clone()];
        while let Some(oid) = stack.pop() {
            if !seen.insert(oid.clone()) {
                continue;
            }
            let object = inner.objects.get(&oid).ok_or_else(|| GitError::ObjectNotFound {
                oid: oid.to_string(),
            })?;
            out.push(oid.clone());
            let references = object
                .references(inner.hash)
                .map_err(|e| GitError::Internal {
                    message: e.to_string(),
                })?;
            stack.extend(references.into_iter().rev());
        }
        Ok(())
    }

    fn parents(inner: &MemoryGitInner, oid: &Oid) -> Result<Vec<Oid>, GitError> {
        let object = inner.objects.get(oid).ok_or_else(|| GitError::ObjectNotFound {
            oid: oid.to_string(),
        })?;
        match object.kind {
            ObjectKind::Commit => {
                let references = object
                    .references(inner.hash)
                    .map_err(|e| GitError::Internal {
                        message: e.to_string(),
                    })?;
                // The first reference of a commit is its tree
                Ok(references.into_iter().skip(1).collect())
            }
            _ => Ok(Vec::new()),
        }
    }
}

impl LocalGitBridge for MemoryGit {
    fn resolve_ref(&self, name: &str) -> Result<Option<Oid>, GitError> {
        let inner = self.lock();
        let name = if name == "HEAD" {
            match &inner.head {
                Some(target) => target.as_str(),
                None => return Ok(None),
            }
        } else {
            name
        };

        if let Some(oid) = inner.refs.get(name) {
            return Ok(Some(oid.clone()));
        }
        match Oid::new(name) {
            Ok(oid) if inner.objects.contains_key(&oid) => Ok(Some(oid)),
            _ => Ok(None),
        }
    }

    fn symbolic_head(&self) -> Result<Option<String>, GitError> {
        Ok(self.lock().head.clone())
    }

    fn object_exists(&self, oid: &Oid) -> Result<bool, GitError> {
        Ok(self.lock().objects.contains_key(oid))
    }

    fn read_object(&self, oid: &Oid) -> Result<RawObject, GitError> {
        self.lock()
            .objects
            .get(oid)
            .cloned()
            .ok_or_else(|| GitError::ObjectNotFound {
                oid: oid.to_string(),
            })
    }

    fn write_object(&self, object: &RawObject) -> Result<Oid, GitError> {
        let mut inner = self.lock();
        let oid = object.compute_oid(inner.hash);
        inner.objects.insert(oid.clone(), object.clone());
        inner.written.push(oid.clone());
        Ok(oid)
    }

    fn reachable_objects(&self, from: &Oid, excluding: &[Oid]) -> Result<Vec<Oid>, GitError> {
        let inner = self.lock();

        let mut seen = HashSet::new();
        let mut discard = Vec::new();
        for tip in excluding {
            if inner.objects.contains_key(tip) {
                Self::closure(&inner, tip, &mut seen, &mut discard)?;
            }
        }

        let mut out = Vec::new();
        Self::closure(&inner, from, &mut seen, &mut out)?;
        Ok(out)
    }

    fn is_ancestor(&self, ancestor: &Oid, descendant: &Oid) -> Result<bool, GitError> {
        let inner = self.lock();
        let mut seen = HashSet::new();
        let mut stack = vec![descendant.clone()];
        while let Some(oid) = stack.pop() {
            if &oid == ancestor {
                return Ok(true);
            }
            if seen.insert(oid.clone()) {
                stack.extend(Self::parents(&inner, &oid)?);
            }
        }
        Ok(false)
    }
}
