//! remote::objects
//!
//! Content-addressed object storage on the remote.
//!
//! # Invariants
//!
//! - Objects are only ever created, never overwritten: identical ids imply
//!   identical bytes, so an existing object is a successful write
//! - Every read is rehashed against the requested id; a mismatch is
//!   [`ObjectError::Corrupt`] and is never passed on

use std::sync::Arc;

use crate::core::object::{ObjectError, RawObject};
use crate::core::paths::RemoteLayout;
use crate::core::types::Oid;
use crate::storage::{StorageBackend, StorageError, WriteMode};

/// Object store over a storage backend.
#[derive(Clone)]
pub struct ObjectStore {
    backend: Arc<dyn StorageBackend>,
    layout: RemoteLayout,
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore")
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl ObjectStore {
    /// Create a store for the repository at `layout`.
    pub fn new(backend: Arc<dyn StorageBackend>, layout: RemoteLayout) -> Self {
        Self { backend, layout }
    }

    /// Whether the remote holds `oid`.
    pub fn exists(&self, oid: &Oid) -> Result<bool, ObjectError> {
        Ok(self.backend.exists(&self.layout.object_path(oid))?)
    }

    /// Download, decode and verify an object.
    ///
    /// # Errors
    ///
    /// - [`ObjectError::NotFound`] if the remote lacks the object
    /// - [`ObjectError::Corrupt`] if the content does not hash to `oid`
    /// - [`ObjectError::Malformed`] if the bytes are not a loose object
    pub fn read(&self, oid: &Oid) -> Result<RawObject, ObjectError> {
        let bytes = match self.backend.read(&self.layout.object_path(oid)) {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound { .. }) => {
                return Err(ObjectError::NotFound {
                    oid: oid.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let object = RawObject::decode_loose(&bytes)?;
        object.verify(oid)?;
        tracing::trace!(
            oid = %oid,
            kind = %object.kind,
            size = object.data.len(),
            "downloaded object"
        );
        Ok(object)
    }

    /// Upload an object.
    ///
    /// Returns `false` if the object was already present.
    pub fn write(&self, oid: &Oid, object: &RawObject) -> Result<bool, ObjectError> {
        let bytes = object.encode_loose()?;
        match self
            .backend
            .write(&self.layout.object_path(oid), &bytes, WriteMode::CreateOnly)
        {
            Ok(()) => {
                tracing::trace!(oid = %oid, kind = %object.kind, "uploaded object");
                Ok(true)
            }
            Err(StorageError::AlreadyExists { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
