//! core::object
//!
//! Git object encoding, hashing, and reference parsing.
//!
//! # Format
//!
//! Objects travel to the remote as git loose objects: the zlib-compressed
//! bytes of `<kind> <len>\0<payload>`. The object id is the hash of that
//! uncompressed form, SHA-1 or SHA-256 depending on the repository.
//!
//! # References
//!
//! Fetch walks the object graph without a local copy of the objects, so
//! this module also extracts the ids an object points at:
//! - commit: its tree and parents
//! - tree: every entry except gitlinks (submodule commits live elsewhere)
//! - tag: its target
//! - blob: nothing
//!
//! # Example
//!
//! ```
//! use git_remote_rclone::core::object::RawObject;
//! use git_remote_rclone::core::types::{HashKind, ObjectKind};
//!
//! let blob = RawObject::new(ObjectKind::Blob, b"hello\n".to_vec());
//! let oid = blob.compute_oid(HashKind::Sha1);
//! assert_eq!(oid.as_str(), "ce013625030ba8dba906f756967f9e9ca394464a");
//!
//! let loose = blob.encode_loose().unwrap();
//! assert_eq!(RawObject::decode_loose(&loose).unwrap(), blob);
//! ```

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use sha1::{Digest, Sha1};
use sha2::Sha256;
use thiserror::Error;

use crate::core::types::{HashKind, ObjectKind, Oid};
use crate::storage::StorageError;

/// Tree entry mode of a submodule commit.
const GITLINK_MODE: &[u8] = b"160000";

/// Errors from object encoding, decoding, and storage.
#[derive(Debug, Error)]
pub enum ObjectError {
    /// The object is not stored.
    #[error("object not found: {oid}")]
    NotFound {
        /// The missing object id
        oid: String,
    },

    /// Stored bytes hash to a different id than requested.
    #[error("corrupt object: expected {expected}, content hashes to {actual}")]
    Corrupt {
        /// The id that was requested
        expected: String,
        /// The id the content actually has
        actual: String,
    },

    /// Bytes are not a well-formed git object.
    #[error("malformed object: {message}")]
    Malformed {
        /// What is wrong
        message: String,
    },

    /// Underlying storage failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ObjectError {
    fn malformed(message: impl Into<String>) -> Self {
        ObjectError::Malformed {
            message: message.into(),
        }
    }
}

/// An uncompressed git object: its kind and payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawObject {
    /// Object type
    pub kind: ObjectKind,
    /// Payload without the `<kind> <len>\0` header
    pub data: Vec<u8>,
}

impl RawObject {
    /// Create an object.
    pub fn new(kind: ObjectKind, data: Vec<u8>) -> Self {
        Self { kind, data }
    }

    /// The `<kind> <len>\0` header.
    pub fn header(&self) -> Vec<u8> {
        format!("{} {}\0", self.kind, self.data.len()).into_bytes()
    }

    /// Hash the object the way git does.
    pub fn compute_oid(&self, hash: HashKind) -> Oid {
        match hash {
            HashKind::Sha1 => {
                let mut hasher = Sha1::new();
                hasher.update(self.header());
                hasher.update(&self.data);
                Oid::from_digest(&hasher.finalize())
            }
            HashKind::Sha256 => {
                let mut hasher = Sha256::new();
                hasher.update(self.header());
                hasher.update(&self.data);
                Oid::from_digest(&hasher.finalize())
            }
        }
    }

    /// Check that this object hashes to `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectError::Corrupt`] on mismatch.
    pub fn verify(&self, expected: &Oid) -> Result<(), ObjectError> {
        let actual = self.compute_oid(expected.hash_kind());
        if &actual != expected {
            return Err(ObjectError::Corrupt {
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(())
    }

    /// Encode as a zlib-compressed loose object.
    pub fn encode_loose(&self) -> Result<Vec<u8>, ObjectError> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&self.header())
            .and_then(|_| encoder.write_all(&self.data))
            .map_err(|e| ObjectError::malformed(format!("compression failed: {e}")))?;
        encoder
            .finish()
            .map_err(|e| ObjectError::malformed(format!("compression failed: {e}")))
    }

    /// Decode a zlib-compressed loose object.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectError::Malformed`] if the bytes do not inflate, the
    /// header is unreadable, or the declared length is wrong.
    pub fn decode_loose(bytes: &[u8]) -> Result<Self, ObjectError> {
        let mut raw = Vec::new();
        ZlibDecoder::new(bytes)
            .read_to_end(&mut raw)
            .map_err(|e| ObjectError::malformed(format!("inflate failed: {e}")))?;

        let nul = raw
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| ObjectError::malformed("missing header terminator"))?;
        let header = std::str::from_utf8(&raw[..nul])
            .map_err(|_| ObjectError::malformed("header is not UTF-8"))?;
        let (kind, len) = header
            .split_once(' ')
            .ok_or_else(|| ObjectError::malformed(format!("bad header '{header}'")))?;

        let kind = ObjectKind::parse(kind).map_err(|e| ObjectError::malformed(e.to_string()))?;
        let len: usize = len
            .parse()
            .map_err(|_| ObjectError::malformed(format!("bad length in header '{header}'")))?;

        let data = raw.split_off(nul + 1);
        if data.len() != len {
            return Err(ObjectError::malformed(format!(
                "header declares {len} bytes, payload has {}",
                data.len()
            )));
        }

        Ok(Self { kind, data })
    }

    /// Ids this object points at.
    ///
    /// `hash` determines the width of the binary ids inside trees.
    pub fn references(&self, hash: HashKind) -> Result<Vec<Oid>, ObjectError> {
        match self.kind {
            ObjectKind::Blob => Ok(Vec::new()),
            ObjectKind::Commit => header_ids(&self.data, &["tree", "parent"]),
            ObjectKind::Tag => header_ids(&self.data, &["object"]),
            ObjectKind::Tree => tree_ids(&self.data, hash),
        }
    }
}

/// Collect ids from `<key> <hex>` header lines (commits and tags).
fn header_ids(data: &[u8], keys: &[&str]) -> Result<Vec<Oid>, ObjectError> {
    let mut ids = Vec::new();
    for line in data.split(|&b| b == b'\n') {
        // Headers end at the first blank line
        if line.is_empty() {
            break;
        }
        let Some(space) = line.iter().position(|&b| b == b' ') else {
            continue;
        };
        let (key, value) = (&line[..space], &line[space + 1..]);
        if keys.iter().any(|k| k.as_bytes() == key) {
            let hex = std::str::from_utf8(value)
                .map_err(|_| ObjectError::malformed("non-UTF-8 object id"))?;
            let oid = Oid::new(hex).map_err(|e| ObjectError::malformed(e.to_string()))?;
            ids.push(oid);
        }
    }
    Ok(ids)
}

/// Collect ids from tree entries (`<mode> <name>\0<raw id>`).
fn tree_ids(data: &[u8], hash: HashKind) -> Result<Vec<Oid>, ObjectError> {
    let width = hash.raw_len();
    let mut ids = Vec::new();
    let mut rest = data;

    while !rest.is_empty() {
        let space = rest
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| ObjectError::malformed("tree entry without mode"))?;
        let mode = &rest[..space];
        let nul = rest[space..]
            .iter()
            .position(|&b| b == 0)
            .map(|p| p + space)
            .ok_or_else(|| ObjectError::malformed("tree entry without name terminator"))?;

        let id_end = nul + 1 + width;
        if rest.len() < id_end {
            return Err(ObjectError::malformed("truncated tree entry"));
        }

        if mode != GITLINK_MODE {
            let oid = Oid::from_raw(&rest[nul + 1..id_end])
                .map_err(|e| ObjectError::malformed(e.to_string()))?;
            ids.push(oid);
        }
        rest = &rest[id_end..];
    }

    Ok(ids)
}
