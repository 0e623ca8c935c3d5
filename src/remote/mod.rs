//! remote
//!
//! The synchronization engine: a git repository laid out as plain files on
//! a storage backend.
//!
//! # Modules
//!
//! - [`objects`] - content-addressed loose objects, verified on read
//! - [`refs`] - ref files and the symbolic `HEAD`
//! - [`lock`] - advisory lock records serializing ref updates
//! - [`planner`] - which objects must move for a push or fetch
//! - [`push`] - validate, upload, lock, verify, write, release
//! - [`fetch`] - download closures into the local repository
//! - [`error`] - the [`SyncError`] taxonomy reported to git
//!
//! # Invariants
//!
//! - Objects are uploaded before any ref that reaches them is written
//! - Every ref write happens under that ref's lock, after re-reading the
//!   ref's current value
//! - Object files are never overwritten or deleted

pub mod error;
pub mod fetch;
pub mod lock;
pub mod objects;
pub mod planner;
pub mod push;
pub mod refs;

pub use error::SyncError;
pub use fetch::{FetchEngine, FetchSummary};
pub use lock::{LockConfig, LockError, LockGuard, LockManager, LockRecord, LockScope};
pub use objects::ObjectStore;
pub use planner::{TransferPlan, TransferPlanner};
pub use push::{PushEngine, PushRequest, PushSummary};
pub use refs::{Ref, RefError, RefListing, RefStore};
