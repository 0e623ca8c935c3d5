//! git-remote-rclone - A git remote helper for rclone remotes
//!
//! git-remote-rclone lets `git push`, `git fetch` and `git clone` work
//! against any storage rclone can reach, using URLs of the form
//! `rclone://<rclone-remote>/<path>`. The remote holds an ordinary loose
//! object store and ref files; concurrent pushers are serialized with lock
//! files since the storage offers no compare-and-swap.
//!
//! # Architecture
//!
//! The codebase follows a strict layered architecture:
//!
//! - [`cli`] - Process entry (parses args, builds the session)
//! - [`protocol`] - The remote-helper line protocol and session loop
//! - [`remote`] - Synchronization engine: objects, refs, locks, push, fetch
//! - [`storage`] - Remote file storage backends (rclone, local, memory)
//! - [`git`] - Single interface for all local repository access
//! - [`core`] - Domain types, object encoding, paths, URL, configuration
//! - [`ui`] - Verbosity and stderr logging
//!
//! # Correctness Invariants
//!
//! git-remote-rclone maintains the following invariants:
//!
//! 1. A remote ref never points at an object whose closure is not uploaded
//! 2. Ref updates happen under a lock, after re-reading the current value
//! 3. Downloaded objects are verified against their id before git sees them
//! 4. stdout carries only protocol lines

pub mod cli;
pub mod core;
pub mod git;
pub mod protocol;
pub mod remote;
pub mod storage;
pub mod ui;
