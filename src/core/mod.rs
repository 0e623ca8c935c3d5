//! core
//!
//! Core domain types, configuration, and remote path routing.
//!
//! # Modules
//!
//! - [`types`] - Strong types: Oid, RefName, ObjectKind, etc.
//! - [`object`] - Git object encoding, hashing, and reference parsing
//! - [`paths`] - Centralized path routing for the remote layout
//! - [`url`] - `rclone://` URL parsing
//! - [`config`] - Configuration schema and loading
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Schemas are strict and self-describing
//! - No module outside [`paths`] formats remote paths

pub mod config;
pub mod object;
pub mod paths;
pub mod types;
pub mod url;
