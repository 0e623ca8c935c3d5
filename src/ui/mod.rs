//! ui
//!
//! User-facing output.
//!
//! # Modules
//!
//! - [`output`] - Verbosity levels and stderr logging
//!
//! # Design
//!
//! The helper has no interactive surface: git owns the terminal and stdout
//! carries protocol lines. All user-facing text goes through this module to
//! stderr.

pub mod output;
