//! ui::output
//!
//! Diagnostic output on stderr.
//!
//! # Design
//!
//! stdout belongs to the remote-helper protocol, so everything meant for
//! the user is a `tracing` event rendered on stderr. git's verbosity level
//! selects the filter; it can change mid-session (`option verbosity`), so
//! the filter sits behind a reload handle. An explicit `RUST_LOG` pins the
//! filter and wins over git.

use std::fmt::Display;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

/// Output verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// `git -q`: errors only
    Quiet,
    /// Default: progress and warnings
    Normal,
    /// `git -v`: per-ref and per-batch detail
    Verbose,
    /// `git -vv` and beyond: protocol and storage traffic
    Debug,
}

impl Verbosity {
    /// Map git's numeric verbosity.
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => Verbosity::Quiet,
            1 => Verbosity::Normal,
            2 => Verbosity::Verbose,
            _ => Verbosity::Debug,
        }
    }

    /// `tracing-subscriber` filter directive for this level.
    pub fn directive(self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "warn,git_remote_rclone=info",
            Verbosity::Verbose => "info,git_remote_rclone=debug",
            Verbosity::Debug => "debug,git_remote_rclone=trace",
        }
    }

    /// Build the filter for this level.
    pub fn filter(self) -> EnvFilter {
        EnvFilter::new(self.directive())
    }
}

/// Handle for changing the log filter after installation.
#[derive(Clone)]
pub struct LogHandle {
    handle: reload::Handle<EnvFilter, Registry>,
    pinned: bool,
}

impl LogHandle {
    /// Apply git's verbosity level, unless `RUST_LOG` pinned the filter.
    pub fn set_verbosity(&self, level: u8) {
        if self.pinned {
            return;
        }
        if let Err(e) = self.handle.reload(Verbosity::from_level(level).filter()) {
            error(format!("failed to change log level: {e}"));
        }
    }
}

/// Install the stderr subscriber.
///
/// Installing twice keeps the first subscriber; the returned handle then
/// controls a filter nobody listens to.
pub fn init_logging(initial: Verbosity) -> LogHandle {
    let from_env = EnvFilter::try_from_default_env().ok();
    let pinned = from_env.is_some();
    let (filter, handle) = reload::Layer::new(from_env.unwrap_or_else(|| initial.filter()));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .try_init();

    LogHandle { handle, pinned }
}

/// Print an error message (always shown).
pub fn error(message: impl Display) {
    eprintln!("error: {}", message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_levels_map_to_verbosity() {
        assert_eq!(Verbosity::from_level(0), Verbosity::Quiet);
        assert_eq!(Verbosity::from_level(1), Verbosity::Normal);
        assert_eq!(Verbosity::from_level(2), Verbosity::Verbose);
        assert_eq!(Verbosity::from_level(3), Verbosity::Debug);
        assert_eq!(Verbosity::from_level(9), Verbosity::Debug);
    }

    #[test]
    fn directives_parse() {
        for level in 0..4 {
            let directive = Verbosity::from_level(level).directive();
            assert!(EnvFilter::try_new(directive).is_ok(), "{directive}");
        }
    }
}
