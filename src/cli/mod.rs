//! cli
//!
//! Process entry for the helper.
//!
//! # Responsibilities
//!
//! - Parse `<remote-name> <url>`
//! - Install logging, load configuration, open the local repository
//! - Build the storage backend and hand stdin/stdout to a session
//!
//! Everything past setup lives in [`crate::protocol`].

pub mod args;

pub use args::Cli;

use std::io;

use anyhow::{Context, Result};

use crate::core::config::Config;
use crate::core::url::RemoteUrl;
use crate::git::Git;
use crate::protocol::{HelperConfig, RemoteHelperSession};
use crate::storage::create_backend;
use crate::ui::output::{self, Verbosity};

/// Run the helper.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();
    let logs = output::init_logging(Verbosity::Normal);

    let url = RemoteUrl::parse(&cli.url)?;
    let git = Git::open_from_env().context("git-remote-rclone must be run by git")?;

    let loaded = Config::load(Some(git.git_dir())).context("failed to load configuration")?;
    let config = loaded.config;
    logs.set_verbosity(config.verbosity());

    tracing::debug!(
        remote = %cli.remote_name,
        url = %url,
        config = ?loaded.sources,
        "starting helper"
    );

    let backend = create_backend(&config, &url)
        .with_context(|| format!("cannot use storage for {url}"))?;
    let helper = HelperConfig::from_config(&config);

    let mut session = RemoteHelperSession::new(git, backend, url.layout(), &helper)?
        .on_verbosity(move |level| logs.set_verbosity(level));

    let stdin = io::stdin();
    let stdout = io::stdout();
    session.run(stdin.lock(), stdout.lock())?;
    Ok(())
}
