//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! git runs the helper as `git-remote-rclone <remote-name> <url>`.

use clap::error::ErrorKind;
use clap::Parser;

/// Git remote helper storing repositories on rclone remotes
#[derive(Parser, Debug)]
#[command(name = "git-remote-rclone")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Name of the git remote (or the URL itself for anonymous remotes)
    pub remote_name: String,

    /// Remote URL, `rclone://<rclone-remote>/<path>`
    pub url: String,
}

impl Cli {
    /// Parse command-line arguments.
    ///
    /// Usage errors exit with status 1; `--help` and `--version` exit 0.
    pub fn parse_args() -> Self {
        Self::try_parse().unwrap_or_else(|e| {
            if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                e.exit();
            }
            let _ = e.print();
            std::process::exit(1);
        })
    }
}
