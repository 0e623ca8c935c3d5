//! storage::rclone
//!
//! Storage backend that drives the `rclone` command-line tool.
//!
//! # Design
//!
//! Each operation spawns one rclone process against `remote:path`. Content
//! moves over stdin/stdout (`rcat` / `cat`) so nothing is staged on local
//! disk. Listings use `lsjson`, whose JSON output is parsed with serde.
//!
//! # Error Classification
//!
//! rclone reports failures through its exit status:
//! - 3 (directory not found) and 4 (file not found) map to
//!   [`StorageError::NotFound`]
//! - 1 (syntax or usage error) maps to [`StorageError::Command`]
//! - Everything else (2 uncategorized, 5 temporary, 6/7/8/9 transfer
//!   limits) maps to the retryable [`StorageError::Transport`]
//!
//! Some backends report a missing file with a generic status and a
//! "not found" message, so stderr is checked as a fallback.
//!
//! # CreateOnly
//!
//! rclone has no conditional put. A create-only write probes first and
//! then uploads, which leaves a window between the two. Callers that need
//! mutual exclusion (locks) read the result back to confirm ownership.

use std::io::Write;
use std::process::{Command, Output, Stdio};
use std::time::Duration;

use serde::Deserialize;

use super::traits::{Entry, StorageBackend, StorageError, WriteMode};

/// rclone exit status for "directory not found".
const EXIT_DIR_NOT_FOUND: i32 = 3;
/// rclone exit status for "file not found".
const EXIT_FILE_NOT_FOUND: i32 = 4;
/// rclone exit status for usage errors.
const EXIT_USAGE: i32 = 1;

/// One record of `rclone lsjson` output.
#[derive(Debug, Deserialize)]
struct LsJsonItem {
    #[serde(rename = "Path")]
    path: String,
    #[serde(rename = "Size", default)]
    size: i64,
    #[serde(rename = "IsDir", default)]
    is_dir: bool,
}

/// Storage backend backed by an rclone remote.
///
/// # Example
///
/// ```no_run
/// use git_remote_rclone::storage::{RcloneBackend, StorageBackend};
/// use std::time::Duration;
///
/// let backend = RcloneBackend::new("gdrive", "rclone", Duration::from_secs(60));
/// let head = backend.read("backups/project.git/HEAD")?;
/// # Ok::<(), git_remote_rclone::storage::StorageError>(())
/// ```
#[derive(Debug, Clone)]
pub struct RcloneBackend {
    remote: String,
    binary: String,
    timeout: Duration,
}

impl RcloneBackend {
    /// Create a backend for the rclone remote alias `remote`.
    pub fn new(remote: impl Into<String>, binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            remote: remote.into(),
            binary: binary.into(),
            timeout,
        }
    }

    /// The remote alias.
    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// `remote:path` as rclone expects it.
    fn target(&self, path: &str) -> String {
        format!("{}:{}", self.remote, path.trim_start_matches('/'))
    }

    /// Run rclone with `args`, feeding `input` on stdin if given.
    fn run(
        &self,
        args: &[&str],
        input: Option<&[u8]>,
        path: &str,
    ) -> Result<Vec<u8>, StorageError> {
        let timeout = format!("{}s", self.timeout.as_secs().max(1));
        let mut cmd = Command::new(&self.binary);
        cmd.args(["--contimeout", timeout.as_str(), "--timeout", timeout.as_str()])
            .args(args)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        tracing::debug!(binary = %self.binary, ?args, "running rclone");

        let mut child = cmd.spawn().map_err(|e| {
            StorageError::Command(format!("failed to run '{}': {}", self.binary, e))
        })?;

        let stdin = child.stdin.take();
        let output = std::thread::scope(|scope| {
            if let (Some(mut stdin), Some(data)) = (stdin, input) {
                // Dropping stdin at the end of the thread signals EOF
                let _writer = scope.spawn(move || stdin.write_all(data));
            }
            child.wait_with_output()
        })
        .map_err(|e| StorageError::Io {
            path: path.to_string(),
            source: e,
        })?;

        tracing::trace!(
            status = ?output.status.code(),
            stdout_len = output.stdout.len(),
            stderr_len = output.stderr.len(),
            "rclone finished"
        );

        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(classify_failure(&output, path))
        }
    }
}

/// Map a failed rclone invocation to a storage error.
fn classify_failure(output: &Output, path: &str) -> StorageError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let message = stderr.trim().to_string();
    classify(output.status.code(), &message, path)
}

fn classify(code: Option<i32>, stderr: &str, path: &str) -> StorageError {
    match code {
        Some(EXIT_DIR_NOT_FOUND) | Some(EXIT_FILE_NOT_FOUND) => StorageError::NotFound {
            path: path.to_string(),
        },
        _ if stderr.to_ascii_lowercase().contains("not found") => StorageError::NotFound {
            path: path.to_string(),
        },
        Some(EXIT_USAGE) => StorageError::Command(format!("rclone: {stderr}")),
        Some(code) => StorageError::Transport(format!("rclone exited with {code}: {stderr}")),
        None => StorageError::Transport(format!("rclone terminated by signal: {stderr}")),
    }
}

fn parse_listing(stdout: &[u8], path: &str) -> Result<Vec<LsJsonItem>, StorageError> {
    serde_json::from_slice(stdout).map_err(|e| {
        StorageError::Transport(format!("unparseable rclone listing of {path}: {e}"))
    })
}

impl StorageBackend for RcloneBackend {
    fn mkdir(&self, path: &str) -> Result<(), StorageError> {
        self.run(&["mkdir", self.target(path).as_str()], None, path)?;
        Ok(())
    }

    fn list(&self, path: &str, recursive: bool) -> Result<Vec<Entry>, StorageError> {
        let target = self.target(path);
        let mut args = vec!["lsjson", "--files-only", "--no-mimetype", "--no-modtime"];
        if recursive {
            args.push("--recursive");
        }
        args.push(target.as_str());

        let stdout = self.run(&args, None, path)?;
        let items = parse_listing(&stdout, path)?;
        Ok(items
            .into_iter()
            .filter(|item| !item.is_dir)
            .map(|item| Entry {
                path: item.path,
                size: item.size.max(0) as u64,
            })
            .collect())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        self.run(&["cat", self.target(path).as_str()], None, path)
    }

    fn write(&self, path: &str, data: &[u8], mode: WriteMode) -> Result<(), StorageError> {
        if mode == WriteMode::CreateOnly && self.exists(path)? {
            return Err(StorageError::AlreadyExists {
                path: path.to_string(),
            });
        }
        self.run(&["rcat", self.target(path).as_str()], Some(data), path)?;
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<(), StorageError> {
        self.run(&["deletefile", self.target(path).as_str()], None, path)?;
        Ok(())
    }

    fn purge(&self, path: &str) -> Result<(), StorageError> {
        self.run(&["purge", self.target(path).as_str()], None, path)?;
        Ok(())
    }

    fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let stdout = match self.run(
            &["lsjson", "--stat", "--no-mimetype", "--no-modtime", self.target(path).as_str()],
            None,
            path,
        ) {
            Ok(stdout) => stdout,
            Err(StorageError::NotFound { .. }) => return Ok(false),
            Err(e) => return Err(e),
        };

        // --stat prints a single object for the path itself
        let item: LsJsonItem = serde_json::from_slice(&stdout).map_err(|e| {
            StorageError::Transport(format!("unparseable rclone stat of {path}: {e}"))
        })?;
        Ok(!item.is_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_joins_remote_and_path() {
        let backend = RcloneBackend::new("gdrive", "rclone", Duration::from_secs(5));
        assert_eq!(backend.target("repo/HEAD"), "gdrive:repo/HEAD");
        assert_eq!(backend.target("/repo"), "gdrive:repo");
        assert_eq!(backend.target(""), "gdrive:");
    }

    #[test]
    fn classify_exit_codes() {
        assert!(classify(Some(3), "", "p").is_not_found());
        assert!(classify(Some(4), "", "p").is_not_found());
        assert!(matches!(classify(Some(1), "bad flag", "p"), StorageError::Command(_)));
        assert!(classify(Some(5), "temporary", "p").is_retryable());
        assert!(classify(Some(2), "oops", "p").is_retryable());
        assert!(classify(None, "", "p").is_retryable());
    }

    #[test]
    fn classify_not_found_message_fallback() {
        let err = classify(Some(2), "ERROR : object not found", "p");
        assert!(err.is_not_found());
    }

    #[test]
    fn parse_lsjson_output() {
        let json = br#"[
            {"Path":"heads/main","Name":"main","Size":41,"IsDir":false},
            {"Path":"heads","Name":"heads","Size":-1,"IsDir":true}
        ]"#;
        let items = parse_listing(json, "refs").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].path, "heads/main");
        assert_eq!(items[0].size, 41);
        assert!(items[1].is_dir);
    }

    #[test]
    fn garbage_listing_is_transport_error() {
        assert!(parse_listing(b"not json", "refs").unwrap_err().is_retryable());
    }

    #[test]
    fn missing_binary_is_command_error() {
        let backend = RcloneBackend::new(
            "remote",
            "/nonexistent/rclone-binary-for-tests",
            Duration::from_secs(1),
        );
        let err = backend.read("x").unwrap_err();
        assert!(matches!(err, StorageError::Command(_)));
        assert!(!err.is_retryable());
    }
}
