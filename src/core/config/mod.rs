//! core::config
//!
//! Configuration schema and loading.
//!
//! # Overview
//!
//! The helper has two configuration scopes:
//! - **Global**: User-level settings (which backend, timeouts, lock tuning)
//! - **Repo**: Overrides for one local repository
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Global config file
//! 3. Repo config file
//! 4. Protocol options sent by git (`option verbosity`, not handled here)
//!
//! # Global Config Locations
//!
//! Searched in order:
//! 1. `$GIT_REMOTE_RCLONE_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/git-remote-rclone/config.toml`
//! 3. `~/.config/git-remote-rclone/config.toml`
//!
//! # Repo Config Location
//!
//! `<git-dir>/rclone-remote/config.toml`
//!
//! # Example
//!
//! ```no_run
//! use git_remote_rclone::core::config::Config;
//! use std::path::Path;
//!
//! let result = Config::load(Some(Path::new("/path/to/repo/.git"))).unwrap();
//! let config = result.config;
//!
//! println!("backend: {}", config.backend());
//! println!("jobs: {}", config.transfer_jobs());
//! ```

pub mod schema;

pub use schema::{ConfigFile, LockSection, StorageSection, TransferSection};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::remote::lock::{LockConfig, LockScope};
use crate::storage::BackendKind;

/// Environment variable naming an explicit global config file.
pub const CONFIG_ENV: &str = "GIT_REMOTE_RCLONE_CONFIG";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Result of loading configuration.
#[derive(Debug)]
pub struct ConfigLoadResult {
    /// The loaded configuration.
    pub config: Config,
    /// Files that were read, in precedence order.
    pub sources: Vec<PathBuf>,
}

/// Merged configuration from all sources.
///
/// This struct provides accessor methods that apply precedence rules
/// automatically. Repo config overrides global config key by key.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Global configuration
    pub global: ConfigFile,
    /// Repository configuration (if present)
    pub repo: Option<ConfigFile>,
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// If `git_dir` is provided, also loads the repository override file.
    ///
    /// # Errors
    ///
    /// Returns an error if config files exist but cannot be parsed or
    /// contain invalid values. Missing files are not an error.
    pub fn load(git_dir: Option<&Path>) -> Result<ConfigLoadResult, ConfigError> {
        let global_path = Self::find_global();
        Self::load_from(global_path.as_deref(), git_dir)
    }

    /// Load configuration from an explicit global file and git directory.
    pub fn load_from(
        global_path: Option<&Path>,
        git_dir: Option<&Path>,
    ) -> Result<ConfigLoadResult, ConfigError> {
        let mut sources = Vec::new();

        let global = match global_path {
            Some(path) if path.exists() => {
                sources.push(path.to_path_buf());
                Self::read_file(path)?
            }
            _ => ConfigFile::default(),
        };

        let repo = match git_dir.map(Self::repo_config_path) {
            Some(path) if path.exists() => {
                let file = Self::read_file(&path)?;
                sources.push(path);
                Some(file)
            }
            _ => None,
        };

        global.validate()?;
        if let Some(ref r) = repo {
            r.validate()?;
        }

        let config = Config { global, repo };
        if config.backend() == BackendKind::Local && config.local_root().is_none() {
            return Err(ConfigError::InvalidValue(
                "storage.local_root is required when storage.backend = \"local\"".to_string(),
            ));
        }

        Ok(ConfigLoadResult { config, sources })
    }

    /// Locate the global config file, if any.
    fn find_global() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }

        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("git-remote-rclone/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        dirs::home_dir().map(|home| home.join(".config/git-remote-rclone/config.toml"))
    }

    /// Get the canonical path for repo config.
    pub fn repo_config_path(git_dir: &Path) -> PathBuf {
        git_dir.join("rclone-remote/config.toml")
    }

    /// Read and parse a config file.
    fn read_file(path: &Path) -> Result<ConfigFile, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Pick a value from the repo scope, falling back to the global scope.
    fn pick<T, F>(&self, get: F) -> Option<T>
    where
        F: Fn(&ConfigFile) -> Option<T>,
    {
        self.repo.as_ref().and_then(&get).or_else(|| get(&self.global))
    }

    // =========================================================================
    // Accessor methods with precedence
    // =========================================================================

    /// Initial verbosity before git sends `option verbosity`.
    ///
    /// Defaults to 1 (git's normal level).
    pub fn verbosity(&self) -> u8 {
        self.pick(|f| f.verbosity).unwrap_or(1)
    }

    /// Storage backend implementation.
    ///
    /// Defaults to the rclone process adapter.
    pub fn backend(&self) -> BackendKind {
        match self
            .pick(|f| f.storage.as_ref().and_then(|s| s.backend.clone()))
            .as_deref()
        {
            Some("local") => BackendKind::Local,
            _ => BackendKind::Rclone,
        }
    }

    /// The rclone executable. Defaults to `rclone` on `PATH`.
    pub fn rclone_binary(&self) -> String {
        self.pick(|f| f.storage.as_ref().and_then(|s| s.rclone_binary.clone()))
            .unwrap_or_else(|| "rclone".to_string())
    }

    /// Root directory for the local backend.
    pub fn local_root(&self) -> Option<PathBuf> {
        self.pick(|f| f.storage.as_ref().and_then(|s| s.local_root.clone()))
    }

    /// Timeout for one storage operation. Defaults to 60 seconds.
    pub fn storage_timeout(&self) -> Duration {
        Duration::from_secs(
            self.pick(|f| f.storage.as_ref().and_then(|s| s.timeout_secs))
                .unwrap_or(60),
        )
    }

    /// Attempts for transient storage failures. Defaults to 3.
    pub fn storage_retries(&self) -> u32 {
        self.pick(|f| f.storage.as_ref().and_then(|s| s.retries))
            .unwrap_or(3)
    }

    /// Initial backoff between storage attempts. Defaults to 250ms.
    pub fn storage_retry_backoff(&self) -> Duration {
        Duration::from_millis(
            self.pick(|f| f.storage.as_ref().and_then(|s| s.retry_backoff_ms))
                .unwrap_or(250),
        )
    }

    /// Lock granularity. Defaults to one lock per ref.
    pub fn lock_scope(&self) -> LockScope {
        match self
            .pick(|f| f.lock.as_ref().and_then(|l| l.scope.clone()))
            .as_deref()
        {
            Some("repository") => LockScope::Repository,
            _ => LockScope::Ref,
        }
    }

    /// Lock timing parameters, with defaults from [`LockConfig::default`].
    pub fn lock_config(&self) -> LockConfig {
        let defaults = LockConfig::default();
        let lock = |get: fn(&LockSection) -> Option<u64>| {
            self.pick(|f| f.lock.as_ref().and_then(get))
        };

        LockConfig {
            scope: self.lock_scope(),
            stale_after: lock(|l| l.stale_after_secs)
                .map(Duration::from_secs)
                .unwrap_or(defaults.stale_after),
            max_attempts: self
                .pick(|f| f.lock.as_ref().and_then(|l| l.max_attempts))
                .unwrap_or(defaults.max_attempts),
            initial_backoff: lock(|l| l.initial_backoff_ms)
                .map(Duration::from_millis)
                .unwrap_or(defaults.initial_backoff),
            max_backoff: lock(|l| l.max_backoff_ms)
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_backoff),
        }
    }

    /// Worker pool size for transfers. Defaults to 8.
    pub fn transfer_jobs(&self) -> usize {
        self.pick(|f| f.transfer.as_ref().and_then(|t| t.jobs))
            .unwrap_or(8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn load_empty_defaults() {
        let temp = TempDir::new().unwrap();
        let result =
            Config::load_from(Some(&temp.path().join("missing.toml")), Some(temp.path())).unwrap();
        let config = result.config;

        assert!(result.sources.is_empty());
        assert_eq!(config.verbosity(), 1);
        assert_eq!(config.backend(), BackendKind::Rclone);
        assert_eq!(config.rclone_binary(), "rclone");
        assert_eq!(config.storage_retries(), 3);
        assert_eq!(config.lock_scope(), LockScope::Ref);
        assert_eq!(config.transfer_jobs(), 8);
        assert_eq!(config.lock_config(), LockConfig::default());
    }

    #[test]
    fn load_global_file() {
        let temp = TempDir::new().unwrap();
        let global = temp.path().join("config.toml");
        write(
            &global,
            r#"
            [storage]
            rclone_binary = "/opt/rclone"
            timeout_secs = 5

            [lock]
            stale_after_secs = 42
            "#,
        );

        let result = Config::load_from(Some(&global), None).unwrap();
        let config = result.config;

        assert_eq!(result.sources, vec![global]);
        assert_eq!(config.rclone_binary(), "/opt/rclone");
        assert_eq!(config.storage_timeout(), Duration::from_secs(5));
        assert_eq!(config.lock_config().stale_after, Duration::from_secs(42));
    }

    #[test]
    fn repo_overrides_global_key_by_key() {
        let temp = TempDir::new().unwrap();
        let global = temp.path().join("global.toml");
        write(
            &global,
            r#"
            [transfer]
            jobs = 2

            [lock]
            scope = "repository"
            max_attempts = 7
            "#,
        );
        let git_dir = temp.path().join("repo/.git");
        write(
            &Config::repo_config_path(&git_dir),
            r#"
            [lock]
            max_attempts = 3
            "#,
        );

        let config = Config::load_from(Some(&global), Some(&git_dir))
            .unwrap()
            .config;

        assert_eq!(config.transfer_jobs(), 2);
        assert_eq!(config.lock_config().max_attempts, 3);
        // Not overridden in the repo file, so the global value wins
        assert_eq!(config.lock_scope(), LockScope::Repository);
    }

    #[test]
    fn local_backend_requires_root() {
        let temp = TempDir::new().unwrap();
        let global = temp.path().join("config.toml");
        write(&global, "[storage]\nbackend = \"local\"");

        let result = Config::load_from(Some(&global), None);
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn local_backend_with_root() {
        let temp = TempDir::new().unwrap();
        let global = temp.path().join("config.toml");
        write(
            &global,
            "[storage]\nbackend = \"local\"\nlocal_root = \"/srv/remotes\"",
        );

        let config = Config::load_from(Some(&global), None).unwrap().config;
        assert_eq!(config.backend(), BackendKind::Local);
        assert_eq!(config.local_root(), Some(PathBuf::from("/srv/remotes")));
    }

    #[test]
    fn parse_error_reports_path() {
        let temp = TempDir::new().unwrap();
        let global = temp.path().join("config.toml");
        write(&global, "verbosity = \"loud\"");

        let err = Config::load_from(Some(&global), None).unwrap_err();
        assert!(err.to_string().contains("config.toml"));
    }
}
