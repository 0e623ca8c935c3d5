//! core::url
//!
//! Parsing of `rclone://<remote-alias>/<repo-path>` remote URLs.
//!
//! git passes the URL configured for the remote as the helper's second
//! argument. The authority names the rclone remote (as listed by
//! `rclone listremotes`, without the trailing colon); the path is the
//! repository prefix inside that remote.

use thiserror::Error;

use crate::core::paths::RemoteLayout;

/// URL scheme handled by this helper.
pub const SCHEME: &str = "rclone";

/// Errors from URL parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UrlError {
    #[error("URL must start with the \"rclone://\" scheme: {0}")]
    WrongScheme(String),

    #[error("rclone URL must be of the form \"rclone://remote_name/path\": {0}")]
    MissingRemote(String),
}

/// A parsed remote URL.
///
/// # Example
///
/// ```
/// use git_remote_rclone::core::url::RemoteUrl;
///
/// let url = RemoteUrl::parse("rclone://gdrive/backups/project.git").unwrap();
/// assert_eq!(url.remote(), "gdrive");
/// assert_eq!(url.path(), "backups/project.git");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUrl {
    remote: String,
    path: String,
}

impl RemoteUrl {
    /// Parse a helper URL.
    ///
    /// # Errors
    ///
    /// - [`UrlError::WrongScheme`] if the scheme is not `rclone`
    /// - [`UrlError::MissingRemote`] if the remote alias is empty
    pub fn parse(url: &str) -> Result<Self, UrlError> {
        let rest = url
            .strip_prefix(SCHEME)
            .and_then(|r| r.strip_prefix("://"))
            .ok_or_else(|| UrlError::WrongScheme(url.to_string()))?;

        let (remote, path) = match rest.split_once('/') {
            Some((remote, path)) => (remote, path),
            None => (rest, ""),
        };

        if remote.is_empty() {
            return Err(UrlError::MissingRemote(url.to_string()));
        }

        Ok(Self {
            remote: remote.to_string(),
            path: path.trim_matches('/').to_string(),
        })
    }

    /// The rclone remote alias.
    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// Repository prefix inside the remote (no leading or trailing `/`).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path routing for this repository.
    pub fn layout(&self) -> RemoteLayout {
        RemoteLayout::new(&self.path)
    }
}

impl std::fmt::Display for RemoteUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}/{}", SCHEME, self.remote, self.path)
    }
}
