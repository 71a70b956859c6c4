//! Version tokens and the files that hold them.
//!
//! A version file holds a single whitespace-delimited token. Tokens are
//! opaque: two installs are at the same release exactly when their tokens
//! are byte-for-byte equal. No ordering is implied, so a "downgrade" on the
//! remote side is still treated as an update.

use std::fmt;
use std::path::Path;

use crate::{Result, UpdateError};

/// Opaque release identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VersionToken(String);

impl VersionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Take the first whitespace-delimited token of `content`.
    ///
    /// Anything after it is ignored. Content without a token yields the
    /// empty token, which is valid and only equal to another empty token.
    pub fn parse(content: &str) -> Self {
        Self(content.split_whitespace().next().unwrap_or_default().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read the version token stored at `path`.
pub fn read_version(path: &Path) -> Result<VersionToken> {
    let bytes = std::fs::read(path).map_err(|source| UpdateError::FileUnreadable {
        path: path.to_path_buf(),
        source,
    })?;

    let token = VersionToken::parse(&String::from_utf8_lossy(&bytes));
    log::debug!("Read version '{}' from {}", token, path.display());
    Ok(token)
}

/// Outcome of comparing the installed token with the published one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateDecision {
    UpToDate,
    NewVersion(VersionToken),
}

impl UpdateDecision {
    pub fn between(local: &VersionToken, remote: VersionToken) -> Self {
        if *local == remote {
            UpdateDecision::UpToDate
        } else {
            UpdateDecision::NewVersion(remote)
        }
    }
}
