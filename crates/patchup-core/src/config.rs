//! Updater configuration (`patchup.toml`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::http::{HttpClientConfig, DEFAULT_USER_AGENT};
use crate::platform::Platform;
use crate::{Result, UpdateError};

pub const CONFIG_FILE_NAME: &str = "patchup.toml";

const DEFAULT_RELEASE_BASE: &str = "https://raw.githubusercontent.com/TA-Remake/release/main";

/// Where releases are published and how the local install is laid out.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpdaterConfig {
    /// URL of the published version token
    pub version_url: String,

    /// Bundle URL per platform key (`windows`, `linux`, `macos`)
    pub bundle_urls: BTreeMap<String, String>,

    /// Local version file, relative to the install directory
    pub version_file: PathBuf,

    /// Staging directory for downloads, relative to the install directory
    pub scratch_dir: PathBuf,

    /// Validate server certificates
    pub verify_tls: bool,

    pub user_agent: String,

    pub proxy: Option<String>,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        let bundle_urls = [
            ("windows", format!("{}/windows.zip", DEFAULT_RELEASE_BASE)),
            ("linux", format!("{}/linux.zip", DEFAULT_RELEASE_BASE)),
        ]
        .into_iter()
        .map(|(platform, url)| (platform.to_string(), url))
        .collect();

        Self {
            version_url: format!("{}/version", DEFAULT_RELEASE_BASE),
            bundle_urls,
            version_file: PathBuf::from("version"),
            scratch_dir: PathBuf::from("update"),
            verify_tls: false,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            proxy: None,
        }
    }
}

impl UpdaterConfig {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, `patchup.toml` in the
    /// install directory is used when present, and defaults otherwise.
    pub fn load(explicit: Option<&Path>, install_dir: &Path) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let candidate = install_dir.join(CONFIG_FILE_NAME);
                if !candidate.is_file() {
                    log::debug!("No {} in {}, using defaults", CONFIG_FILE_NAME, install_dir.display());
                    return Ok(Self::default());
                }
                candidate
            }
        };

        let content = std::fs::read_to_string(&path).map_err(|source| UpdateError::FileUnreadable {
            path: path.clone(),
            source,
        })?;

        log::debug!("Loading configuration from {}", path.display());
        Self::from_toml_str(&content).map_err(|e| match e {
            UpdateError::Config(message) => UpdateError::Config(format!("{}: {}", path.display(), message)),
            other => other,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| UpdateError::Config(e.message().to_string()))
    }

    /// Bundle URL for `platform`.
    pub fn bundle_url(&self, platform: Platform) -> Result<&str> {
        self.bundle_urls
            .get(platform.key())
            .map(String::as_str)
            .ok_or_else(|| UpdateError::Config(format!("no bundle URL configured for {}", platform)))
    }

    pub fn http_config(&self) -> HttpClientConfig {
        let mut config = HttpClientConfig::new()
            .with_user_agent(self.user_agent.clone())
            .with_verify_tls(self.verify_tls);
        if let Some(proxy) = &self.proxy {
            config = config.with_proxy(proxy.clone());
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = UpdaterConfig::default();

        assert_eq!(config.version_url, format!("{}/version", DEFAULT_RELEASE_BASE));
        assert_eq!(config.version_file, PathBuf::from("version"));
        assert_eq!(config.scratch_dir, PathBuf::from("update"));
        assert!(!config.verify_tls);
        assert!(config.bundle_url(Platform::Linux).unwrap().ends_with("/linux.zip"));
        assert!(config.bundle_url(Platform::Windows).unwrap().ends_with("/windows.zip"));
        assert!(matches!(config.bundle_url(Platform::MacOs), Err(UpdateError::Config(_))));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = UpdaterConfig::from_toml_str(
            r#"
            version_url = "https://releases.example.com/game/version"
            verify_tls = true

            [bundle_urls]
            macos = "https://releases.example.com/game/macos.tar.gz"
            "#,
        )
        .unwrap();

        assert_eq!(config.version_url, "https://releases.example.com/game/version");
        assert!(config.verify_tls);
        assert_eq!(config.scratch_dir, PathBuf::from("update"));
        assert_eq!(
            config.bundle_url(Platform::MacOs).unwrap(),
            "https://releases.example.com/game/macos.tar.gz"
        );
        // A table in the file replaces the default table.
        assert!(config.bundle_url(Platform::Linux).is_err());
    }

    #[test]
    fn test_invalid_file() {
        assert!(matches!(
            UpdaterConfig::from_toml_str("version_url = 42"),
            Err(UpdateError::Config(_))
        ));
        assert!(matches!(
            UpdaterConfig::from_toml_str("unknown_key = true"),
            Err(UpdateError::Config(_))
        ));
    }

    #[test]
    fn test_load_from_install_dir() {
        let dir = TempDir::new().unwrap();
        assert_eq!(UpdaterConfig::load(None, dir.path()).unwrap(), UpdaterConfig::default());

        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "scratch_dir = \".staging\"\n").unwrap();
        let config = UpdaterConfig::load(None, dir.path()).unwrap();
        assert_eq!(config.scratch_dir, PathBuf::from(".staging"));
    }

    #[test]
    fn test_load_explicit_missing() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("custom.toml");

        assert!(matches!(
            UpdaterConfig::load(Some(&missing), dir.path()),
            Err(UpdateError::FileUnreadable { .. })
        ));
    }

    #[test]
    fn test_http_config() {
        let config = UpdaterConfig {
            proxy: Some("http://proxy:3128".to_string()),
            verify_tls: true,
            ..UpdaterConfig::default()
        };

        let http = config.http_config();
        assert_eq!(http.proxy.as_deref(), Some("http://proxy:3128"));
        assert!(http.verify_tls);
        assert_eq!(http.user_agent, DEFAULT_USER_AGENT);
    }
}
