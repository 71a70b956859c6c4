//! Streaming HTTP downloads.
//!
//! [`HttpTransport`] performs one GET per [`DownloadTask`] and writes the
//! body to disk chunk by chunk, so bundles of any size are never held in
//! memory. Redirects are followed with reqwest's default policy.
//!
//! Certificate validation is disabled unless [`HttpClientConfig::verify_tls`]
//! is set. Release hosts are trusted implicitly; a warning is logged every
//! time a client is built this way.
//!
//! ```no_run
//! use patchup_core::http::{DownloadTask, HttpClientConfig, HttpTransport, Transport};
//! use patchup_core::progress::ProgressReporter;
//!
//! # async fn example() -> patchup_core::Result<()> {
//! let transport = HttpTransport::with_config(HttpClientConfig::new().with_verify_tls(true))?;
//!
//! let task = DownloadTask::new("https://example.com/linux.zip", "update/linux.zip".as_ref())
//!     .with_progress(ProgressReporter::new(|percent| println!("{}%", percent)));
//! transport.fetch(task).await?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::TransferCode;
use crate::progress::ProgressReporter;
use crate::{Result, UpdateError};

pub const DEFAULT_USER_AGENT: &str = concat!("patchup/", env!("CARGO_PKG_VERSION"));

/// One file to fetch.
pub struct DownloadTask<'a> {
    pub url: &'a str,
    pub destination: &'a Path,
    pub progress: Option<ProgressReporter<'a>>,
}

impl<'a> DownloadTask<'a> {
    pub fn new(url: &'a str, destination: &'a Path) -> Self {
        Self {
            url,
            destination,
            progress: None,
        }
    }

    pub fn with_progress(mut self, reporter: ProgressReporter<'a>) -> Self {
        self.progress = Some(reporter);
        self
    }
}

/// Moves a remote resource onto the local filesystem.
///
/// The destination's parent directory must already exist.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, task: DownloadTask<'_>) -> Result<()>;
}

pub struct HttpTransport {
    client: Client,
    user_agent: String,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        Self::with_config(HttpClientConfig::default())
    }

    pub fn with_config(config: HttpClientConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .user_agent(&config.user_agent)
            .danger_accept_invalid_certs(!config.verify_tls);

        if !config.verify_tls {
            log::warn!("TLS certificate verification is disabled for update downloads");
        }

        if let Some(proxy_url) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy_url).map_err(UpdateError::TransportInitFailed)?;
            builder = builder.proxy(proxy);
        } else if !config.system_proxy {
            builder = builder.no_proxy();
        }

        let client = builder.build().map_err(UpdateError::TransportInitFailed)?;

        Ok(Self {
            client,
            user_agent: config.user_agent,
        })
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    async fn stream_body(
        &self,
        url: &str,
        file: &mut File,
        mut progress: Option<&mut ProgressReporter<'_>>,
    ) -> Result<u64> {
        let failed = |code: TransferCode| UpdateError::TransferFailed {
            url: url.to_string(),
            code,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| failed(TransferCode::Network(e.to_string())))?;

        let status = response.status();
        if !status.is_success() {
            return Err(failed(TransferCode::Status(status.as_u16())));
        }

        let total = response.content_length().unwrap_or(0);
        let mut downloaded: u64 = 0;
        if let Some(reporter) = progress.as_deref_mut() {
            reporter.update(downloaded, total);
        }

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| failed(TransferCode::Network(e.to_string())))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| failed(TransferCode::Write(e.to_string())))?;
            downloaded += chunk.len() as u64;

            if let Some(reporter) = progress.as_deref_mut() {
                reporter.update(downloaded, total);
            }
        }

        file.flush()
            .await
            .map_err(|e| failed(TransferCode::Write(e.to_string())))?;

        Ok(downloaded)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, task: DownloadTask<'_>) -> Result<()> {
        let DownloadTask { url, destination, mut progress } = task;

        let mut file = File::create(destination)
            .await
            .map_err(|source| UpdateError::DestinationUnwritable {
                path: destination.to_path_buf(),
                source,
            })?;

        log::debug!("GET {} -> {}", url, destination.display());
        let result = self.stream_body(url, &mut file, progress.as_mut()).await;

        drop(file);

        let downloaded = result?;
        log::debug!("Downloaded {} bytes from {}", downloaded, url);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub user_agent: String,
    pub proxy: Option<String>,
    /// Honour `HTTP_PROXY` and friends when no explicit proxy is set
    pub system_proxy: bool,
    pub verify_tls: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            proxy: None,
            system_proxy: true,
            verify_tls: false,
        }
    }
}

impl HttpClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn with_proxy(mut self, proxy: String) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_system_proxy(mut self, system_proxy: bool) -> Self {
        self.system_proxy = system_proxy;
        self
    }

    pub fn with_verify_tls(mut self, verify_tls: bool) -> Self {
        self.verify_tls = verify_tls;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = HttpClientConfig::default();

        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert!(config.proxy.is_none());
        assert!(config.system_proxy);
        assert!(!config.verify_tls);
    }

    #[test]
    fn test_config_builder() {
        let config = HttpClientConfig::new()
            .with_user_agent("Test/1.0".to_string())
            .with_proxy("http://proxy:8080".to_string())
            .with_verify_tls(true);

        assert_eq!(config.user_agent, "Test/1.0");
        assert_eq!(config.proxy.as_deref(), Some("http://proxy:8080"));
        assert!(config.verify_tls);
    }

    #[test]
    fn test_transport_creation() {
        let transport = HttpTransport::with_config(
            HttpClientConfig::new().with_user_agent("Updater/2.0".to_string()),
        )
        .unwrap();
        assert_eq!(transport.user_agent(), "Updater/2.0");
    }

    #[tokio::test]
    async fn test_unwritable_destination() {
        let dir = tempfile::TempDir::new().unwrap();
        let destination = dir.path().join("missing").join("version");
        let transport = HttpTransport::new().unwrap();

        // The destination is opened before any request is made.
        let result = transport
            .fetch(DownloadTask::new("http://127.0.0.1:9/version", &destination))
            .await;
        assert!(matches!(result, Err(UpdateError::DestinationUnwritable { .. })));
    }
}
