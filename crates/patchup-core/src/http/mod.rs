//! HTTP transport for version files and release bundles.

mod client;

pub use client::{DownloadTask, HttpClientConfig, HttpTransport, Transport, DEFAULT_USER_AGENT};
