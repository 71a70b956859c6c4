use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Why a transfer did not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferCode {
    /// The server answered with a non-success status
    Status(u16),
    /// Connecting, TLS, redirects or reading the body failed
    Network(String),
    /// A received chunk could not be written to the destination
    Write(String),
}

impl fmt::Display for TransferCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferCode::Status(status) => write!(f, "HTTP status {}", status),
            TransferCode::Network(message) => write!(f, "network error: {}", message),
            TransferCode::Write(message) => write!(f, "write error: {}", message),
        }
    }
}

#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("failed to open file {}", path.display())]
    FileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open file {} for writing", path.display())]
    DestinationUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to initialise HTTP client")]
    TransportInitFailed(#[source] reqwest::Error),

    #[error("failed to download file from {url} ({code})")]
    TransferFailed { url: String, code: TransferCode },

    #[error("unpack error: {0}")]
    ExtractFailed(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl UpdateError {
    /// Process exit status for this failure kind. Success is always 0.
    pub fn exit_code(&self) -> u8 {
        match self {
            UpdateError::Unknown(_) => 1,
            UpdateError::FileUnreadable { .. } => 2,
            UpdateError::DestinationUnwritable { .. } => 3,
            UpdateError::TransportInitFailed(_) => 4,
            UpdateError::TransferFailed { .. } => 5,
            UpdateError::ExtractFailed(_) => 6,
            UpdateError::Config(_) => 7,
        }
    }

    pub(crate) fn extract(context: &str, err: impl fmt::Display) -> Self {
        UpdateError::ExtractFailed(format!("{}: {}", context, err))
    }
}

pub type Result<T> = std::result::Result<T, UpdateError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io;

    fn io_err() -> io::Error {
        io::Error::new(io::ErrorKind::NotFound, "missing")
    }

    #[test]
    fn test_exit_codes_are_distinct_and_nonzero() {
        let errors = [
            UpdateError::FileUnreadable { path: "version".into(), source: io_err() },
            UpdateError::DestinationUnwritable { path: "update/version".into(), source: io_err() },
            UpdateError::TransferFailed {
                url: "https://example.com/version".to_string(),
                code: TransferCode::Status(404),
            },
            UpdateError::ExtractFailed("truncated archive".to_string()),
            UpdateError::Config("bad toml".to_string()),
            UpdateError::Unknown("boom".to_string()),
        ];

        let codes: HashSet<u8> = errors.iter().map(UpdateError::exit_code).collect();
        assert_eq!(codes.len(), errors.len());
        assert!(!codes.contains(&0));
    }

    #[test]
    fn test_messages() {
        let err = UpdateError::FileUnreadable { path: "version".into(), source: io_err() };
        assert_eq!(err.to_string(), "failed to open file version");

        let err = UpdateError::TransferFailed {
            url: "https://example.com/linux.zip".to_string(),
            code: TransferCode::Status(503),
        };
        assert_eq!(
            err.to_string(),
            "failed to download file from https://example.com/linux.zip (HTTP status 503)"
        );

        let err = UpdateError::extract("failed to read entry header", "unexpected EOF");
        assert_eq!(err.to_string(), "unpack error: failed to read entry header: unexpected EOF");
    }
}
