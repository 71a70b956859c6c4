pub mod archive;
pub mod config;
pub mod error;
pub mod http;
pub mod pipeline;
pub mod platform;
pub mod progress;
pub mod version;

pub use archive::{ArchiveExtractor, Extract, ExtractOptions};
pub use config::UpdaterConfig;
pub use error::{Result, TransferCode, UpdateError};
pub use http::{DownloadTask, HttpClientConfig, HttpTransport, Transport};
pub use pipeline::{
    InstallLayout, PipelineObserver, ReleaseSource, SilentObserver, Stage, UpdateOutcome, UpdatePipeline,
};
pub use platform::Platform;
pub use progress::{ProgressReporter, ProgressSink};
pub use version::{read_version, UpdateDecision, VersionToken};
