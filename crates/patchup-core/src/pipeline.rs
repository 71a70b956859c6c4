//! The update pipeline: compare versions, download the bundle, unpack it.
//!
//! ```text
//! CheckingVersion ──equal──▶ UpToDate
//!        │
//!    different
//!        ▼
//!  UpdateNeeded ─▶ Downloading ─▶ Extracting ─▶ Done
//! ```
//!
//! Every run starts from scratch: the decision is derived from the local
//! version file and a freshly downloaded remote one. The first failure ends
//! the run and is returned unchanged; nothing is retried or rolled back.

use std::fmt;
use std::path::{Path, PathBuf};

use url::Url;

use crate::archive::Extract;
use crate::config::UpdaterConfig;
use crate::http::{DownloadTask, Transport};
use crate::platform::Platform;
use crate::progress::ProgressReporter;
use crate::version::{read_version, UpdateDecision, VersionToken};
use crate::{Result, UpdateError};

const FALLBACK_BUNDLE_NAME: &str = "bundle";

/// Pipeline states, reported to a [`PipelineObserver`] as they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage<'a> {
    CheckingVersion,
    UpToDate { version: &'a VersionToken },
    UpdateNeeded { from: &'a VersionToken, to: &'a VersionToken },
    Downloading,
    Extracting,
    Done { version: &'a VersionToken },
}

impl Stage<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::CheckingVersion => "checking-version",
            Stage::UpToDate { .. } => "up-to-date",
            Stage::UpdateNeeded { .. } => "update-needed",
            Stage::Downloading => "downloading",
            Stage::Extracting => "extracting",
            Stage::Done { .. } => "done",
        }
    }
}

impl fmt::Display for Stage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Receives pipeline progress. All methods default to doing nothing.
pub trait PipelineObserver: Send + Sync {
    fn stage(&self, _stage: &Stage<'_>) {}

    /// Bundle download percentage; only called when the value changes.
    fn download_progress(&self, _percent: u8) {}
}

/// Observer that ignores everything.
pub struct SilentObserver;

impl PipelineObserver for SilentObserver {}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    UpToDate { version: VersionToken },
    Updated { from: VersionToken, to: VersionToken },
}

/// Files the pipeline reads and writes, all below `root`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    pub root: PathBuf,
    pub version_file: PathBuf,
    pub scratch_dir: PathBuf,
}

impl InstallLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            version_file: PathBuf::from("version"),
            scratch_dir: PathBuf::from("update"),
        }
    }

    pub fn from_config(root: impl Into<PathBuf>, config: &UpdaterConfig) -> Self {
        Self {
            root: root.into(),
            version_file: config.version_file.clone(),
            scratch_dir: config.scratch_dir.clone(),
        }
    }

    pub fn version_path(&self) -> PathBuf {
        self.root.join(&self.version_file)
    }

    pub fn scratch_path(&self) -> PathBuf {
        self.root.join(&self.scratch_dir)
    }

    /// Where the downloaded remote version file is staged.
    pub fn remote_version_path(&self) -> PathBuf {
        let name = self.version_file.file_name().unwrap_or("version".as_ref());
        self.scratch_path().join(name)
    }

    /// Where the bundle from `url` is staged. The file name is taken from
    /// the URL so the archive suffix is kept.
    pub fn bundle_path(&self, url: &str) -> PathBuf {
        let name = Url::parse(url)
            .ok()
            .and_then(|url| {
                url.path_segments()
                    .and_then(|mut segments| segments.next_back().map(str::to_string))
            })
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| FALLBACK_BUNDLE_NAME.to_string());
        self.scratch_path().join(name)
    }
}

/// The two remote resources of a release channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseSource {
    pub version_url: String,
    pub bundle_url: String,
}

impl ReleaseSource {
    pub fn new(version_url: impl Into<String>, bundle_url: impl Into<String>) -> Self {
        Self {
            version_url: version_url.into(),
            bundle_url: bundle_url.into(),
        }
    }

    pub fn from_config(config: &UpdaterConfig, platform: Platform) -> Result<Self> {
        Ok(Self::new(config.version_url.clone(), config.bundle_url(platform)?))
    }
}

pub struct UpdatePipeline<T, X> {
    transport: T,
    extractor: X,
    layout: InstallLayout,
    source: ReleaseSource,
}

impl<T: Transport, X: Extract> UpdatePipeline<T, X> {
    pub fn new(transport: T, extractor: X, layout: InstallLayout, source: ReleaseSource) -> Self {
        Self {
            transport,
            extractor,
            layout,
            source,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn extractor(&self) -> &X {
        &self.extractor
    }

    /// Create the scratch directory.
    pub fn bootstrap(&self) -> Result<()> {
        let scratch = self.layout.scratch_path();
        std::fs::create_dir_all(&scratch).map_err(|source| UpdateError::DestinationUnwritable {
            path: scratch,
            source,
        })
    }

    /// Read the local version, fetch the remote one and compare them.
    ///
    /// The local file is read first, so a missing install is reported
    /// before anything touches the network.
    pub async fn check(&self) -> Result<(VersionToken, UpdateDecision)> {
        let local = read_version(&self.layout.version_path())?;

        self.bootstrap()?;
        let remote_path = self.layout.remote_version_path();
        self.transport
            .fetch(DownloadTask::new(&self.source.version_url, &remote_path))
            .await?;
        let remote = read_version(&remote_path)?;

        log::info!("Installed version '{}', published version '{}'", local, remote);
        let decision = UpdateDecision::between(&local, remote);
        Ok((local, decision))
    }

    /// Run the whole pipeline once.
    pub async fn run(&self, observer: &dyn PipelineObserver) -> Result<UpdateOutcome> {
        enter(observer, Stage::CheckingVersion);
        let (local, decision) = self.check().await?;

        let remote = match decision {
            UpdateDecision::UpToDate => {
                enter(observer, Stage::UpToDate { version: &local });
                return Ok(UpdateOutcome::UpToDate { version: local });
            }
            UpdateDecision::NewVersion(remote) => remote,
        };

        enter(observer, Stage::UpdateNeeded { from: &local, to: &remote });
        self.install(observer).await?;
        enter(observer, Stage::Done { version: &remote });

        Ok(UpdateOutcome::Updated { from: local, to: remote })
    }

    /// Download the bundle and unpack it over the install.
    async fn install(&self, observer: &dyn PipelineObserver) -> Result<()> {
        let bundle_path = self.layout.bundle_path(&self.source.bundle_url);

        enter(observer, Stage::Downloading);
        let reporter = ProgressReporter::new(move |percent| observer.download_progress(percent));
        self.transport
            .fetch(DownloadTask::new(&self.source.bundle_url, &bundle_path).with_progress(reporter))
            .await?;

        enter(observer, Stage::Extracting);
        self.extract(&bundle_path)
    }

    fn extract(&self, bundle_path: &Path) -> Result<()> {
        self.extractor.extract(bundle_path, &self.layout.root)
    }
}

fn enter(observer: &dyn PipelineObserver, stage: Stage<'_>) {
    log::debug!("Pipeline stage: {}", stage);
    observer.stage(&stage);
}
