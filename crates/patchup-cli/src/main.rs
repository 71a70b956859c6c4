mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use patchup_core::{
    ArchiveExtractor, HttpTransport, InstallLayout, Platform, ReleaseSource, UpdateError, UpdateOutcome,
    UpdatePipeline, UpdaterConfig,
};

use output::{CliObserver, Output};

#[derive(Parser, Debug)]
#[command(name = "patchup")]
#[command(about = "Check for a newer release and install it over the current directory")]
#[command(version)]
struct Cli {
    /// Install directory holding the version file
    #[arg(short = 'd', long = "working-dir", default_value = ".")]
    working_dir: PathBuf,

    /// Configuration file (default: patchup.toml in the install directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Install the bundle for another platform (windows, linux, macos)
    #[arg(short, long)]
    platform: Option<Platform>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Only print errors
    #[arg(short, long)]
    quiet: bool,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn run(cli: &Cli) -> Result<UpdateOutcome> {
    let config = UpdaterConfig::load(cli.config.as_deref(), &cli.working_dir)?;
    let platform = cli
        .platform
        .or_else(Platform::current)
        .ok_or_else(|| UpdateError::Config(format!("no release is published for {}", std::env::consts::OS)))?;

    let source = ReleaseSource::from_config(&config, platform)?;
    let layout = InstallLayout::from_config(&cli.working_dir, &config);
    let transport = HttpTransport::with_config(config.http_config())?;
    let pipeline = UpdatePipeline::new(transport, ArchiveExtractor::new(), layout, source);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create async runtime")?;

    let observer = CliObserver::new(Output::new(cli.quiet));
    let outcome = runtime.block_on(pipeline.run(&observer))?;
    Ok(outcome)
}

/// Process exit status for a failed run.
fn failure_code(error: &anyhow::Error) -> u8 {
    error
        .downcast_ref::<UpdateError>()
        .map(UpdateError::exit_code)
        .unwrap_or(1)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(outcome) => {
            log::debug!("Finished: {:?}", outcome);
            ExitCode::SUCCESS
        }
        Err(e) => {
            output::error(&e.to_string());
            if cli.verbose >= 2 {
                for cause in e.chain().skip(1) {
                    output::cause(&cause.to_string());
                }
            }
            ExitCode::from(failure_code(&e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["patchup"]).unwrap();

        assert_eq!(cli.working_dir, PathBuf::from("."));
        assert!(cli.config.is_none());
        assert!(cli.platform.is_none());
        assert_eq!(cli.verbose, 0);
        assert!(!cli.quiet);
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from(["patchup", "-d", "/opt/game", "-c", "custom.toml", "-vv"]).unwrap();

        assert_eq!(cli.working_dir, PathBuf::from("/opt/game"));
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        assert_eq!(cli.verbose, 2);
        assert!(cli.platform.is_none());

        let cli = Cli::try_parse_from(["patchup", "--platform", "windows"]).unwrap();
        assert_eq!(cli.platform, Some(Platform::Windows));
        assert!(Cli::try_parse_from(["patchup", "-p", "amiga"]).is_err());
        assert!(Cli::try_parse_from(["patchup", "-q", "-v"]).is_err());
    }

    #[test]
    fn test_failure_codes() {
        let extract: anyhow::Error = UpdateError::ExtractFailed("bad entry".to_string()).into();
        assert_eq!(failure_code(&extract), 6);

        let config: anyhow::Error = UpdateError::Config("no bundle".to_string()).into();
        assert_eq!(failure_code(&config), 7);

        let other = anyhow::anyhow!("runtime unavailable");
        assert_eq!(failure_code(&other), 1);
    }

    #[test]
    fn test_missing_install_fails_without_network() {
        let dir = tempfile::TempDir::new().unwrap();
        let cli = Cli::try_parse_from(["patchup", "-q", "-d", dir.path().to_str().unwrap()]).unwrap();

        let error = run(&cli).unwrap_err();

        assert!(matches!(
            error.downcast_ref::<UpdateError>(),
            Some(UpdateError::FileUnreadable { .. })
        ));
        assert_eq!(failure_code(&error), 2);
        assert!(!dir.path().join("update").exists());
    }
}
