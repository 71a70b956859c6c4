//! Terminal output for update runs.

use std::io::Write;
use std::sync::Mutex;

use console::{style, Term};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use patchup_core::{PipelineObserver, Stage};

/// Output handler for CLI
pub struct Output {
    term: Term,
    quiet: bool,
}

impl Output {
    pub fn new(quiet: bool) -> Self {
        Self {
            term: Term::stdout(),
            quiet,
        }
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Write a line
    pub fn writeln(&self, message: &str) {
        if !self.quiet {
            let _ = writeln!(&self.term, "{}", message);
        }
    }

    /// Write an info message
    pub fn info(&self, message: &str) {
        if !self.quiet {
            let _ = writeln!(&self.term, "{}", style(message).cyan());
        }
    }

    /// Write a success message
    pub fn success(&self, message: &str) {
        if !self.quiet {
            let _ = writeln!(&self.term, "{}", style(message).green());
        }
    }
}

/// Write an error message. Shown even in quiet mode.
pub fn error(message: &str) {
    let term = Term::stderr();
    let _ = writeln!(&term, "{} {}", style("ERROR:").red().bold(), message);
}

/// Write one line of an error's cause chain.
pub fn cause(message: &str) {
    let term = Term::stderr();
    let _ = writeln!(&term, "  {} {}", style("Caused by:").dim(), message);
}

/// Renders pipeline stages and the download percentage.
pub struct CliObserver {
    output: Output,
    bar: Mutex<Option<ProgressBar>>,
}

impl CliObserver {
    pub fn new(output: Output) -> Self {
        Self {
            output,
            bar: Mutex::new(None),
        }
    }

    fn download_bar(&self) -> ProgressBar {
        if self.output.is_quiet() {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::with_draw_target(Some(100), ProgressDrawTarget::stdout());
        pb.set_style(
            ProgressStyle::with_template("Downloading... {pos}% complete")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        pb
    }

    fn finish_bar(&self) {
        if let Ok(mut bar) = self.bar.lock() {
            if let Some(pb) = bar.take() {
                pb.finish();
            }
        }
    }
}

impl PipelineObserver for CliObserver {
    fn stage(&self, stage: &Stage<'_>) {
        match stage {
            Stage::CheckingVersion => self.output.writeln("Checking for updates..."),
            Stage::UpToDate { version } => {
                self.output
                    .success(&format!("You have the latest version ({})", version))
            }
            Stage::UpdateNeeded { to, .. } => {
                self.output
                    .info(&format!("Newer version {} is available, installing...", to))
            }
            Stage::Downloading => {
                if let Ok(mut bar) = self.bar.lock() {
                    *bar = Some(self.download_bar());
                }
            }
            Stage::Extracting => {
                self.finish_bar();
                self.output.writeln("Extracting...");
            }
            Stage::Done { .. } => self.output.success("Update complete"),
        }
    }

    fn download_progress(&self, percent: u8) {
        if let Ok(bar) = self.bar.lock() {
            if let Some(pb) = bar.as_ref() {
                pb.set_position(percent.into());
            }
        }
    }
}

impl Drop for CliObserver {
    fn drop(&mut self) {
        // A failed download leaves the bar on screen; close it before the error.
        self.finish_bar();
    }
}
