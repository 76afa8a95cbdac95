//! Terminal progress bar for one-click runs

use crate::services::progress::{ProcessingStage, ProgressReporter, ProgressUpdate};
use indicatif::{ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}";

/// Drives an `indicatif` bar from pipeline stage updates
pub(crate) struct IndicatifProgressReporter {
    bar: ProgressBar,
    verbose: bool,
}

impl IndicatifProgressReporter {
    pub(crate) fn new(verbose: bool) -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template(BAR_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Self { bar, verbose }
    }

    /// Stop drawing without marking the run complete
    pub(crate) fn abandon(&self) {
        self.bar.abandon();
    }
}

impl ProgressReporter for IndicatifProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        self.bar.set_position(u64::from(update.progress));
        if self.verbose {
            self.bar.println(format!(
                "[{:>3}%] {} ({}ms)",
                update.progress, update.description, update.elapsed_ms
            ));
        }
        self.bar.set_message(update.description);
    }

    fn report_completion(&self, message: &str, elapsed_ms: u64) {
        self.bar
            .finish_with_message(format!("{message} ({elapsed_ms}ms)"));
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        self.bar
            .println(format!("❌ {} {error}", stage.description()));
    }
}
