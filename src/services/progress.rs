//! Progress reporting service
//!
//! This module separates progress reporting concerns from pipeline logic,
//! allowing different frontends to implement their own progress handling.

use instant::Instant;
use std::sync::Mutex;

/// Stages of a one-click ID photo run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Running the face landmark model
    FaceDetection,
    /// Downloading or building segmentation weights
    ModelLoading,
    /// Producing the cutout
    BackgroundRemoval,
    /// Stepping down to a lower memory tier after a failure
    Retry,
    /// Computing and applying the crop rectangle
    AutoCrop,
    /// Evaluating the compliance checks
    Compliance,
    /// Run finished
    Completed,
}

impl ProcessingStage {
    /// Get a human-readable description of the processing stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::FaceDetection => "Detecting face...",
            ProcessingStage::ModelLoading => "Loading AI model...",
            ProcessingStage::BackgroundRemoval => "Removing background...",
            ProcessingStage::Retry => "Retrying at lower quality...",
            ProcessingStage::AutoCrop => "Auto-cropping...",
            ProcessingStage::Compliance => "Checking compliance...",
            ProcessingStage::Completed => "ID photo generated.",
        }
    }

    /// Get the typical progress percentage for this stage
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            ProcessingStage::FaceDetection => 5,
            ProcessingStage::ModelLoading => 15,
            ProcessingStage::BackgroundRemoval => 40,
            ProcessingStage::Retry => 40,
            ProcessingStage::AutoCrop => 85,
            ProcessingStage::Compliance => 95,
            ProcessingStage::Completed => 100,
        }
    }
}

/// Progress update containing stage and timing information
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Current processing stage
    pub stage: ProcessingStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Human-readable status text
    pub description: String,
    /// Elapsed time since the run started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    /// Create a new progress update
    #[must_use]
    pub fn new(stage: ProcessingStage, start_time: Instant) -> Self {
        Self::with_description(stage, stage.description().to_string(), start_time)
    }

    /// Create a progress update with custom description
    #[must_use]
    pub fn with_description(
        stage: ProcessingStage,
        description: String,
        start_time: Instant,
    ) -> Self {
        Self {
            progress: stage.progress_percentage(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
            description,
        }
    }

    /// Override the stage's typical percentage
    #[must_use]
    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = progress.min(100);
        self
    }
}

/// Trait for reporting progress during a pipeline run
pub trait ProgressReporter: Send + Sync {
    /// Report a progress update
    fn report_progress(&self, update: ProgressUpdate);

    /// Report the final status message
    fn report_completion(&self, message: &str, elapsed_ms: u64);

    /// Report an error during processing
    fn report_error(&self, stage: ProcessingStage, error: &str);
}

/// No-op progress reporter that discards all progress updates
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_completion(&self, _message: &str, _elapsed_ms: u64) {}

    fn report_error(&self, _stage: ProcessingStage, _error: &str) {}
}

/// Console progress reporter that logs progress through `log`
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    /// Create a new console progress reporter
    ///
    /// # Arguments
    /// * `verbose` - Whether to include elapsed time in each line
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            log::info!(
                "[{}%] {} ({}ms elapsed)",
                update.progress,
                update.description,
                update.elapsed_ms
            );
        } else {
            log::info!("[{}%] {}", update.progress, update.description);
        }
    }

    fn report_completion(&self, message: &str, elapsed_ms: u64) {
        log::info!("✅ {message} ({elapsed_ms}ms)");
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        log::error!("❌ Error during {}: {}", stage.description(), error);
    }
}

/// Reporter that keeps every update, for callers that render history
#[derive(Default)]
pub struct RecordingProgressReporter {
    updates: Mutex<Vec<ProgressUpdate>>,
    errors: Mutex<Vec<(ProcessingStage, String)>>,
    completion: Mutex<Option<String>>,
}

impl RecordingProgressReporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates received so far
    #[must_use]
    pub fn updates(&self) -> Vec<ProgressUpdate> {
        self.updates
            .lock()
            .map(|updates| updates.clone())
            .unwrap_or_default()
    }

    /// Updates of one stage, in order
    #[must_use]
    pub fn updates_for(&self, stage: ProcessingStage) -> Vec<ProgressUpdate> {
        self.updates()
            .into_iter()
            .filter(|update| update.stage == stage)
            .collect()
    }

    /// Errors received so far
    #[must_use]
    pub fn errors(&self) -> Vec<(ProcessingStage, String)> {
        self.errors
            .lock()
            .map(|errors| errors.clone())
            .unwrap_or_default()
    }

    /// Final message, if the run completed
    #[must_use]
    pub fn completion(&self) -> Option<String> {
        self.completion.lock().ok().and_then(|c| c.clone())
    }
}

impl ProgressReporter for RecordingProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if let Ok(mut updates) = self.updates.lock() {
            updates.push(update);
        }
    }

    fn report_completion(&self, message: &str, _elapsed_ms: u64) {
        if let Ok(mut completion) = self.completion.lock() {
            *completion = Some(message.to_string());
        }
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.push((stage, error.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_progress_is_monotonic() {
        let stages = [
            ProcessingStage::FaceDetection,
            ProcessingStage::ModelLoading,
            ProcessingStage::BackgroundRemoval,
            ProcessingStage::AutoCrop,
            ProcessingStage::Compliance,
            ProcessingStage::Completed,
        ];
        for pair in stages.windows(2) {
            assert!(pair[0].progress_percentage() <= pair[1].progress_percentage());
        }
        assert_eq!(ProcessingStage::Completed.progress_percentage(), 100);
    }

    #[test]
    fn test_progress_update_creation() {
        let start = Instant::now();
        let update = ProgressUpdate::new(ProcessingStage::AutoCrop, start);
        assert_eq!(update.stage, ProcessingStage::AutoCrop);
        assert_eq!(update.description, "Auto-cropping...");
        assert_eq!(update.progress, 85);

        let custom = ProgressUpdate::with_description(
            ProcessingStage::ModelLoading,
            "Loading AI model... 42%".to_string(),
            start,
        )
        .with_progress(142);
        assert_eq!(custom.progress, 100);
        assert_eq!(custom.description, "Loading AI model... 42%");
    }

    #[test]
    fn test_recording_reporter() {
        let reporter = RecordingProgressReporter::new();
        let start = Instant::now();

        reporter.report_progress(ProgressUpdate::new(ProcessingStage::FaceDetection, start));
        reporter.report_progress(ProgressUpdate::new(ProcessingStage::Retry, start));
        reporter.report_error(ProcessingStage::BackgroundRemoval, "oom");
        reporter.report_completion("done", 10);

        assert_eq!(reporter.updates().len(), 2);
        assert_eq!(reporter.updates_for(ProcessingStage::Retry).len(), 1);
        assert_eq!(reporter.errors().len(), 1);
        assert_eq!(reporter.completion().as_deref(), Some("done"));
    }

    #[test]
    fn test_noop_and_console_reporters_accept_updates() {
        let start = Instant::now();
        let reporters: Vec<Box<dyn ProgressReporter>> = vec![
            Box::new(NoOpProgressReporter),
            Box::new(ConsoleProgressReporter::new(true)),
            Box::new(ConsoleProgressReporter::new(false)),
        ];
        for reporter in reporters {
            reporter.report_progress(ProgressUpdate::new(ProcessingStage::Compliance, start));
            reporter.report_error(ProcessingStage::Compliance, "test");
            reporter.report_completion("ok", 1);
        }
    }
}
