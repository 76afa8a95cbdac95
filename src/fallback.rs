//! Tiered fallback controller
//!
//! Walks the tier list strictly downward from the selected tier. Each failure tears
//! down the venue that failed before the next, cheaper tier is attempted.

use crate::{
    compositor::composite,
    error::{IdPhotoError, Result},
    executor::InferenceRunner,
    inference::ProgressCallback,
    services::progress::{NoOpProgressReporter, ProcessingStage, ProgressReporter, ProgressUpdate},
    tier::{MemoryTier, TierLevel},
};
use image::{DynamicImage, RgbaImage};
use instant::Instant;
use std::sync::Arc;

/// Outcome of one tier attempt
#[derive(Debug, Clone, PartialEq)]
pub struct TierAttempt {
    pub tier: MemoryTier,
    /// Failure text, `None` for the successful attempt
    pub error: Option<String>,
}

/// Image with its background removed
#[derive(Debug, Clone)]
pub struct CutoutImage {
    pub image: RgbaImage,
    /// Tier that produced the mask
    pub tier: MemoryTier,
    /// Every attempt made, in order
    pub attempts: Vec<TierAttempt>,
}

/// Retry-with-degradation across memory tiers
pub struct TieredFallbackController {
    runner: Arc<dyn InferenceRunner>,
    start: TierLevel,
    reporter: Arc<dyn ProgressReporter>,
}

impl std::fmt::Debug for TieredFallbackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredFallbackController")
            .field("start", &self.start)
            .finish_non_exhaustive()
    }
}

impl TieredFallbackController {
    /// Create a controller starting at the classifier's tier
    #[must_use]
    pub fn new(runner: Arc<dyn InferenceRunner>, start: TierLevel) -> Self {
        Self {
            runner,
            start,
            reporter: Arc::new(NoOpProgressReporter),
        }
    }

    /// Send retry and model-loading status to `reporter`
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Tier the next run starts from
    #[must_use]
    pub fn start_tier(&self) -> TierLevel {
        self.start
    }

    /// Remove the background, stepping down tiers on failure
    ///
    /// No tier is attempted twice and tiers are attempted in descending order.
    ///
    /// Only transient failures ([`IdPhotoError::is_retryable`]) step down; any
    /// other failure ends the walk and is returned as is.
    ///
    /// # Errors
    /// - `BackgroundRemovalExhausted` when the lowest tier fails too
    /// - A non-transient runner failure, such as invalid configuration
    /// - `DimensionMismatch` if a runner returns a mask of the wrong size
    #[tracing::instrument(skip_all, fields(start = %self.start, width = image.width(), height = image.height()))]
    pub async fn remove_background_adaptive(&self, image: &DynamicImage) -> Result<CutoutImage> {
        let started = Instant::now();
        let original = image.to_rgba8();
        let mut attempts: Vec<TierAttempt> = Vec::new();
        let mut last_error = String::new();

        for level in self.start.descending() {
            let tier = level.tier();
            tracing::info!(
                tier = %level,
                resolution = tier.processor_resolution,
                venue = %tier.venue,
                "attempting background removal"
            );

            let progress = self.model_progress(started);
            let outcome = self
                .runner
                .run_inference(image.to_rgb8(), tier.processor_resolution, tier.venue, progress)
                .await;

            match outcome {
                Ok(mask) => {
                    let cutout = composite(&original, &mask)?;
                    attempts.push(TierAttempt { tier, error: None });
                    tracing::info!(tier = %level, attempts = attempts.len(), "background removed");
                    return Ok(CutoutImage {
                        image: cutout,
                        tier,
                        attempts,
                    });
                },
                Err(error) => {
                    self.runner.discard_venue(tier.venue).await;
                    if !error.is_retryable() {
                        tracing::error!(tier = %level, %error, "non-transient failure, not stepping down");
                        return Err(error);
                    }
                    tracing::warn!(tier = %level, %error, "tier attempt failed");
                    last_error = error.to_string();
                    attempts.push(TierAttempt {
                        tier,
                        error: Some(last_error.clone()),
                    });

                    if let Some(lower) = level.lower() {
                        let message = format!(
                            "Retrying at lower quality ({}px)...",
                            lower.tier().processor_resolution
                        );
                        self.reporter.report_progress(ProgressUpdate::with_description(
                            ProcessingStage::Retry,
                            message,
                            started,
                        ));
                    }
                },
            }
        }

        let exhausted = IdPhotoError::BackgroundRemovalExhausted {
            attempts: attempts.len(),
            last_error,
        };
        self.reporter
            .report_error(ProcessingStage::BackgroundRemoval, &exhausted.user_message());
        Err(exhausted)
    }

    /// Forward weight-download percentages as `ModelLoading` updates
    fn model_progress(&self, started: Instant) -> ProgressCallback {
        let reporter = Arc::clone(&self.reporter);
        Arc::new(move |percent| {
            reporter.report_progress(
                ProgressUpdate::with_description(
                    ProcessingStage::ModelLoading,
                    format!("Loading AI model... {percent}%"),
                    started,
                )
                .with_progress(percent),
            );
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::MockSegmentationLoader;
    use crate::config::{ModelPrecision, Timeouts};
    use crate::executor::InferenceExecutor;
    use crate::services::progress::RecordingProgressReporter;
    use crate::tier::ExecutionVenue;
    use crate::types::InferenceResult;
    use async_trait::async_trait;
    use image::RgbImage;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Runner failing at the listed resolutions and recording every call
    #[derive(Default)]
    struct ScriptedRunner {
        failing_resolutions: Vec<u32>,
        fatal: bool,
        mask_size_override: Option<(u32, u32)>,
        calls: Mutex<Vec<(u32, ExecutionVenue)>>,
        discarded: Mutex<Vec<ExecutionVenue>>,
    }

    impl ScriptedRunner {
        fn failing_at(resolutions: &[u32]) -> Self {
            Self {
                failing_resolutions: resolutions.to_vec(),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl InferenceRunner for ScriptedRunner {
        async fn run_inference(
            &self,
            image: RgbImage,
            processor_resolution: u32,
            venue: ExecutionVenue,
            _progress: ProgressCallback,
        ) -> Result<InferenceResult> {
            self.calls.lock().unwrap().push((processor_resolution, venue));
            if self.fatal {
                return Err(IdPhotoError::invalid_config("unsupported precision"));
            }
            if self.failing_resolutions.contains(&processor_resolution) {
                return Err(IdPhotoError::inference("out of memory"));
            }
            let (width, height) = self.mask_size_override.unwrap_or(image.dimensions());
            Ok(InferenceResult {
                alpha_mask: vec![255; (width * height) as usize],
                width,
                height,
            })
        }

        async fn discard_venue(&self, venue: ExecutionVenue) {
            self.discarded.lock().unwrap().push(venue);
        }
    }

    fn test_image() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::new(24, 16))
    }

    #[tokio::test]
    async fn test_first_tier_success_makes_one_attempt() {
        let runner = Arc::new(ScriptedRunner::default());
        let controller = TieredFallbackController::new(runner.clone(), TierLevel::High);

        let cutout = controller.remove_background_adaptive(&test_image()).await.unwrap();

        assert_eq!(cutout.tier.level, TierLevel::High);
        assert_eq!(cutout.attempts.len(), 1);
        assert_eq!(runner.calls.lock().unwrap().len(), 1);
        assert!(runner.discarded.lock().unwrap().is_empty());
        assert!(cutout.image.pixels().all(|p| p.0[3] == 255));
    }

    #[tokio::test]
    async fn test_steps_down_and_reports_retry() {
        let runner = Arc::new(ScriptedRunner::failing_at(&[1024]));
        let reporter = Arc::new(RecordingProgressReporter::new());
        let controller = TieredFallbackController::new(runner.clone(), TierLevel::High)
            .with_reporter(reporter.clone());

        let cutout = controller.remove_background_adaptive(&test_image()).await.unwrap();

        assert_eq!(cutout.tier.level, TierLevel::Medium);
        assert_eq!(
            *runner.calls.lock().unwrap(),
            vec![(1024, ExecutionVenue::Isolated), (768, ExecutionVenue::Isolated)]
        );
        assert_eq!(*runner.discarded.lock().unwrap(), vec![ExecutionVenue::Isolated]);

        let retries = reporter.updates_for(ProcessingStage::Retry);
        assert_eq!(retries.len(), 1);
        assert_eq!(retries[0].description, "Retrying at lower quality (768px)...");
    }

    #[tokio::test]
    async fn test_exhaustion_after_lowest_tier() {
        let runner = Arc::new(ScriptedRunner::failing_at(&[1024, 768, 256]));
        let reporter = Arc::new(RecordingProgressReporter::new());
        let controller = TieredFallbackController::new(runner.clone(), TierLevel::High)
            .with_reporter(reporter.clone());

        let error = controller
            .remove_background_adaptive(&test_image())
            .await
            .unwrap_err();

        match error {
            IdPhotoError::BackgroundRemovalExhausted { attempts, last_error } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("out of memory"));
            },
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(runner.calls.lock().unwrap().len(), 3);
        assert_eq!(reporter.errors().len(), 1);
    }

    #[tokio::test]
    async fn test_starting_lower_never_climbs() {
        let runner = Arc::new(ScriptedRunner::failing_at(&[768, 256]));
        let controller = TieredFallbackController::new(runner.clone(), TierLevel::Medium);

        assert!(controller.remove_background_adaptive(&test_image()).await.is_err());

        let resolutions: Vec<u32> = runner.calls.lock().unwrap().iter().map(|c| c.0).collect();
        assert_eq!(resolutions, vec![768, 256]);
    }

    #[tokio::test]
    async fn test_wrong_mask_size_is_not_retried() {
        let runner = Arc::new(ScriptedRunner {
            mask_size_override: Some((3, 3)),
            ..ScriptedRunner::default()
        });
        let controller = TieredFallbackController::new(runner.clone(), TierLevel::High);

        let error = controller
            .remove_background_adaptive(&test_image())
            .await
            .unwrap_err();

        assert!(matches!(error, IdPhotoError::DimensionMismatch { .. }));
        assert_eq!(runner.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_non_transient_failure_stops_the_walk() {
        let runner = Arc::new(ScriptedRunner {
            fatal: true,
            ..ScriptedRunner::default()
        });
        let reporter = Arc::new(RecordingProgressReporter::new());
        let controller = TieredFallbackController::new(runner.clone(), TierLevel::High)
            .with_reporter(reporter.clone());

        let error = controller
            .remove_background_adaptive(&test_image())
            .await
            .unwrap_err();

        assert!(matches!(error, IdPhotoError::InvalidConfig(_)));
        assert_eq!(runner.calls.lock().unwrap().len(), 1);
        assert_eq!(*runner.discarded.lock().unwrap(), vec![ExecutionVenue::Isolated]);
        assert!(reporter.updates_for(ProcessingStage::Retry).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_timeout_steps_down_to_next_tier() {
        let loader = Arc::new(MockSegmentationLoader::new_hanging_load(1));
        let runner = Arc::new(InferenceExecutor::new(
            loader.clone(),
            ModelPrecision::Fp32,
            Timeouts::default(),
        ));
        let controller = TieredFallbackController::new(runner, TierLevel::High);
        let started = tokio::time::Instant::now();

        let cutout = controller.remove_background_adaptive(&test_image()).await.unwrap();

        assert_eq!(cutout.tier.level, TierLevel::Medium);
        assert_eq!(cutout.attempts.len(), 2);
        let first_error = cutout.attempts[0].error.as_deref().unwrap();
        assert_eq!(first_error, "Model load timed out after 120s");
        assert!(started.elapsed() >= Duration::from_secs(120));
        assert_eq!(loader.load_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_tier_timing_out_exhausts() {
        let loader = Arc::new(MockSegmentationLoader::new_hanging_load(usize::MAX));
        let runner = Arc::new(InferenceExecutor::new(
            loader,
            ModelPrecision::Fp32,
            Timeouts::default(),
        ));
        let controller = TieredFallbackController::new(runner, TierLevel::High);
        let started = tokio::time::Instant::now();

        let error = controller
            .remove_background_adaptive(&test_image())
            .await
            .unwrap_err();

        match error {
            IdPhotoError::BackgroundRemovalExhausted { attempts, last_error } => {
                assert_eq!(attempts, 3);
                assert_eq!(last_error, "Model load timed out after 120s");
            },
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert!(started.elapsed() >= Duration::from_secs(360));
    }
}
