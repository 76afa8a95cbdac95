//! One-click ID photo pipeline
//!
//! Face detection, background removal, auto-crop and compliance run strictly in
//! sequence. The landmark model is released before segmentation starts so the two
//! models are never resident together.

use crate::{
    compliance::{self, ComplianceReport},
    config::{PipelineConfig, RemovalMode},
    crop::{apply_auto_crop, CropBox, FixedCropBox},
    error::{IdPhotoError, Result},
    executor::InferenceRunner,
    face::{FaceGeometry, FaceGeometryDetector, LandmarkModelLoader},
    fallback::TieredFallbackController,
    presets::CompliancePreset,
    remote::RemoteRemovalService,
    services::progress::{NoOpProgressReporter, ProcessingStage, ProgressReporter, ProgressUpdate},
    session::SessionState,
    tier::MemoryTier,
    types::{Rect, Size},
};
use image::{DynamicImage, RgbaImage};
use instant::Instant;
use std::sync::Arc;

/// Status shown when no face is found
pub const NO_FACE_MESSAGE: &str = "No face detected. Please use manual steps.";
/// Status shown when every compliance check passes
pub const ALL_PASSED_MESSAGE: &str = "ID photo generated. All compliance checks passed!";
/// Status shown when at least one compliance check fails
pub const REVIEW_WARNINGS_MESSAGE: &str = "ID photo generated. Review compliance warnings below.";

/// How the background step was satisfied
#[derive(Debug, Clone, PartialEq)]
pub enum BackgroundOutcome {
    /// On-device segmentation
    Local { tier: MemoryTier, attempts: usize },
    /// Remote service
    Remote { endpoint: String },
    /// Background kept as is
    Skipped,
}

/// Result of a completed one-click run
#[derive(Debug, Clone)]
pub struct OneClickResult {
    pub face: FaceGeometry,
    pub background: BackgroundOutcome,
    /// Applied crop in display space
    pub crop_display: Rect,
    /// Applied crop in source pixels
    pub crop_source: Rect,
    pub report: ComplianceReport,
    /// User-facing status line
    pub message: String,
}

/// Outcome of a one-click run
#[derive(Debug, Clone)]
pub enum OneClickOutcome {
    Completed(Box<OneClickResult>),
    /// Expected absence: the caller should fall back to the manual workflow
    NoFaceDetected { message: String },
}

/// Sequences face detection, background removal, auto-crop and compliance
pub struct OneClickPipeline {
    config: PipelineConfig,
    detector: FaceGeometryDetector,
    fallback: TieredFallbackController,
    remote: Option<RemoteRemovalService>,
    reporter: Arc<dyn ProgressReporter>,
}

impl std::fmt::Debug for OneClickPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OneClickPipeline")
            .field("removal_mode", &self.config.removal_mode)
            .field("fallback", &self.fallback)
            .field("remote", &self.remote)
            .finish_non_exhaustive()
    }
}

impl OneClickPipeline {
    /// Build a pipeline whose local removal starts at `tier`
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Failed to create the HTTP client for remote modes
    pub fn new(
        config: PipelineConfig,
        landmark_loader: Arc<dyn LandmarkModelLoader>,
        runner: Arc<dyn InferenceRunner>,
        tier: MemoryTier,
    ) -> Result<Self> {
        config.validate()?;
        tracing::info!(
            tier = %tier.level,
            resolution = tier.processor_resolution,
            max_dimension = tier.max_image_dimension,
            venue = %tier.venue,
            mode = %config.removal_mode,
            "memory tier selected"
        );

        let detector = FaceGeometryDetector::new(
            landmark_loader,
            config.landmarks.clone(),
            config.framing.head_top_extension,
        );
        let remote = RemoteRemovalService::from_mode(&config.removal_mode, &config.timeouts)?;
        Ok(Self {
            detector,
            fallback: TieredFallbackController::new(runner, tier.level),
            remote,
            reporter: Arc::new(NoOpProgressReporter),
            config,
        })
    }

    /// Send status updates to `reporter`
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.fallback = self.fallback.with_reporter(Arc::clone(&reporter));
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Headless crop box over the session's working image at the preset's aspect
    ///
    /// # Errors
    /// - No photo loaded in the session
    /// - Non-positive viewport
    pub fn crop_box_for(
        &self,
        session: &SessionState,
        preset: &CompliancePreset,
    ) -> Result<FixedCropBox> {
        let image = session.require_working_image()?;
        FixedCropBox::new(
            Size::new(image.width(), image.height()),
            self.config.viewport.width,
            self.config.viewport.height,
            preset.target_aspect_ratio(),
        )
    }

    /// Run the whole pipeline with a headless crop box
    ///
    /// # Errors
    /// - Same as [`Self::run_with_crop_box`]
    pub async fn run(
        &self,
        session: &mut SessionState,
        preset: &'static CompliancePreset,
    ) -> Result<OneClickOutcome> {
        let mut crop_box = self.crop_box_for(session, preset)?;
        self.run_with_crop_box(session, preset, &mut crop_box).await
    }

    /// Run the whole pipeline, applying the crop through `crop_box`
    ///
    /// No face is not an error: it yields [`OneClickOutcome::NoFaceDetected`].
    ///
    /// # Errors
    /// - `BackgroundRemovalExhausted` when every tier failed
    /// - `ServiceUnavailable` when the remote service does not answer its probe
    /// - `DimensionMismatch` / `MissingCropDimensions` on contract violations
    #[tracing::instrument(skip_all, fields(session = %session.id(), preset = preset.id))]
    pub async fn run_with_crop_box(
        &self,
        session: &mut SessionState,
        preset: &'static CompliancePreset,
        crop_box: &mut dyn CropBox,
    ) -> Result<OneClickOutcome> {
        let started = Instant::now();
        session.select_preset(preset);
        let image = session.require_working_image()?.clone();

        self.report(ProcessingStage::FaceDetection, started);
        let detected = self.detector.detect(&image).await;
        // Free the landmark model before segmentation needs the memory
        self.detector.release().await;
        let face = match self.stage(ProcessingStage::FaceDetection, detected)? {
            Some(face) => face,
            None => {
                self.reporter
                    .report_error(ProcessingStage::FaceDetection, NO_FACE_MESSAGE);
                session.set_face(None);
                return Ok(OneClickOutcome::NoFaceDetected {
                    message: NO_FACE_MESSAGE.to_string(),
                });
            },
        };
        session.set_face(Some(face));

        self.report(ProcessingStage::BackgroundRemoval, started);
        let (processed, background) = match self.remove_background(&image).await {
            Ok(done) => done,
            Err(error) => {
                // Exhaustion was already reported by the fallback controller
                if !matches!(error, IdPhotoError::BackgroundRemovalExhausted { .. }) {
                    self.reporter
                        .report_error(ProcessingStage::BackgroundRemoval, &error.user_message());
                }
                return Err(error);
            },
        };
        session.set_processed_image(processed);

        self.report(ProcessingStage::AutoCrop, started);
        let applied = apply_auto_crop(&face, crop_box, &self.config.framing);
        let crop_display = self.stage(ProcessingStage::AutoCrop, applied)?;
        let crop_source = crop_box.source_crop();

        self.report(ProcessingStage::Compliance, started);
        let report = self.stage(
            ProcessingStage::Compliance,
            compliance::check(&face, crop_source, preset, &self.config.framing),
        )?;
        session.set_report(report.clone());

        let message = if report.all_passed {
            ALL_PASSED_MESSAGE
        } else {
            REVIEW_WARNINGS_MESSAGE
        }
        .to_string();
        let elapsed_ms = started.elapsed().as_millis() as u64;
        self.reporter.report_completion(&message, elapsed_ms);
        tracing::info!(
            all_passed = report.all_passed,
            failed = report.failures().count(),
            elapsed_ms,
            "one-click run complete"
        );

        Ok(OneClickOutcome::Completed(Box::new(OneClickResult {
            face,
            background,
            crop_display,
            crop_source,
            report,
            message,
        })))
    }

    /// Re-run compliance for the session's face against the crop box as it is now
    ///
    /// Returns `Ok(None)` when the session has no face or no preset.
    ///
    /// # Errors
    /// - `MissingCropDimensions` when the crop box holds an empty rectangle
    pub fn recheck(
        &self,
        session: &mut SessionState,
        crop_box: &dyn CropBox,
    ) -> Result<Option<ComplianceReport>> {
        let (Some(face), Some(preset)) = (session.face().copied(), session.preset()) else {
            return Ok(None);
        };
        let report =
            compliance::check(&face, crop_box.source_crop(), preset, &self.config.framing)?;
        session.set_report(report.clone());
        Ok(Some(report))
    }

    async fn remove_background(
        &self,
        image: &DynamicImage,
    ) -> Result<(RgbaImage, BackgroundOutcome)> {
        match (&self.config.removal_mode, &self.remote) {
            (RemovalMode::Skip, _) => Ok((image.to_rgba8(), BackgroundOutcome::Skipped)),
            (RemovalMode::Remote { .. } | RemovalMode::ThirdParty { .. }, Some(remote)) => {
                if !remote.probe().await {
                    return Err(IdPhotoError::ServiceUnavailable(remote.endpoint().to_string()));
                }
                let cutout = remote.remove(image).await?;
                let expected = (image.width(), image.height());
                if cutout.dimensions() != expected {
                    return Err(IdPhotoError::DimensionMismatch {
                        expected,
                        actual: cutout.dimensions(),
                    });
                }
                Ok((
                    cutout,
                    BackgroundOutcome::Remote {
                        endpoint: remote.endpoint().to_string(),
                    },
                ))
            },
            _ => {
                let cutout = self.fallback.remove_background_adaptive(image).await?;
                Ok((
                    cutout.image,
                    BackgroundOutcome::Local {
                        tier: cutout.tier,
                        attempts: cutout.attempts.len(),
                    },
                ))
            },
        }
    }

    fn report(&self, stage: ProcessingStage, started: Instant) {
        self.reporter.report_progress(ProgressUpdate::new(stage, started));
    }

    /// Report a failed stage before handing the error back
    fn stage<T>(&self, stage: ProcessingStage, result: Result<T>) -> Result<T> {
        result.map_err(|error| {
            self.reporter.report_error(stage, &error.user_message());
            error
        })
    }
}
