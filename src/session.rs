//! Per-photo session state
//!
//! One session covers one source photo from upload to export. Components receive
//! the session explicitly; nothing survives [`SessionState::start`].

use crate::{
    compliance::ComplianceReport,
    error::{IdPhotoError, Result},
    face::FaceGeometry,
    presets::CompliancePreset,
    tier::MemoryTier,
    types::Size,
    utils::preprocessing::ImagePreprocessor,
};
use chrono::{DateTime, Utc};
use image::{DynamicImage, RgbaImage};
use uuid::Uuid;

/// Everything the pipeline knows about the photo being edited
#[derive(Debug, Clone)]
pub struct SessionState {
    id: Uuid,
    started_at: DateTime<Utc>,
    tier: MemoryTier,
    original_size: Option<Size>,
    working_image: Option<DynamicImage>,
    processed_image: Option<RgbaImage>,
    face: Option<FaceGeometry>,
    report: Option<ComplianceReport>,
    preset: Option<&'static CompliancePreset>,
}

impl SessionState {
    /// Empty session bound to the tier chosen for this device
    #[must_use]
    pub fn new(tier: MemoryTier) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            tier,
            original_size: None,
            working_image: None,
            processed_image: None,
            face: None,
            report: None,
            preset: None,
        }
    }

    /// Reset everything and load a new photo
    ///
    /// The photo is downscaled so its longest side fits the tier's maximum image
    /// dimension.
    pub fn start(&mut self, image: DynamicImage) {
        self.reset();
        self.original_size = Some(Size::new(image.width(), image.height()));
        let working = ImagePreprocessor::resize_to_max_dimension(image, self.tier.max_image_dimension);
        tracing::info!(
            session = %self.id,
            started_at = %self.started_at.to_rfc3339(),
            width = working.width(),
            height = working.height(),
            "session started"
        );
        self.working_image = Some(working);
    }

    /// Drop all per-photo data and take a fresh id
    pub fn reset(&mut self) {
        *self = Self::new(self.tier);
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// When the current photo was loaded (or the session created)
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn tier(&self) -> MemoryTier {
        self.tier
    }

    /// Size of the photo as uploaded, before downscaling
    #[must_use]
    pub fn original_size(&self) -> Option<Size> {
        self.original_size
    }

    #[must_use]
    pub fn working_image(&self) -> Option<&DynamicImage> {
        self.working_image.as_ref()
    }

    /// The working image, or an error when no photo was loaded
    ///
    /// # Errors
    /// - `InvalidConfig` before [`Self::start`]
    pub fn require_working_image(&self) -> Result<&DynamicImage> {
        self.working_image
            .as_ref()
            .ok_or_else(|| IdPhotoError::invalid_config("No photo loaded in this session"))
    }

    #[must_use]
    pub fn processed_image(&self) -> Option<&RgbaImage> {
        self.processed_image.as_ref()
    }

    pub fn set_processed_image(&mut self, image: RgbaImage) {
        self.processed_image = Some(image);
    }

    /// The image later steps should work on: the cutout if there is one
    #[must_use]
    pub fn current_image(&self) -> Option<DynamicImage> {
        match (&self.processed_image, &self.working_image) {
            (Some(processed), _) => Some(DynamicImage::ImageRgba8(processed.clone())),
            (None, Some(working)) => Some(working.clone()),
            (None, None) => None,
        }
    }

    #[must_use]
    pub fn face(&self) -> Option<&FaceGeometry> {
        self.face.as_ref()
    }

    pub fn set_face(&mut self, face: Option<FaceGeometry>) {
        self.face = face;
    }

    #[must_use]
    pub fn report(&self) -> Option<&ComplianceReport> {
        self.report.as_ref()
    }

    pub fn set_report(&mut self, report: ComplianceReport) {
        self.report = Some(report);
    }

    #[must_use]
    pub fn preset(&self) -> Option<&'static CompliancePreset> {
        self.preset
    }

    /// Select a preset; any previous compliance report no longer applies
    pub fn select_preset(&mut self, preset: &'static CompliancePreset) {
        self.preset = Some(preset);
        self.report = None;
    }
}
