//! Face landmark model abstraction and the landmark indices used for geometry

use crate::{config::LandmarkConfig, error::Result};
use async_trait::async_trait;
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Number of points in a face-mesh landmark set
pub const LANDMARK_COUNT: usize = 468;

/// Landmark indices in the face-mesh topology
pub mod index {
    /// Top of the forehead, at the hairline
    pub const FOREHEAD: usize = 10;
    pub const CHIN: usize = 152;
    /// Inner corner of the subject's left eye (image right)
    pub const LEFT_EYE_INNER: usize = 362;
    /// Inner corner of the subject's right eye (image left)
    pub const RIGHT_EYE_INNER: usize = 133;
    /// Cheek edge on the image right
    pub const FACE_RIGHT: usize = 454;
    /// Cheek edge on the image left
    pub const FACE_LEFT: usize = 234;
}

/// Landmark with x/y normalized to the image size (0.0-1.0)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizedLandmark {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// A loaded landmark detector
pub trait LandmarkModel: Send {
    /// Detect one face, returning its normalized landmark set
    ///
    /// `Ok(None)` means no face met the confidence thresholds.
    ///
    /// # Errors
    /// - Model execution or output decoding failures
    fn detect(&mut self, image: &RgbImage) -> Result<Option<Vec<NormalizedLandmark>>>;
}

/// Builds a [`LandmarkModel`] from configuration
#[async_trait]
pub trait LandmarkModelLoader: Send + Sync {
    /// # Errors
    /// - Model file missing or unreadable
    /// - Model parsing failures
    async fn load(&self, config: &LandmarkConfig) -> Result<Box<dyn LandmarkModel>>;
}
