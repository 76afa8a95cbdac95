//! Face geometry detection
//!
//! Runs a landmark model over the working image and derives the face box, the
//! estimated head extent, the eye center and the roll angle. All geometry is in
//! source-image pixel space.

mod landmarks;

pub use landmarks::{
    index, LandmarkModel, LandmarkModelLoader, NormalizedLandmark, LANDMARK_COUNT,
};

use crate::{
    config::LandmarkConfig,
    error::{IdPhotoError, Result},
    types::{Point, Rect, Size},
};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Face geometry in source-image pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceGeometry {
    pub eye_center: Point,
    /// Forehead to chin, cheek to cheek
    pub face_bounds: Rect,
    /// Estimated top of the skull, never above the image
    pub estimated_head_top: f64,
    /// Skull top to chin
    pub estimated_head_height: f64,
    /// Positive when the image-right eye sits lower
    pub roll_angle_degrees: f64,
    pub source_image_size: Size,
}

impl FaceGeometry {
    #[must_use]
    pub fn face_center_x(&self) -> f64 {
        self.face_bounds.center_x()
    }
}

/// Derive [`FaceGeometry`] from a normalized landmark set
///
/// `head_top_extension` is the share of face height added above the forehead
/// landmark to reach the top of the skull.
///
/// # Errors
/// - The landmark set is missing one of the required indices
pub fn geometry_from_landmarks(
    landmarks: &[NormalizedLandmark],
    image_size: Size,
    head_top_extension: f64,
) -> Result<FaceGeometry> {
    let width = f64::from(image_size.width);
    let height = f64::from(image_size.height);
    let point = |i: usize| -> Result<NormalizedLandmark> {
        landmarks.get(i).copied().ok_or_else(|| {
            IdPhotoError::inference(format!(
                "Landmark {i} missing from a set of {}",
                landmarks.len()
            ))
        })
    };

    let forehead = point(index::FOREHEAD)?;
    let chin = point(index::CHIN)?;
    let left_eye = point(index::LEFT_EYE_INNER)?;
    let right_eye = point(index::RIGHT_EYE_INNER)?;
    let face_right = point(index::FACE_RIGHT)?;
    let face_left = point(index::FACE_LEFT)?;

    let eye_center = Point::new(left_eye.x * width, left_eye.y * height)
        .midpoint(Point::new(right_eye.x * width, right_eye.y * height));

    let face_top = forehead.y * height;
    let face_bottom = chin.y * height;
    let face_bounds =
        Rect::from_edges(face_left.x * width, face_top, face_right.x * width, face_bottom);

    let head_top = (face_top - face_bounds.height * head_top_extension).max(0.0);

    let roll_angle_degrees = ((left_eye.y - right_eye.y) * height)
        .atan2((left_eye.x - right_eye.x) * width)
        .to_degrees();

    Ok(FaceGeometry {
        eye_center,
        face_bounds,
        estimated_head_top: head_top,
        estimated_head_height: face_bottom - head_top,
        roll_angle_degrees,
        source_image_size: image_size,
    })
}

/// Lazily loaded landmark detector
///
/// The model is released explicitly once detection is no longer needed; a later
/// `detect` reloads it.
pub struct FaceGeometryDetector {
    loader: Arc<dyn LandmarkModelLoader>,
    config: LandmarkConfig,
    head_top_extension: f64,
    model: Mutex<Option<Box<dyn LandmarkModel>>>,
}

impl std::fmt::Debug for FaceGeometryDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaceGeometryDetector")
            .field("config", &self.config)
            .field("head_top_extension", &self.head_top_extension)
            .finish_non_exhaustive()
    }
}

impl FaceGeometryDetector {
    #[must_use]
    pub fn new(
        loader: Arc<dyn LandmarkModelLoader>,
        config: LandmarkConfig,
        head_top_extension: f64,
    ) -> Self {
        Self {
            loader,
            config,
            head_top_extension,
            model: Mutex::new(None),
        }
    }

    /// Detect the face, or `None` when there is none
    ///
    /// # Errors
    /// - Landmark model load or execution failures
    #[tracing::instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub async fn detect(&self, image: &DynamicImage) -> Result<Option<FaceGeometry>> {
        let mut slot = self.model.lock().await;
        let mut model = match slot.take() {
            Some(model) => model,
            None => {
                tracing::debug!("loading face landmark model");
                self.loader.load(&self.config).await?
            },
        };

        let rgb = image.to_rgb8();
        let size = Size::new(rgb.width(), rgb.height());
        let (model, detected) = tokio::task::spawn_blocking(move || {
            let detected = model.detect(&rgb);
            (model, detected)
        })
        .await
        .map_err(|e| IdPhotoError::inference(format!("Landmark task aborted: {e}")))?;
        *slot = Some(model);

        let Some(landmarks) = detected? else {
            tracing::info!("no face detected");
            return Ok(None);
        };

        let geometry = geometry_from_landmarks(&landmarks, size, self.head_top_extension)?;
        tracing::info!(
            roll = geometry.roll_angle_degrees,
            head_height = geometry.estimated_head_height,
            "face detected"
        );
        Ok(Some(geometry))
    }

    /// Free the landmark model
    pub async fn release(&self) {
        if self.model.lock().await.take().is_some() {
            tracing::debug!("face landmark model released");
        }
    }

    /// Whether the landmark model is resident
    pub async fn is_loaded(&self) -> bool {
        self.model.lock().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::{MockLandmarkLoader, MockLandmarkModel};
    use image::RgbImage;

    fn level_face() -> Vec<(usize, f64, f64)> {
        vec![
            (index::FOREHEAD, 0.5, 0.3),
            (index::CHIN, 0.5, 0.7),
            (index::LEFT_EYE_INNER, 0.55, 0.45),
            (index::RIGHT_EYE_INNER, 0.45, 0.45),
            (index::FACE_RIGHT, 0.7, 0.5),
            (index::FACE_LEFT, 0.3, 0.5),
        ]
    }

    fn landmarks_from(points: &[(usize, f64, f64)]) -> Vec<NormalizedLandmark> {
        let mut landmarks = vec![NormalizedLandmark::default(); LANDMARK_COUNT];
        for &(i, x, y) in points {
            landmarks[i] = NormalizedLandmark { x, y, z: 0.0 };
        }
        landmarks
    }

    #[test]
    fn test_geometry_from_level_face() {
        let landmarks = landmarks_from(&level_face());
        let geometry = geometry_from_landmarks(&landmarks, Size::new(1000, 1000), 0.25).unwrap();

        assert!((geometry.face_bounds.top() - 300.0).abs() < 1e-9);
        assert!((geometry.face_bounds.bottom() - 700.0).abs() < 1e-9);
        assert!((geometry.face_bounds.left() - 300.0).abs() < 1e-9);
        assert!((geometry.face_bounds.right() - 700.0).abs() < 1e-9);
        assert!((geometry.estimated_head_top - 200.0).abs() < 1e-9);
        assert!((geometry.estimated_head_height - 500.0).abs() < 1e-9);
        assert!((geometry.eye_center.x - 500.0).abs() < 1e-9);
        assert!((geometry.eye_center.y - 450.0).abs() < 1e-9);
        assert!(geometry.roll_angle_degrees.abs() < 1e-9);
    }

    #[test]
    fn test_head_top_clamped_at_zero() {
        let mut points = level_face();
        points[0] = (index::FOREHEAD, 0.5, 0.02);
        let geometry =
            geometry_from_landmarks(&landmarks_from(&points), Size::new(800, 600), 0.25).unwrap();
        assert_eq!(geometry.estimated_head_top, 0.0);
    }

    #[test]
    fn test_roll_sign_and_aspect_scaling() {
        let mut points = level_face();
        // image-right eye 10px lower on a 1000px-tall image, 100px apart horizontally
        points[2] = (index::LEFT_EYE_INNER, 0.55, 0.46);
        let geometry =
            geometry_from_landmarks(&landmarks_from(&points), Size::new(1000, 1000), 0.25)
                .unwrap();
        let expected = (10.0_f64).atan2(100.0).to_degrees();
        assert!((geometry.roll_angle_degrees - expected).abs() < 1e-9);
        assert!(geometry.roll_angle_degrees > 0.0);
    }

    #[test]
    fn test_short_landmark_set_is_an_error() {
        let landmarks = vec![NormalizedLandmark::default(); 100];
        assert!(geometry_from_landmarks(&landmarks, Size::new(10, 10), 0.25).is_err());
    }

    #[tokio::test]
    async fn test_no_face_is_none_not_error() {
        let loader = Arc::new(MockLandmarkLoader::new(MockLandmarkModel::without_face()));
        let detector = FaceGeometryDetector::new(loader, LandmarkConfig::default(), 0.25);

        let image = DynamicImage::ImageRgb8(RgbImage::new(64, 64));
        assert!(detector.detect(&image).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_release_then_detect_reloads() {
        let loader = Arc::new(MockLandmarkLoader::new(MockLandmarkModel::with_face(
            &level_face(),
        )));
        let detector = FaceGeometryDetector::new(loader.clone(), LandmarkConfig::default(), 0.25);
        let image = DynamicImage::ImageRgb8(RgbImage::new(200, 100));

        let first = detector.detect(&image).await.unwrap().unwrap();
        detector.detect(&image).await.unwrap();
        assert_eq!(loader.load_count(), 1);
        assert!(detector.is_loaded().await);

        detector.release().await;
        assert!(!detector.is_loaded().await);

        let again = detector.detect(&image).await.unwrap().unwrap();
        assert_eq!(loader.load_count(), 2);
        assert_eq!(first, again);
        assert_eq!(again.source_image_size, Size::new(200, 100));
    }
}
