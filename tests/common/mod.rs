//! In-memory model runtimes shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use idphoto_pipeline::{
    face::{index, LANDMARK_COUNT},
    IdPhotoError, LandmarkConfig, LandmarkModel, LandmarkModelLoader, ModelPrecision,
    NormalizedLandmark, ProgressCallback, Result, SegmentationBackend, SegmentationModelLoader,
};
use image::RgbImage;
use ndarray::Array4;
use std::sync::{Arc, Mutex};

/// Route library `log` output through the test harness
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Segmentation backend that runs out of memory above a resolution cap
pub struct CappedBackend {
    max_resolution: usize,
    seen: Arc<Mutex<Vec<usize>>>,
    precision: ModelPrecision,
}

impl SegmentationBackend for CappedBackend {
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let size = input.shape()[2];
        self.seen.lock().unwrap().push(size);
        if size > self.max_resolution {
            return Err(IdPhotoError::inference(format!(
                "out of memory at {size}px"
            )));
        }
        Ok(Array4::<f32>::ones((1, 1, size, size)))
    }

    fn precision(&self) -> ModelPrecision {
        self.precision
    }
}

/// Loader for [`CappedBackend`]s that records every forward-pass resolution
#[derive(Default)]
pub struct CappedLoader {
    max_resolution: usize,
    seen: Arc<Mutex<Vec<usize>>>,
}

impl CappedLoader {
    pub fn new(max_resolution: usize) -> Self {
        Self {
            max_resolution,
            seen: Arc::default(),
        }
    }

    /// Resolutions the backends were asked to run at, in order
    pub fn resolutions(&self) -> Vec<usize> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl SegmentationModelLoader for CappedLoader {
    async fn load(
        &self,
        precision: ModelPrecision,
        progress: ProgressCallback,
    ) -> Result<Box<dyn SegmentationBackend>> {
        progress(100);
        Ok(Box::new(CappedBackend {
            max_resolution: self.max_resolution,
            seen: Arc::clone(&self.seen),
            precision,
        }))
    }
}

#[derive(Clone)]
struct FixedLandmarkModel {
    landmarks: Option<Vec<NormalizedLandmark>>,
}

impl LandmarkModel for FixedLandmarkModel {
    fn detect(&mut self, _image: &RgbImage) -> Result<Option<Vec<NormalizedLandmark>>> {
        Ok(self.landmarks.clone())
    }
}

/// Landmark loader whose model always reports the same result
pub struct FixedLandmarkLoader {
    model: FixedLandmarkModel,
}

impl FixedLandmarkLoader {
    /// A frontal, upright face in the middle of the image
    pub fn centered_face() -> Self {
        let mut landmarks = vec![NormalizedLandmark::default(); LANDMARK_COUNT];
        let points = [
            (index::FOREHEAD, 0.5, 0.35),
            (index::CHIN, 0.5, 0.65),
            (index::LEFT_EYE_INNER, 0.54, 0.45),
            (index::RIGHT_EYE_INNER, 0.46, 0.45),
            (index::FACE_RIGHT, 0.6, 0.5),
            (index::FACE_LEFT, 0.4, 0.5),
        ];
        for (i, x, y) in points {
            landmarks[i] = NormalizedLandmark { x, y, z: 0.0 };
        }
        Self {
            model: FixedLandmarkModel {
                landmarks: Some(landmarks),
            },
        }
    }

    /// A model that never finds a face
    pub fn no_face() -> Self {
        Self {
            model: FixedLandmarkModel { landmarks: None },
        }
    }
}

#[async_trait]
impl LandmarkModelLoader for FixedLandmarkLoader {
    async fn load(&self, _config: &LandmarkConfig) -> Result<Box<dyn LandmarkModel>> {
        Ok(Box::new(self.model.clone()))
    }
}
