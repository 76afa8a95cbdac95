//! Mock model runtimes for unit tests
//!
//! These stand in for the Tract/ONNX backends so executor, fallback and face
//! detection logic can be tested without model files.

use crate::{
    config::{LandmarkConfig, ModelPrecision},
    error::{IdPhotoError, Result},
    face::{LandmarkModel, LandmarkModelLoader, NormalizedLandmark, LANDMARK_COUNT},
    inference::{ProgressCallback, SegmentationBackend, SegmentationModelLoader},
};
use async_trait::async_trait;
use image::RgbImage;
use ndarray::Array4;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

/// Mock segmentation backend producing a centered circular mask
#[derive(Debug, Clone)]
pub struct MockSegmentationBackend {
    precision: ModelPrecision,
    call_history: Arc<Mutex<Vec<usize>>>,
    should_fail_inference: bool,
    inference_delay: Option<Duration>,
}

impl MockSegmentationBackend {
    #[must_use]
    pub fn new(precision: ModelPrecision) -> Self {
        Self {
            precision,
            call_history: Arc::new(Mutex::new(Vec::new())),
            should_fail_inference: false,
            inference_delay: None,
        }
    }

    /// Create a mock backend that fails every forward pass
    #[must_use]
    pub fn new_failing_inference(precision: ModelPrecision) -> Self {
        let mut backend = Self::new(precision);
        backend.should_fail_inference = true;
        backend
    }

    /// Input resolutions seen so far
    pub fn get_call_history(&self) -> Vec<usize> {
        self.call_history.lock().unwrap().clone()
    }

    fn generate_mock_output(size: usize) -> Array4<f32> {
        let mut output = Array4::<f32>::zeros((1, 1, size, size));
        let center = size as f32 / 2.0;
        let radius = (size as f32 / 3.0).max(1.0);

        for y in 0..size {
            for x in 0..size {
                let dx = x as f32 - center;
                let dy = y as f32 - center;
                if (dx * dx + dy * dy).sqrt() < radius {
                    output[[0, 0, y, x]] = 1.0;
                }
            }
        }
        output
    }
}

impl SegmentationBackend for MockSegmentationBackend {
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let size = input.shape()[2];
        self.call_history.lock().unwrap().push(size);
        if let Some(delay) = self.inference_delay {
            std::thread::sleep(delay);
        }
        if self.should_fail_inference {
            return Err(IdPhotoError::inference("Mock inference failure"));
        }
        Ok(Self::generate_mock_output(size))
    }

    fn precision(&self) -> ModelPrecision {
        self.precision
    }
}

/// Mock loader counting how many times weights were loaded
#[derive(Debug, Default)]
pub struct MockSegmentationLoader {
    loads: AtomicUsize,
    should_fail_load: bool,
    should_fail_inference: bool,
    /// Number of initial loads that never complete
    hanging_loads: usize,
    inference_delay: Option<Duration>,
}

impl MockSegmentationLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loader whose every load fails
    #[must_use]
    pub fn new_failing_load() -> Self {
        Self {
            should_fail_load: true,
            ..Self::default()
        }
    }

    /// Loader whose backends fail every forward pass
    #[must_use]
    pub fn new_failing_inference() -> Self {
        Self {
            should_fail_inference: true,
            ..Self::default()
        }
    }

    /// Loader whose first `count` loads hang forever
    #[must_use]
    pub fn new_hanging_load(count: usize) -> Self {
        Self {
            hanging_loads: count,
            ..Self::default()
        }
    }

    /// Loader whose backends block every forward pass for `delay`
    #[must_use]
    pub fn new_slow_inference(delay: Duration) -> Self {
        Self {
            inference_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SegmentationModelLoader for MockSegmentationLoader {
    async fn load(
        &self,
        precision: ModelPrecision,
        progress: ProgressCallback,
    ) -> Result<Box<dyn SegmentationBackend>> {
        let previous = self.loads.fetch_add(1, Ordering::SeqCst);
        if previous < self.hanging_loads {
            std::future::pending::<()>().await;
        }
        if self.should_fail_load {
            return Err(IdPhotoError::model_load("Mock weight fetch failure"));
        }
        for percent in [0, 50, 100] {
            progress(percent);
        }
        let mut backend = if self.should_fail_inference {
            MockSegmentationBackend::new_failing_inference(precision)
        } else {
            MockSegmentationBackend::new(precision)
        };
        backend.inference_delay = self.inference_delay;
        Ok(Box::new(backend))
    }
}

/// Mock landmark model returning a fixed landmark set, or no face
#[derive(Debug, Clone)]
pub struct MockLandmarkModel {
    landmarks: Option<Vec<NormalizedLandmark>>,
}

impl MockLandmarkModel {
    /// Model that always finds a face with the given landmark overrides
    #[must_use]
    pub fn with_face(points: &[(usize, f64, f64)]) -> Self {
        let mut landmarks = vec![NormalizedLandmark::default(); LANDMARK_COUNT];
        for &(index, x, y) in points {
            if let Some(slot) = landmarks.get_mut(index) {
                *slot = NormalizedLandmark { x, y, z: 0.0 };
            }
        }
        Self {
            landmarks: Some(landmarks),
        }
    }

    /// Model that never finds a face
    #[must_use]
    pub fn without_face() -> Self {
        Self { landmarks: None }
    }
}

impl LandmarkModel for MockLandmarkModel {
    fn detect(&mut self, _image: &RgbImage) -> Result<Option<Vec<NormalizedLandmark>>> {
        Ok(self.landmarks.clone())
    }
}

/// Loader handing out clones of a mock landmark model
#[derive(Debug)]
pub struct MockLandmarkLoader {
    model: MockLandmarkModel,
    loads: AtomicUsize,
}

impl MockLandmarkLoader {
    #[must_use]
    pub fn new(model: MockLandmarkModel) -> Self {
        Self {
            model,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LandmarkModelLoader for MockLandmarkLoader {
    async fn load(&self, _config: &LandmarkConfig) -> Result<Box<dyn LandmarkModel>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.model.clone()))
    }
}
