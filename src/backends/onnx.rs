//! ONNX Runtime segmentation backend
//!
//! Uses the CPU execution provider by default; CUDA and CoreML are registered
//! when ONNX Runtime reports them available and fall back silently otherwise.

use crate::{
    config::ModelPrecision,
    download::ModelDownloader,
    error::{IdPhotoError, Result},
    inference::{ProgressCallback, SegmentationBackend, SegmentationModelLoader},
};
use async_trait::async_trait;
use instant::Instant;
use ndarray::Array4;
use ort::execution_providers::{CUDAExecutionProvider, CoreMLExecutionProvider};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use std::path::Path;

/// Segmentation model held by an ONNX Runtime session
#[derive(Debug)]
pub struct OnnxSegmentationBackend {
    session: Session,
    precision: ModelPrecision,
}

impl OnnxSegmentationBackend {
    /// Build a session from a model file
    ///
    /// # Errors
    /// - Session creation or model parsing failures
    pub fn from_path(path: &Path, precision: ModelPrecision) -> Result<Self> {
        let started = Instant::now();
        let intra_threads = std::thread::available_parallelism()
            .map(std::num::NonZero::get)
            .unwrap_or(1);

        let session = Session::builder()
            .map_err(|e| IdPhotoError::model_load(format!("Failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| IdPhotoError::model_load(format!("Failed to set optimization level: {e}")))?
            .with_execution_providers([
                CUDAExecutionProvider::default().build(),
                CoreMLExecutionProvider::default().build(),
            ])
            .map_err(|e| IdPhotoError::model_load(format!("Failed to register providers: {e}")))?
            .with_intra_threads(intra_threads)
            .map_err(|e| IdPhotoError::model_load(format!("Failed to set intra threads: {e}")))?
            .commit_from_file(path)
            .map_err(|e| {
                IdPhotoError::model_load(format!(
                    "Failed to create session from {}: {e}",
                    path.display()
                ))
            })?;

        log::info!(
            "ONNX Runtime session ready ({precision}, {intra_threads} threads) in {}ms",
            started.elapsed().as_millis()
        );
        Ok(Self { session, precision })
    }
}

impl SegmentationBackend for OnnxSegmentationBackend {
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let started = Instant::now();
        let input_value = Value::from_array(input.clone())
            .map_err(|e| IdPhotoError::inference(format!("Failed to convert input tensor: {e}")))?;

        let outputs = self
            .session
            .run(ort::inputs![input_value])
            .map_err(|e| IdPhotoError::inference(format!("ONNX inference failed: {e}")))?;

        let first_key = outputs
            .keys()
            .next()
            .ok_or_else(|| IdPhotoError::inference("No output tensors found"))?
            .to_string();
        let output = outputs
            .get(&first_key)
            .ok_or_else(|| IdPhotoError::inference("First output tensor not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| IdPhotoError::inference(format!("Failed to extract output tensor: {e}")))?;

        let shape = output.shape().to_vec();
        let dims = match shape.as_slice() {
            [n, c, h, w] => (*n, *c, *h, *w),
            [n, h, w] => (*n, 1, *h, *w),
            _ => {
                return Err(IdPhotoError::inference(format!(
                    "Expected 3D or 4D output tensor, got shape {shape:?}"
                )))
            },
        };
        let result = Array4::from_shape_vec(dims, output.iter().copied().collect())
            .map_err(|e| IdPhotoError::inference(format!("Failed to reshape output tensor: {e}")))?;

        log::debug!(
            "ONNX segmentation {:?} -> {:?} in {}ms",
            input.shape(),
            result.shape(),
            started.elapsed().as_millis()
        );
        Ok(result)
    }

    fn precision(&self) -> ModelPrecision {
        self.precision
    }
}

/// Downloads weights into the cache and builds [`OnnxSegmentationBackend`]s
#[derive(Debug, Clone)]
pub struct OnnxSegmentationLoader {
    downloader: ModelDownloader,
    repo_url: String,
}

impl OnnxSegmentationLoader {
    #[must_use]
    pub fn new(downloader: ModelDownloader, repo_url: impl Into<String>) -> Self {
        Self {
            downloader,
            repo_url: repo_url.into(),
        }
    }
}

#[async_trait]
impl SegmentationModelLoader for OnnxSegmentationLoader {
    async fn load(
        &self,
        precision: ModelPrecision,
        progress: ProgressCallback,
    ) -> Result<Box<dyn SegmentationBackend>> {
        let path = self
            .downloader
            .ensure_model(&self.repo_url, precision, &progress)
            .await?;

        let backend =
            tokio::task::spawn_blocking(move || OnnxSegmentationBackend::from_path(&path, precision))
                .await
                .map_err(|e| IdPhotoError::model_load(format!("Session build task aborted: {e}")))??;
        Ok(Box::new(backend))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_file_is_model_load_error() {
        let result =
            OnnxSegmentationBackend::from_path(Path::new("/nonexistent/model.onnx"), ModelPrecision::Fp16);
        assert!(matches!(result, Err(IdPhotoError::ModelLoad(_))));
    }
}
