//! Segmentation runtime abstraction
//!
//! Concrete runtimes (Tract, ONNX Runtime) live under `backends`; the executor only
//! sees these traits, so tests can substitute in-memory models.

use crate::{config::ModelPrecision, error::Result};
use async_trait::async_trait;
use ndarray::Array4;
use std::sync::Arc;

/// Whole-percent progress callback used while model weights download
pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync>;

/// Progress callback that ignores every update
#[must_use]
pub fn silent_progress() -> ProgressCallback {
    Arc::new(|_| {})
}

/// A loaded segmentation model
pub trait SegmentationBackend: Send {
    /// Run the forward pass
    ///
    /// Input is a normalized NCHW tensor `[1, 3, S, S]`; output is a per-pixel
    /// foreground probability map `[1, 1, S, S]` in 0.0-1.0.
    ///
    /// # Errors
    /// - Model inference failures
    /// - Unexpected output tensor shape
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Precision of the weights this backend holds
    fn precision(&self) -> ModelPrecision;
}

/// Fetches weights and builds a [`SegmentationBackend`]
#[async_trait]
pub trait SegmentationModelLoader: Send + Sync {
    /// Load a model at the given precision, reporting download progress
    ///
    /// # Errors
    /// - Weight or processor configuration fetch failures
    /// - Model parsing or optimization failures
    async fn load(
        &self,
        precision: ModelPrecision,
        progress: ProgressCallback,
    ) -> Result<Box<dyn SegmentationBackend>>;
}
