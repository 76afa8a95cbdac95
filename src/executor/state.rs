//! Cached model state for one execution venue

use crate::{
    config::ModelPrecision,
    error::{IdPhotoError, Result},
    inference::{ProgressCallback, SegmentationBackend, SegmentationModelLoader},
    types::InferenceResult,
    utils::preprocessing::{ImagePreprocessor, PreprocessingConfig},
};
use image::RgbImage;
use instant::Instant;
use std::time::Duration;

/// Weights plus processor configuration, keyed by `(resolution, precision)`
#[derive(Default)]
pub struct ModelState {
    backend: Option<Box<dyn SegmentationBackend>>,
    preprocessing: Option<PreprocessingConfig>,
    loading: bool,
}

impl std::fmt::Debug for ModelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelState")
            .field("precision", &self.precision())
            .field("resolution", &self.resolution())
            .field("loading", &self.loading)
            .finish()
    }
}

impl ModelState {
    /// Precision of the loaded weights, if any
    #[must_use]
    pub fn precision(&self) -> Option<ModelPrecision> {
        self.backend.as_ref().map(|backend| backend.precision())
    }

    /// Resolution the processor is configured for, if any
    #[must_use]
    pub fn resolution(&self) -> Option<u32> {
        self.preprocessing.map(|config| config.target_size)
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.backend.is_some() && self.preprocessing.is_some()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Make the state match `(resolution, precision)`
    ///
    /// Matching parameters are a no-op. A resolution change rebuilds only the
    /// processor configuration; a precision change releases and reloads weights.
    ///
    /// # Errors
    /// - A load is already in progress
    /// - The loader failed
    /// - The load did not finish within `load_timeout`
    pub async fn ensure_loaded(
        &mut self,
        loader: &dyn SegmentationModelLoader,
        resolution: u32,
        precision: ModelPrecision,
        progress: ProgressCallback,
        load_timeout: Duration,
    ) -> Result<()> {
        if self.loading {
            return Err(IdPhotoError::internal("Model load already in progress"));
        }

        if self.precision() != Some(precision) {
            self.release();
            self.loading = true;
            let started = Instant::now();
            let loaded = tokio::time::timeout(load_timeout, loader.load(precision, progress)).await;
            self.loading = false;

            let backend = match loaded {
                Ok(result) => result?,
                Err(_) => return Err(IdPhotoError::timeout("Model load", load_timeout)),
            };
            tracing::debug!(
                %precision,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "segmentation weights loaded"
            );
            self.backend = Some(backend);
        }

        if self.resolution() != Some(resolution) {
            tracing::debug!(resolution, "rebuilding processor configuration");
            self.preprocessing = Some(PreprocessingConfig::for_resolution(resolution));
        }

        Ok(())
    }

    /// Preprocess, run the forward pass and postprocess to a full-size mask
    ///
    /// # Errors
    /// - No model loaded
    /// - Any pre/postprocessing or inference failure
    pub fn run(&mut self, image: &RgbImage) -> Result<InferenceResult> {
        let config = self
            .preprocessing
            .ok_or_else(|| IdPhotoError::inference("Processor not configured"))?;
        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| IdPhotoError::inference("Segmentation model not loaded"))?;

        let tensor = ImagePreprocessor::preprocess(image, &config)?;
        let output = backend.infer(&tensor)?;
        drop(tensor);
        ImagePreprocessor::postprocess(&output, image.width(), image.height())
    }

    /// Drop weights and processor configuration
    pub fn release(&mut self) {
        self.backend = None;
        self.preprocessing = None;
    }
}
