//! Main-context execution venue
//!
//! Runs on the caller's own runtime and releases the model after every call, so
//! each inference is a cold start with the smallest possible resident footprint.

use super::state::ModelState;
use crate::{
    config::{ModelPrecision, Timeouts},
    error::{IdPhotoError, Result},
    inference::{ProgressCallback, SegmentationModelLoader},
    types::InferenceResult,
};
use image::RgbImage;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct MainContextVenue {
    loader: Arc<dyn SegmentationModelLoader>,
    timeouts: Timeouts,
    state: Mutex<ModelState>,
}

impl std::fmt::Debug for MainContextVenue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainContextVenue")
            .field("timeouts", &self.timeouts)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl MainContextVenue {
    #[must_use]
    pub fn new(loader: Arc<dyn SegmentationModelLoader>, timeouts: Timeouts) -> Self {
        Self {
            loader,
            timeouts,
            state: Mutex::new(ModelState::default()),
        }
    }

    /// Whether weights are currently resident
    pub async fn is_loaded(&self) -> bool {
        self.state.lock().await.is_loaded()
    }

    /// Load, run one segmentation pass, then release everything
    ///
    /// # Errors
    /// - `ModelLoad` / `InferenceTimeout` while loading
    /// - `Inference` / `InferenceTimeout` while running
    pub async fn run(
        &self,
        image: RgbImage,
        resolution: u32,
        precision: ModelPrecision,
        progress: ProgressCallback,
    ) -> Result<InferenceResult> {
        let mut guard = self.state.lock().await;
        let outcome = self
            .load_and_run(&mut guard, image, resolution, precision, progress)
            .await;
        guard.release();
        tracing::debug!("main-context model released");
        outcome
    }

    async fn load_and_run(
        &self,
        state: &mut ModelState,
        image: RgbImage,
        resolution: u32,
        precision: ModelPrecision,
        progress: ProgressCallback,
    ) -> Result<InferenceResult> {
        state
            .ensure_loaded(
                self.loader.as_ref(),
                resolution,
                precision,
                progress,
                self.timeouts.model_load(),
            )
            .await?;

        let mut owned = std::mem::take(state);
        let task = tokio::task::spawn_blocking(move || {
            let result = owned.run(&image);
            owned.release();
            result
        });

        let timeout = self.timeouts.inference();
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(IdPhotoError::inference(format!(
                "Inference task aborted: {join_error}"
            ))),
            Err(_) => Err(IdPhotoError::timeout("Inference", timeout)),
        }
    }

    /// Drop any resident state
    pub async fn release(&self) {
        self.state.lock().await.release();
    }
}
