//! Inference executor
//!
//! Runs segmentation at a requested resolution in one of two venues with the same
//! external contract. Isolated state persists between calls; main-context state is
//! released after every call.

mod isolated;
mod main_context;
mod state;

pub use isolated::{IsolatedVenue, WorkerEvent, WorkerRequest};
pub use main_context::MainContextVenue;
pub use state::ModelState;

use crate::{
    config::{ModelPrecision, Timeouts},
    error::Result,
    inference::{ProgressCallback, SegmentationModelLoader},
    tier::ExecutionVenue,
    types::InferenceResult,
};
use async_trait::async_trait;
use image::RgbImage;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Anything that can produce an alpha mask for an image at a resolution and venue
#[async_trait]
pub trait InferenceRunner: Send + Sync {
    /// Produce a mask matching `image`'s dimensions
    ///
    /// # Errors
    /// - `ModelLoad` when weights cannot be fetched
    /// - `InferenceTimeout` when the load or forward pass exceeds its bound
    /// - `Inference` for any execution failure
    async fn run_inference(
        &self,
        image: RgbImage,
        processor_resolution: u32,
        venue: ExecutionVenue,
        progress: ProgressCallback,
    ) -> Result<InferenceResult>;

    /// Tear down whatever state the venue holds
    async fn discard_venue(&self, venue: ExecutionVenue);
}

/// Default [`InferenceRunner`] backed by a model loader
pub struct InferenceExecutor {
    precision: ModelPrecision,
    isolated: Mutex<IsolatedVenue>,
    main_context: MainContextVenue,
}

impl std::fmt::Debug for InferenceExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceExecutor")
            .field("precision", &self.precision)
            .field("main_context", &self.main_context)
            .finish_non_exhaustive()
    }
}

impl InferenceExecutor {
    #[must_use]
    pub fn new(
        loader: Arc<dyn SegmentationModelLoader>,
        precision: ModelPrecision,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            precision,
            isolated: Mutex::new(IsolatedVenue::new(Arc::clone(&loader), timeouts)),
            main_context: MainContextVenue::new(loader, timeouts),
        }
    }

    #[must_use]
    pub fn precision(&self) -> ModelPrecision {
        self.precision
    }
}

#[async_trait]
impl InferenceRunner for InferenceExecutor {
    #[tracing::instrument(skip(self, image, progress), fields(width = image.width(), height = image.height()))]
    async fn run_inference(
        &self,
        image: RgbImage,
        processor_resolution: u32,
        venue: ExecutionVenue,
        progress: ProgressCallback,
    ) -> Result<InferenceResult> {
        match venue {
            ExecutionVenue::Isolated => {
                self.isolated
                    .lock()
                    .await
                    .run(image, processor_resolution, self.precision, progress)
                    .await
            },
            ExecutionVenue::MainContext => {
                self.main_context
                    .run(image, processor_resolution, self.precision, progress)
                    .await
            },
        }
    }

    async fn discard_venue(&self, venue: ExecutionVenue) {
        match venue {
            ExecutionVenue::Isolated => self.isolated.lock().await.terminate(),
            ExecutionVenue::MainContext => self.main_context.release().await,
        }
    }
}
