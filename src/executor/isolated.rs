//! Isolated execution venue
//!
//! A dedicated worker task owns its model state and talks to callers only through
//! typed messages. Image buffers are moved into the request, never shared.

use super::state::ModelState;
use crate::{
    config::{ModelPrecision, Timeouts},
    error::{IdPhotoError, Result},
    inference::{ProgressCallback, SegmentationModelLoader},
    types::InferenceResult,
};
use image::RgbImage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Requests accepted by the worker
pub enum WorkerRequest {
    /// Bring the model to `(resolution, precision)`
    LoadModel {
        resolution: u32,
        precision: ModelPrecision,
        reply: mpsc::UnboundedSender<WorkerEvent>,
    },
    /// Segment an image with the loaded model
    Infer {
        image: RgbImage,
        reply: mpsc::UnboundedSender<WorkerEvent>,
    },
}

/// Events sent back by the worker
#[derive(Debug)]
pub enum WorkerEvent {
    /// Weight download progress, whole percent
    Progress(u8),
    ModelReady,
    Result(InferenceResult),
    Failure(IdPhotoError),
}

/// Handle to the worker task
pub struct IsolatedVenue {
    loader: Arc<dyn SegmentationModelLoader>,
    timeouts: Timeouts,
    worker: Option<(mpsc::Sender<WorkerRequest>, JoinHandle<()>)>,
}

impl std::fmt::Debug for IsolatedVenue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolatedVenue")
            .field("timeouts", &self.timeouts)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl IsolatedVenue {
    #[must_use]
    pub fn new(loader: Arc<dyn SegmentationModelLoader>, timeouts: Timeouts) -> Self {
        Self {
            loader,
            timeouts,
            worker: None,
        }
    }

    /// Whether a worker task currently exists
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|(_, handle)| !handle.is_finished())
    }

    /// Load (if needed) and run one segmentation pass on the worker
    ///
    /// The model stays warm in the worker afterwards.
    ///
    /// # Errors
    /// - `ModelLoad` / `InferenceTimeout` while loading (bounded by the load timeout)
    /// - `Inference` / `InferenceTimeout` while running (bounded by the inference timeout)
    pub async fn run(
        &mut self,
        image: RgbImage,
        resolution: u32,
        precision: ModelPrecision,
        progress: ProgressCallback,
    ) -> Result<InferenceResult> {
        let sender = self.ensure_worker();

        let (reply, mut events) = mpsc::unbounded_channel();
        sender
            .send(WorkerRequest::LoadModel {
                resolution,
                precision,
                reply,
            })
            .await
            .map_err(|_| IdPhotoError::model_load("Inference worker is not running"))?;

        let load_timeout = self.timeouts.model_load();
        await_event(&mut events, load_timeout, "Model load", &progress, |event| match event {
            WorkerEvent::ModelReady => Some(Ok(())),
            WorkerEvent::Failure(error) => Some(Err(error)),
            _ => None,
        })
        .await?;

        let (reply, mut events) = mpsc::unbounded_channel();
        sender
            .send(WorkerRequest::Infer { image, reply })
            .await
            .map_err(|_| IdPhotoError::inference("Inference worker is not running"))?;

        let inference_timeout = self.timeouts.inference();
        await_event(&mut events, inference_timeout, "Inference", &progress, |event| {
            match event {
                WorkerEvent::Result(result) => Some(Ok(result)),
                WorkerEvent::Failure(error) => Some(Err(error)),
                _ => None,
            }
        })
        .await
    }

    /// Tear down the worker and everything it holds
    pub fn terminate(&mut self) {
        if let Some((_, handle)) = self.worker.take() {
            handle.abort();
            tracing::debug!("isolated inference worker terminated");
        }
    }

    fn ensure_worker(&mut self) -> mpsc::Sender<WorkerRequest> {
        if let Some((sender, handle)) = &self.worker {
            if !handle.is_finished() {
                return sender.clone();
            }
        }

        let (sender, receiver) = mpsc::channel(4);
        let handle = tokio::spawn(worker_loop(
            receiver,
            Arc::clone(&self.loader),
            self.timeouts.model_load(),
        ));
        tracing::debug!("isolated inference worker started");
        self.worker = Some((sender.clone(), handle));
        sender
    }
}

impl Drop for IsolatedVenue {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Wait for the terminal event of one request, forwarding progress
async fn await_event<T>(
    events: &mut mpsc::UnboundedReceiver<WorkerEvent>,
    timeout: Duration,
    operation: &str,
    progress: &ProgressCallback,
    mut terminal: impl FnMut(WorkerEvent) -> Option<Result<T>>,
) -> Result<T> {
    let wait = async {
        while let Some(event) = events.recv().await {
            if let WorkerEvent::Progress(percent) = event {
                progress(percent);
                continue;
            }
            if let Some(outcome) = terminal(event) {
                return outcome;
            }
        }
        Err(IdPhotoError::inference(format!(
            "Inference worker stopped during {operation}"
        )))
    };

    match tokio::time::timeout(timeout, wait).await {
        Ok(outcome) => outcome,
        Err(_) => Err(IdPhotoError::timeout(operation, timeout)),
    }
}

async fn worker_loop(
    mut requests: mpsc::Receiver<WorkerRequest>,
    loader: Arc<dyn SegmentationModelLoader>,
    load_timeout: Duration,
) {
    let mut state = ModelState::default();

    while let Some(request) = requests.recv().await {
        match request {
            WorkerRequest::LoadModel {
                resolution,
                precision,
                reply,
            } => {
                let progress_reply = reply.clone();
                let progress: ProgressCallback = Arc::new(move |percent| {
                    let _ = progress_reply.send(WorkerEvent::Progress(percent));
                });
                let event = match state
                    .ensure_loaded(loader.as_ref(), resolution, precision, progress, load_timeout)
                    .await
                {
                    Ok(()) => WorkerEvent::ModelReady,
                    Err(error) => WorkerEvent::Failure(error),
                };
                let _ = reply.send(event);
            },
            WorkerRequest::Infer { image, reply } => {
                let mut owned = std::mem::take(&mut state);
                let joined = tokio::task::spawn_blocking(move || {
                    let result = owned.run(&image);
                    (owned, result)
                })
                .await;

                let event = match joined {
                    Ok((returned, result)) => {
                        state = returned;
                        match result {
                            Ok(mask) => WorkerEvent::Result(mask),
                            Err(error) => WorkerEvent::Failure(error),
                        }
                    },
                    Err(join_error) => WorkerEvent::Failure(IdPhotoError::inference(format!(
                        "Inference task aborted: {join_error}"
                    ))),
                };
                let _ = reply.send(event);
            },
        }
    }
}
