#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # ID Photo Pipeline
//!
//! Turns a portrait into a compliant ID photo: adaptive on-device background
//! removal, face landmark geometry, automatic framing for a document preset and
//! measurable compliance checks.
//!
//! ## Features
//!
//! - **Memory tiers**: processor resolution and execution venue picked from device signals
//! - **Tiered fallback**: failed segmentation steps down high → medium → low before giving up
//! - **Face geometry**: head top, chin, eye line, tilt and face width from a 468-point face mesh
//! - **Auto-crop**: the crop rectangle is derived from the face and constrained to the image
//! - **Compliance**: head size, eye position, centering, tilt, framing and top margin per preset
//! - **Remote removal**: self-hosted or third-party services as alternatives to local inference
//! - **Print export**: the final crop rendered at the preset's physical size and DPI
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use idphoto_pipeline::{
//!     backends::{TractFaceMeshLoader, TractSegmentationLoader},
//!     find_preset, select_tier, DeviceSignals, InferenceExecutor, ModelCache, ModelDownloader,
//!     OneClickOutcome, OneClickPipeline, PipelineConfig, SessionState,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = PipelineConfig::builder()
//!     .landmark_model("face_landmarks.onnx")
//!     .build()?;
//! let downloader = ModelDownloader::new(ModelCache::new(None)?, config.timeouts.model_load())?;
//! let runner = Arc::new(InferenceExecutor::new(
//!     Arc::new(TractSegmentationLoader::new(downloader, config.segmentation.model_url.clone())),
//!     config.segmentation.precision,
//!     config.timeouts,
//! ));
//!
//! let tier = select_tier(&DeviceSignals::default());
//! let pipeline =
//!     OneClickPipeline::new(config, Arc::new(TractFaceMeshLoader::default()), runner, tier)?;
//!
//! let mut session = SessionState::new(tier);
//! session.start(image::open("portrait.jpg")?);
//! let preset = find_preset("us-passport").expect("known preset");
//! match pipeline.run(&mut session, preset).await? {
//!     OneClickOutcome::Completed(result) => println!("{}", result.message),
//!     OneClickOutcome::NoFaceDetected { message } => eprintln!("{message}"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `tract` (default): pure Rust inference for segmentation and face landmarks
//! - `onnx`: ONNX Runtime segmentation with CUDA / `CoreML` execution providers
//! - `cli` (default): the `idphoto` binary with progress bars and tracing setup
//! - `tracing-json`: JSON log output for the CLI

pub mod backends;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compliance;
pub mod compositor;
pub mod config;
pub mod crop;
pub mod download;
pub mod error;
pub mod executor;
pub mod export;
pub mod face;
pub mod fallback;
pub mod inference;
pub mod pipeline;
pub mod presets;
pub mod remote;
pub mod services;
pub mod session;
pub mod tier;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

// Public API exports
pub use cache::{format_size, CachedModelFile, ModelCache};
pub use compliance::{CheckId, ComplianceCheck, ComplianceReport};
pub use config::{
    FramingConstants, LandmarkConfig, ModelPrecision, PipelineConfig, PipelineConfigBuilder,
    RemovalMode, SegmentationConfig, Timeouts, Viewport,
};
pub use crop::{apply_auto_crop, compute_crop, CropBox, DisplayTransform, FixedCropBox};
pub use download::{validate_model_url, ModelDownloader};
pub use error::{IdPhotoError, Result};
pub use executor::{InferenceExecutor, InferenceRunner};
pub use export::{export_png, render_print};
pub use face::{
    FaceGeometry, FaceGeometryDetector, LandmarkModel, LandmarkModelLoader, NormalizedLandmark,
};
pub use fallback::{CutoutImage, TierAttempt, TieredFallbackController};
pub use inference::{ProgressCallback, SegmentationBackend, SegmentationModelLoader};
pub use pipeline::{BackgroundOutcome, OneClickOutcome, OneClickPipeline, OneClickResult};
pub use presets::{default_preset, find_preset, CompliancePreset, PhysicalUnit, PRESETS};
pub use remote::{RemoteKind, RemoteRemovalService};
pub use services::{
    ConsoleProgressReporter, ImageIOService, NoOpProgressReporter, ProcessingStage,
    ProgressReporter, ProgressUpdate, RecordingProgressReporter,
};
pub use session::SessionState;
pub use tier::{select_tier, DeviceSignals, ExecutionVenue, FormFactor, MemoryTier, OsFamily, TierLevel};
pub use types::{InferenceResult, Point, Rect, Size};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat};
