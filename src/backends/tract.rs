//! Tract backends for segmentation and face landmarks
//!
//! Pure Rust inference with no native runtime. Segmentation graphs are parsed
//! once per precision and specialized to a concrete input size on first use at
//! that size, so a resolution change never re-reads the weights.

use crate::{
    config::{LandmarkConfig, ModelPrecision},
    download::ModelDownloader,
    error::{IdPhotoError, Result},
    face::{LandmarkModel, LandmarkModelLoader, NormalizedLandmark, LANDMARK_COUNT},
    inference::{ProgressCallback, SegmentationBackend, SegmentationModelLoader},
    utils::preprocessing::RESAMPLE_FILTER,
};
use async_trait::async_trait;
use image::RgbImage;
use instant::Instant;
use ndarray::Array4;
use std::path::{Path, PathBuf};
use tract_onnx::prelude::*;

/// Type alias for the optimized, runnable Tract plan
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

fn parse_onnx(path: &Path) -> Result<InferenceModel> {
    onnx().model_for_path(path).map_err(|e| {
        IdPhotoError::model_load(format!("Failed to load ONNX model {}: {e}", path.display()))
    })
}

fn specialize(graph: &InferenceModel, input_shape: [usize; 4]) -> Result<TractModel> {
    graph
        .clone()
        .with_input_fact(0, f32::fact(input_shape).into())
        .and_then(|m| m.into_optimized())
        .and_then(|m| m.into_runnable())
        .map_err(|e| {
            IdPhotoError::model_load(format!("Failed to optimize model for {input_shape:?}: {e}"))
        })
}

fn first_output_f32(outputs: TVec<TValue>) -> Result<Array4<f32>> {
    let tensor = outputs
        .into_iter()
        .next()
        .ok_or_else(|| IdPhotoError::inference("No output tensor found"))?
        .into_tensor();
    let view = tensor
        .to_array_view::<f32>()
        .map_err(|e| IdPhotoError::inference(format!("Failed to convert output tensor: {e}")))?;

    let shape = view.shape().to_vec();
    let dims = match shape.as_slice() {
        [n, c, h, w] => (*n, *c, *h, *w),
        // Some exports drop the channel axis
        [n, h, w] => (*n, 1, *h, *w),
        _ => {
            return Err(IdPhotoError::inference(format!(
                "Expected 3D or 4D output tensor, got shape {shape:?}"
            )))
        },
    };
    Array4::from_shape_vec(dims, view.iter().copied().collect())
        .map_err(|e| IdPhotoError::inference(format!("Failed to reshape output tensor: {e}")))
}

/// Segmentation model held by Tract
pub struct TractSegmentationBackend {
    graph: InferenceModel,
    plan: Option<([usize; 4], TractModel)>,
    precision: ModelPrecision,
}

impl std::fmt::Debug for TractSegmentationBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TractSegmentationBackend")
            .field("precision", &self.precision)
            .field("plan_shape", &self.plan.as_ref().map(|(s, _)| *s))
            .finish_non_exhaustive()
    }
}

impl TractSegmentationBackend {
    /// Parse a segmentation model from disk
    ///
    /// # Errors
    /// - The file is missing or not a valid ONNX graph
    pub fn from_path(path: &Path, precision: ModelPrecision) -> Result<Self> {
        Ok(Self {
            graph: parse_onnx(path)?,
            plan: None,
            precision,
        })
    }

    fn plan_for(&mut self, shape: [usize; 4]) -> Result<&TractModel> {
        if self.plan.as_ref().map(|(s, _)| *s) != Some(shape) {
            let started = Instant::now();
            let plan = specialize(&self.graph, shape)?;
            log::debug!(
                "Tract plan for {:?} built in {}ms",
                shape,
                started.elapsed().as_millis()
            );
            self.plan = Some((shape, plan));
        }
        self.plan
            .as_ref()
            .map(|(_, plan)| plan)
            .ok_or_else(|| IdPhotoError::internal("Tract plan missing after build"))
    }
}

impl SegmentationBackend for TractSegmentationBackend {
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let (n, c, h, w) = input.dim();
        let plan = self.plan_for([n, c, h, w])?;

        let started = Instant::now();
        let outputs = plan
            .run(tvec![Tensor::from(input.clone()).into()])
            .map_err(|e| IdPhotoError::inference(format!("Tract inference failed: {e}")))?;
        let output = first_output_f32(outputs)?;
        log::debug!(
            "Tract segmentation {:?} -> {:?} in {}ms",
            input.shape(),
            output.shape(),
            started.elapsed().as_millis()
        );
        Ok(output)
    }

    fn precision(&self) -> ModelPrecision {
        self.precision
    }
}

/// Downloads weights into the cache and builds [`TractSegmentationBackend`]s
#[derive(Debug, Clone)]
pub struct TractSegmentationLoader {
    downloader: ModelDownloader,
    repo_url: String,
}

impl TractSegmentationLoader {
    #[must_use]
    pub fn new(downloader: ModelDownloader, repo_url: impl Into<String>) -> Self {
        Self {
            downloader,
            repo_url: repo_url.into(),
        }
    }
}

#[async_trait]
impl SegmentationModelLoader for TractSegmentationLoader {
    async fn load(
        &self,
        precision: ModelPrecision,
        progress: ProgressCallback,
    ) -> Result<Box<dyn SegmentationBackend>> {
        let path = self
            .downloader
            .ensure_model(&self.repo_url, precision, &progress)
            .await?;

        let backend = tokio::task::spawn_blocking(move || {
            TractSegmentationBackend::from_path(&path, precision)
        })
        .await
        .map_err(|e| IdPhotoError::model_load(format!("Model parse task aborted: {e}")))??;

        log::info!("Tract segmentation model ready ({precision})");
        Ok(Box::new(backend))
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Pick the landmark tensor and the presence score out of raw model outputs
///
/// Both are required: a model without a presence output cannot be held to the
/// confidence threshold.
fn split_face_mesh_outputs(outputs: Vec<Vec<f32>>) -> Result<(Vec<f32>, f32)> {
    let mut coordinates = None;
    let mut presence = None;
    for values in outputs {
        if values.len() >= LANDMARK_COUNT * 3 {
            coordinates = Some(values);
        } else if values.len() == 1 {
            presence = values.first().copied();
        }
    }

    let coordinates = coordinates
        .ok_or_else(|| IdPhotoError::inference("Face mesh produced no landmark tensor"))?;
    let logit = presence
        .ok_or_else(|| IdPhotoError::inference("Face mesh produced no face presence score"))?;
    Ok((coordinates, sigmoid(logit)))
}

/// Face-mesh landmark model held by Tract
///
/// Input `[1, 3, S, S]` RGB in 0.0-1.0 from the whole image stretched to `S`.
/// Outputs landmark coordinates `[1, N*3]` in input pixels plus a single face
/// presence logit; both must be present.
pub struct TractFaceMesh {
    plan: TractModel,
    input_size: u32,
    threshold: f32,
}

impl std::fmt::Debug for TractFaceMesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TractFaceMesh")
            .field("input_size", &self.input_size)
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}

impl TractFaceMesh {
    /// Parse and optimize a face-mesh model
    ///
    /// # Errors
    /// - The file is missing or not a valid ONNX graph
    pub fn from_path(path: &Path, config: &LandmarkConfig) -> Result<Self> {
        let size = config.input_size as usize;
        let plan = specialize(&parse_onnx(path)?, [1, 3, size, size])?;
        Ok(Self {
            plan,
            input_size: config.input_size,
            threshold: config
                .min_detection_confidence
                .max(config.min_presence_confidence),
        })
    }

    fn to_tensor(&self, image: &RgbImage) -> Tensor {
        let size = self.input_size;
        let resized = image::imageops::resize(image, size, size, RESAMPLE_FILTER);
        let size = size as usize;
        let array = Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
            resized
                .get_pixel_checked(x as u32, y as u32)
                .map_or(0.0, |p| f32::from(p.0[c]) / 255.0)
        });
        Tensor::from(array)
    }
}

impl LandmarkModel for TractFaceMesh {
    fn detect(&mut self, image: &RgbImage) -> Result<Option<Vec<NormalizedLandmark>>> {
        let outputs = self
            .plan
            .run(tvec![self.to_tensor(image).into()])
            .map_err(|e| IdPhotoError::inference(format!("Face mesh inference failed: {e}")))?;

        let mut raw = Vec::with_capacity(outputs.len());
        for output in outputs {
            let view = output
                .to_array_view::<f32>()
                .map_err(|e| IdPhotoError::inference(format!("Unexpected face mesh output: {e}")))?;
            raw.push(view.iter().copied().collect::<Vec<f32>>());
        }

        let (coordinates, score) = split_face_mesh_outputs(raw)?;
        if score < self.threshold {
            log::debug!("Face presence {score:.3} below threshold {}", self.threshold);
            return Ok(None);
        }

        let scale = f64::from(self.input_size);
        let landmarks = coordinates
            .chunks_exact(3)
            .take(LANDMARK_COUNT)
            .map(|p| match p {
                [x, y, z] => NormalizedLandmark {
                    x: f64::from(*x) / scale,
                    y: f64::from(*y) / scale,
                    z: f64::from(*z) / scale,
                },
                _ => NormalizedLandmark::default(),
            })
            .collect();
        Ok(Some(landmarks))
    }
}

/// Builds [`TractFaceMesh`] models from a local file
#[derive(Debug, Clone, Default)]
pub struct TractFaceMeshLoader {
    fallback_path: Option<PathBuf>,
}

impl TractFaceMeshLoader {
    /// Loader used when the configuration names no model path
    #[must_use]
    pub fn with_default_path(path: impl Into<PathBuf>) -> Self {
        Self {
            fallback_path: Some(path.into()),
        }
    }
}

#[async_trait]
impl LandmarkModelLoader for TractFaceMeshLoader {
    async fn load(&self, config: &LandmarkConfig) -> Result<Box<dyn LandmarkModel>> {
        let path = config
            .model_path
            .clone()
            .or_else(|| self.fallback_path.clone())
            .ok_or_else(|| {
                IdPhotoError::model_load("No face landmark model configured (landmarks.model_path)")
            })?;
        let config = config.clone();

        let model = tokio::task::spawn_blocking(move || TractFaceMesh::from_path(&path, &config))
            .await
            .map_err(|e| IdPhotoError::model_load(format!("Landmark model task aborted: {e}")))??;
        Ok(Box::new(model))
    }
}
