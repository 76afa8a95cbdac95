//! Configuration types for the ID photo pipeline

use crate::error::{IdPhotoError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default segmentation model repository
pub const DEFAULT_SEGMENTATION_MODEL_URL: &str = "https://huggingface.co/briaai/RMBG-1.4";

/// Output resolution used for print export
pub const DEFAULT_DPI: u32 = 300;

/// Where background removal runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemovalMode {
    /// On-device segmentation with tiered fallback
    Local,
    /// Self-hosted removal backend
    Remote { endpoint: String },
    /// Third-party removal API authenticated with an API key
    ThirdParty { endpoint: String, api_key: String },
    /// Keep the original background
    Skip,
}

impl Default for RemovalMode {
    fn default() -> Self {
        Self::Local
    }
}

impl std::fmt::Display for RemovalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote { .. } => write!(f, "remote"),
            Self::ThirdParty { .. } => write!(f, "third-party"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

/// Numeric precision of the segmentation weights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelPrecision {
    Fp32,
    Fp16,
    Quantized,
}

impl Default for ModelPrecision {
    fn default() -> Self {
        Self::Fp32
    }
}

impl ModelPrecision {
    /// Path of the ONNX weights inside the model repository
    #[must_use]
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Fp32 => "onnx/model.onnx",
            Self::Fp16 => "onnx/model_fp16.onnx",
            Self::Quantized => "onnx/model_quantized.onnx",
        }
    }
}

impl std::fmt::Display for ModelPrecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fp32 => write!(f, "fp32"),
            Self::Fp16 => write!(f, "fp16"),
            Self::Quantized => write!(f, "quantized"),
        }
    }
}

impl std::str::FromStr for ModelPrecision {
    type Err = IdPhotoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fp32" => Ok(Self::Fp32),
            "fp16" => Ok(Self::Fp16),
            "quantized" | "q8" | "int8" => Ok(Self::Quantized),
            other => Err(IdPhotoError::invalid_config(format!(
                "Unknown model precision '{other}' (expected fp32, fp16 or quantized)"
            ))),
        }
    }
}

/// Segmentation model source and caching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationConfig {
    /// Model repository URL
    pub model_url: String,
    /// Weight precision to load
    pub precision: ModelPrecision,
    /// Cache directory override (None = `IDPHOTO_CACHE_DIR` or platform cache)
    pub cache_dir: Option<PathBuf>,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            model_url: DEFAULT_SEGMENTATION_MODEL_URL.to_string(),
            precision: ModelPrecision::default(),
            cache_dir: None,
        }
    }
}

/// Face landmark model settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkConfig {
    /// Path to a face-mesh ONNX model
    pub model_path: Option<PathBuf>,
    /// Square input edge expected by the model
    pub input_size: u32,
    /// Number of faces to look for
    pub num_faces: u32,
    /// Minimum face detection confidence
    pub min_detection_confidence: f32,
    /// Minimum face presence confidence
    pub min_presence_confidence: f32,
}

impl Default for LandmarkConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            input_size: 192,
            num_faces: 1,
            min_detection_confidence: 0.5,
            min_presence_confidence: 0.5,
        }
    }
}

/// Bounded waits, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    pub inference_ms: u64,
    pub model_load_ms: u64,
    pub probe_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            inference_ms: 60_000,
            model_load_ms: 120_000,
            probe_ms: 3_000,
        }
    }
}

impl Timeouts {
    #[must_use]
    pub fn inference(&self) -> Duration {
        Duration::from_millis(self.inference_ms)
    }

    #[must_use]
    pub fn model_load(&self) -> Duration {
        Duration::from_millis(self.model_load_ms)
    }

    #[must_use]
    pub fn probe(&self) -> Duration {
        Duration::from_millis(self.probe_ms)
    }
}

/// Framing constants used by auto-crop and compliance
///
/// These were tuned empirically and may need recalibration per region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FramingConstants {
    /// Share of crop height taken by the head (skull top to chin)
    pub head_to_frame_ratio: f64,
    /// Margin above the head as a share of crop height
    pub top_margin: f64,
    /// Extension above the forehead landmark, as a share of face height
    pub head_top_extension: f64,
    /// Accepted top-margin band for compliance
    pub top_margin_band: (f64, f64),
    /// Maximum horizontal deviation of the face center from the crop center
    pub centering_tolerance: f64,
}

impl Default for FramingConstants {
    fn default() -> Self {
        Self {
            head_to_frame_ratio: 0.55,
            top_margin: 0.18,
            head_top_extension: 0.25,
            top_margin_band: (0.08, 0.15),
            centering_tolerance: 0.05,
        }
    }
}

/// Crop container size in display units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 600.0,
            height: 600.0,
        }
    }
}

/// Configuration for the one-click ID photo pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub removal_mode: RemovalMode,
    pub segmentation: SegmentationConfig,
    pub landmarks: LandmarkConfig,
    pub timeouts: Timeouts,
    pub framing: FramingConstants,
    pub viewport: Viewport,
    pub dpi: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            removal_mode: RemovalMode::default(),
            segmentation: SegmentationConfig::default(),
            landmarks: LandmarkConfig::default(),
            timeouts: Timeouts::default(),
            framing: FramingConstants::default(),
            viewport: Viewport::default(),
            dpi: DEFAULT_DPI,
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder
    ///
    /// ```rust
    /// use idphoto_pipeline::{PipelineConfig, RemovalMode};
    ///
    /// let config = PipelineConfig::builder()
    ///     .removal_mode(RemovalMode::Skip)
    ///     .dpi(600)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.dpi, 600);
    /// ```
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Load a configuration from a JSON file
    ///
    /// Missing fields take their default values.
    ///
    /// # Errors
    /// - File cannot be read
    /// - JSON is malformed
    /// - Resulting configuration fails validation
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents).map_err(|e| {
            IdPhotoError::invalid_config(format!("{}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Non-positive viewport, DPI or timeouts
    /// - Framing constants or confidences outside (0, 1)
    /// - Remote endpoints that are empty
    pub fn validate(&self) -> Result<()> {
        if self.dpi == 0 || self.dpi > 1200 {
            return Err(IdPhotoError::config_value_error("dpi", self.dpi, "1-1200"));
        }

        if !(self.viewport.width > 0.0 && self.viewport.height > 0.0) {
            return Err(IdPhotoError::invalid_config(format!(
                "viewport must be positive, got {}x{}",
                self.viewport.width, self.viewport.height
            )));
        }

        if self.timeouts.inference_ms == 0
            || self.timeouts.model_load_ms == 0
            || self.timeouts.probe_ms == 0
        {
            return Err(IdPhotoError::invalid_config("timeouts must be non-zero"));
        }

        let framing = &self.framing;
        for (name, value) in [
            ("head_to_frame_ratio", framing.head_to_frame_ratio),
            ("top_margin", framing.top_margin),
            ("head_top_extension", framing.head_top_extension),
            ("centering_tolerance", framing.centering_tolerance),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(IdPhotoError::config_value_error(name, value, "(0, 1)"));
            }
        }
        if framing.top_margin_band.0 > framing.top_margin_band.1 {
            return Err(IdPhotoError::invalid_config(format!(
                "top_margin_band is inverted: {:?}",
                framing.top_margin_band
            )));
        }

        let landmarks = &self.landmarks;
        if landmarks.input_size == 0 {
            return Err(IdPhotoError::config_value_error(
                "landmark input_size",
                landmarks.input_size,
                "> 0",
            ));
        }
        for (name, value) in [
            ("min_detection_confidence", landmarks.min_detection_confidence),
            ("min_presence_confidence", landmarks.min_presence_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(IdPhotoError::config_value_error(name, value, "0.0-1.0"));
            }
        }

        match &self.removal_mode {
            RemovalMode::Remote { endpoint } | RemovalMode::ThirdParty { endpoint, .. }
                if endpoint.trim().is_empty() =>
            {
                Err(IdPhotoError::invalid_config(
                    "remote removal requires an endpoint URL",
                ))
            },
            RemovalMode::ThirdParty { api_key, .. } if api_key.trim().is_empty() => Err(
                IdPhotoError::invalid_config("third-party removal requires an API key"),
            ),
            _ => Ok(()),
        }
    }
}

/// Builder for `PipelineConfig`
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Start from an existing configuration (e.g. one loaded from a file)
    #[must_use]
    pub fn from_config(config: PipelineConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn removal_mode(mut self, mode: RemovalMode) -> Self {
        self.config.removal_mode = mode;
        self
    }

    #[must_use]
    pub fn model_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.segmentation.model_url = url.into();
        self
    }

    #[must_use]
    pub fn precision(mut self, precision: ModelPrecision) -> Self {
        self.config.segmentation.precision = precision;
        self
    }

    #[must_use]
    pub fn cache_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.segmentation.cache_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn landmark_model<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.landmarks.model_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn landmark_input_size(mut self, size: u32) -> Self {
        self.config.landmarks.input_size = size;
        self
    }

    #[must_use]
    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.config.timeouts = timeouts;
        self
    }

    #[must_use]
    pub fn framing(mut self, framing: FramingConstants) -> Self {
        self.config.framing = framing;
        self
    }

    #[must_use]
    pub fn viewport(mut self, width: f64, height: f64) -> Self {
        self.config.viewport = Viewport { width, height };
        self
    }

    #[must_use]
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - Any rule checked by [`PipelineConfig::validate`]
    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
