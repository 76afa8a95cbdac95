//! Error types for the ID photo pipeline

use std::time::Duration;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, IdPhotoError>;

/// Error types raised by the pipeline components
///
/// Lower-level components raise these typed failures; the fallback controller and
/// the one-click pipeline translate them into user-facing status messages.
#[derive(Error, Debug)]
pub enum IdPhotoError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Model weights or processor configuration could not be fetched or built
    #[error("Model load error: {0}")]
    ModelLoad(String),

    /// No response within the bounded wait
    #[error("{operation} timed out after {}s", timeout.as_secs())]
    InferenceTimeout {
        operation: String,
        timeout: Duration,
    },

    /// Forward pass or tensor conversion failure
    #[error("Inference error: {0}")]
    Inference(String),

    /// Mask and image sizes disagree
    #[error(
        "Dimension mismatch: mask is {}x{} but image is {}x{}",
        actual.0, actual.1, expected.0, expected.1
    )]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// Crop width/height or aspect ratio missing or non-positive
    #[error("Missing crop dimensions: {0}")]
    MissingCropDimensions(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Every memory tier failed
    #[error("Background removal failed after {attempts} attempt(s): {last_error}")]
    BackgroundRemovalExhausted { attempts: usize, last_error: String },

    /// Remote background-removal service did not answer the availability probe
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Remote service answered with a non-success status
    #[error("Remote service error ({status}){}", detail.as_ref().map(|d| format!(": {d}")).unwrap_or_default())]
    RemoteService { status: u16, detail: Option<String> },

    /// Transport-level HTTP failures
    #[error("Network error: {0}")]
    Network(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IdPhotoError {
    /// Create a new model load error
    pub fn model_load<S: Into<String>>(msg: S) -> Self {
        Self::ModelLoad(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new timeout error for the named operation
    pub fn timeout<S: Into<String>>(operation: S, timeout: Duration) -> Self {
        Self::InferenceTimeout {
            operation: operation.into(),
            timeout,
        }
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new missing crop dimensions error
    pub fn missing_crop_dimensions<S: Into<String>>(msg: S) -> Self {
        Self::MissingCropDimensions(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a network error with operation context
    pub fn network_error(operation: &str, error: &reqwest::Error) -> Self {
        Self::Network(format!("{operation}: {error}"))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
    ) -> Self {
        Self::InvalidConfig(format!(
            "Invalid {parameter}: {value} (valid range: {valid_range})"
        ))
    }

    /// Whether stepping down a memory tier may recover from this failure
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ModelLoad(_) | Self::InferenceTimeout { .. } | Self::Inference(_) | Self::Io(_)
        )
    }

    /// Status text suitable for showing to the person using the tool
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::BackgroundRemovalExhausted { .. } => "Background removal failed. Your device may not have enough memory. \
                 Try skipping background removal and using the photo as is."
                .to_string(),
            Self::ServiceUnavailable(_) => {
                "Background removal service not available. Switch to local processing.".to_string()
            },
            Self::RemoteService { .. } => format!("Background removal service failed: {self}"),
            Self::DimensionMismatch { .. } | Self::MissingCropDimensions(_) => {
                format!("Cannot continue: {self}")
            },
            _ => format!("Generation failed: {self}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IdPhotoError::invalid_config("viewport must be positive");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: viewport must be positive"
        );

        let err = IdPhotoError::timeout("Inference", Duration::from_secs(60));
        assert_eq!(err.to_string(), "Inference timed out after 60s");

        let err = IdPhotoError::DimensionMismatch {
            expected: (640, 480),
            actual: (320, 240),
        };
        assert_eq!(
            err.to_string(),
            "Dimension mismatch: mask is 320x240 but image is 640x480"
        );
    }

    #[test]
    fn test_remote_service_detail() {
        let err = IdPhotoError::RemoteService {
            status: 503,
            detail: Some("not configured".to_string()),
        };
        assert_eq!(err.to_string(), "Remote service error (503): not configured");

        let err = IdPhotoError::RemoteService {
            status: 500,
            detail: None,
        };
        assert_eq!(err.to_string(), "Remote service error (500)");
    }

    #[test]
    fn test_retry_classification() {
        assert!(IdPhotoError::model_load("fetch failed").is_retryable());
        assert!(IdPhotoError::inference("out of memory").is_retryable());
        assert!(IdPhotoError::timeout("Inference", Duration::from_secs(60)).is_retryable());
        assert!(!IdPhotoError::DimensionMismatch {
            expected: (1, 1),
            actual: (2, 2)
        }
        .is_retryable());
        assert!(!IdPhotoError::invalid_config("bad").is_retryable());
    }

    #[test]
    fn test_exhaustion_message_suggests_skipping() {
        let err = IdPhotoError::BackgroundRemovalExhausted {
            attempts: 3,
            last_error: "Inference error: oom".to_string(),
        };
        assert!(err.user_message().contains("skipping background removal"));
        assert!(err.to_string().contains("3 attempt(s)"));
    }

    #[test]
    fn test_config_value_error() {
        let err = IdPhotoError::config_value_error("dpi", 0, "1-1200");
        let text = err.to_string();
        assert!(text.contains("dpi"));
        assert!(text.contains("1-1200"));
    }
}
