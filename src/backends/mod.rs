//! Concrete inference runtimes
//!
//! - Tract (pure Rust, default): segmentation and face landmarks
//! - ONNX Runtime (feature `onnx`): segmentation with hardware acceleration

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "tract")]
pub mod tract;

// In-memory models for unit tests
#[cfg(test)]
pub mod test_utils;

#[cfg(feature = "onnx")]
pub use self::onnx::{OnnxSegmentationBackend, OnnxSegmentationLoader};

#[cfg(feature = "tract")]
pub use self::tract::{
    TractFaceMesh, TractFaceMeshLoader, TractSegmentationBackend, TractSegmentationLoader,
};
