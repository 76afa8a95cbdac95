//! Image and report file I/O
//!
//! Keeps filesystem access out of the pipeline so it can be driven from memory in
//! tests and embedded frontends.

use crate::{
    compliance::ComplianceReport,
    error::{IdPhotoError, Result},
};
use image::DynamicImage;
use std::path::Path;

/// Service for reading photos and writing exports
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageIOService;

impl ImageIOService {
    /// Load a photo, falling back to content sniffing when the extension lies
    ///
    /// # Errors
    /// - The file does not exist or cannot be read
    /// - Neither the extension nor the content identifies a decodable format
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path_ref = path.as_ref();
        if !path_ref.exists() {
            return Err(IdPhotoError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", path_ref.display()),
            )));
        }

        match image::open(path_ref) {
            Ok(img) => Ok(img),
            Err(e) => {
                log::debug!(
                    "Extension-based loading failed for {}: {e}. Attempting content-based detection.",
                    path_ref.display()
                );
                let data = std::fs::read(path_ref)?;
                Self::load_from_bytes(&data)
            },
        }
    }

    /// Decode a photo held in memory
    ///
    /// # Errors
    /// - The bytes are not a supported image
    pub fn load_from_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        Ok(image::load_from_memory(bytes)?)
    }

    /// Write bytes to `path`, creating parent directories
    ///
    /// # Errors
    /// - Directory creation or write failures
    pub fn write_bytes<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<()> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path_ref, bytes)?;
        log::debug!("Wrote {} bytes to {}", bytes.len(), path_ref.display());
        Ok(())
    }

    /// Write a compliance report as pretty-printed JSON
    ///
    /// # Errors
    /// - Serialization or write failures
    pub fn write_report_json<P: AsRef<Path>>(path: P, report: &ComplianceReport) -> Result<()> {
        let json = serde_json::to_vec_pretty(report)
            .map_err(|e| IdPhotoError::internal(format!("Failed to serialize report: {e}")))?;
        Self::write_bytes(path, &json)
    }

    /// Whether the path has an extension this build can decode
    #[must_use]
    pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| matches!(ext.to_lowercase().as_str(), "jpg" | "jpeg" | "png"))
    }
}
