//! On-disk cache for downloaded model weights
//!
//! Each model repository gets its own directory, keyed by a SHA-256 of the
//! repository URL. Precision variants live side by side inside it using the
//! repository's own relative paths (`onnx/model_fp16.onnx`, ...).

use crate::config::ModelPrecision;
use crate::error::{IdPhotoError, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the cache root
pub const CACHE_DIR_ENV: &str = "IDPHOTO_CACHE_DIR";

/// A model file found in the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedModelFile {
    pub model_id: String,
    pub precision: ModelPrecision,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Model cache manager
#[derive(Debug, Clone)]
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Open the cache, creating its directory when missing
    ///
    /// Location, first match wins:
    /// - `custom_dir` (from configuration)
    /// - `$IDPHOTO_CACHE_DIR/models`
    /// - the platform cache directory, e.g. `~/.cache/idphoto/models`
    ///
    /// # Errors
    /// - No cache directory could be determined
    /// - The directory could not be created
    pub fn new(custom_dir: Option<&Path>) -> Result<Self> {
        let cache_dir = match custom_dir {
            Some(dir) => dir.to_path_buf(),
            None => Self::default_cache_dir()?,
        };

        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir)?;
        }
        Ok(Self { cache_dir })
    }

    fn default_cache_dir() -> Result<PathBuf> {
        if let Ok(cache_override) = std::env::var(CACHE_DIR_ENV) {
            return Ok(PathBuf::from(cache_override).join("models"));
        }

        Ok(dirs::cache_dir()
            .ok_or_else(|| {
                IdPhotoError::invalid_config(format!(
                    "Failed to determine cache directory. Set {CACHE_DIR_ENV}."
                ))
            })?
            .join("idphoto")
            .join("models"))
    }

    /// Cache-safe identifier for a repository URL
    ///
    /// `https://huggingface.co/briaai/RMBG-1.4` becomes
    /// `briaai--RMBG-1.4-<first 12 hex digits of its SHA-256>`; other URLs keep
    /// only the digest.
    #[must_use]
    pub fn url_to_model_id(url: &str) -> String {
        let url = url.trim_end_matches('/');
        let digest = format!("{:x}", Sha256::digest(url.as_bytes()));
        let short = digest.get(..12).unwrap_or(&digest);

        match url.strip_prefix("https://huggingface.co/") {
            Some(repo) if !repo.is_empty() => format!("{}-{short}", repo.replace('/', "--")),
            _ => format!("url-{short}"),
        }
    }

    /// Directory holding every variant of one model
    #[must_use]
    pub fn model_dir(&self, model_id: &str) -> PathBuf {
        self.cache_dir.join(model_id)
    }

    /// Path of one precision variant (may not exist)
    #[must_use]
    pub fn model_file(&self, model_id: &str, precision: ModelPrecision) -> PathBuf {
        self.model_dir(model_id).join(precision.file_name())
    }

    /// Whether a non-empty file for this variant is present
    #[must_use]
    pub fn is_cached(&self, model_id: &str, precision: ModelPrecision) -> bool {
        fs::metadata(self.model_file(model_id, precision)).is_ok_and(|m| m.is_file() && m.len() > 0)
    }

    /// List every cached model variant, sorted by model id
    ///
    /// # Errors
    /// - The cache directory could not be read
    pub fn scan(&self) -> Result<Vec<CachedModelFile>> {
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.cache_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let model_id = entry.file_name().to_string_lossy().into_owned();
            for precision in [ModelPrecision::Fp32, ModelPrecision::Fp16, ModelPrecision::Quantized] {
                let path = self.model_file(&model_id, precision);
                if let Ok(meta) = fs::metadata(&path) {
                    found.push(CachedModelFile {
                        model_id: model_id.clone(),
                        precision,
                        path,
                        size_bytes: meta.len(),
                    });
                }
            }
        }
        found.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        Ok(found)
    }

    /// Remove one model with all its variants, returning whether it existed
    ///
    /// # Errors
    /// - The directory could not be removed
    pub fn clear_model(&self, model_id: &str) -> Result<bool> {
        let dir = self.model_dir(model_id);
        if !dir.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&dir)?;
        log::info!("Removed cached model: {model_id}");
        Ok(true)
    }

    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

/// Format a byte count in human-readable form
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS.get(unit_index).unwrap_or(&"B"))
    } else {
        format!("{:.1} {}", size, UNITS.get(unit_index).unwrap_or(&"B"))
    }
}
