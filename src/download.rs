//! Model weight downloading from `HuggingFace` repositories
//!
//! Files are streamed into a temporary file next to their final location and
//! renamed into place once complete, so an interrupted download never leaves a
//! partial model in the cache.

use crate::cache::{format_size, ModelCache};
use crate::config::ModelPrecision;
use crate::error::{IdPhotoError, Result};
use crate::inference::ProgressCallback;
use futures_util::StreamExt;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

const HUGGINGFACE_PREFIX: &str = "https://huggingface.co/";

/// Downloads model weights into a [`ModelCache`]
#[derive(Debug, Clone)]
pub struct ModelDownloader {
    client: Client,
    cache: ModelCache,
}

impl ModelDownloader {
    /// Create a downloader whose requests give up after `timeout`
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new(cache: ModelCache, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IdPhotoError::network_error("Failed to create HTTP client", &e))?;
        Ok(Self { client, cache })
    }

    /// Return the local path of a model variant, downloading it when missing
    ///
    /// `progress` receives whole percentages while bytes arrive; a cache hit
    /// reports 100 immediately.
    ///
    /// # Errors
    /// - `InvalidConfig` for an unsupported repository URL
    /// - `ModelLoad` for HTTP or streaming failures
    /// - `Io` when the cache cannot be written
    pub async fn ensure_model(
        &self,
        repo_url: &str,
        precision: ModelPrecision,
        progress: &ProgressCallback,
    ) -> Result<PathBuf> {
        validate_model_url(repo_url)?;
        let model_id = ModelCache::url_to_model_id(repo_url);
        let destination = self.cache.model_file(&model_id, precision);

        if self.cache.is_cached(&model_id, precision) {
            log::debug!("Model cache hit: {}", destination.display());
            progress(100);
            return Ok(destination);
        }

        let file_url = format!(
            "{}/resolve/main/{}",
            repo_url.trim_end_matches('/'),
            precision.file_name()
        );
        log::info!("Downloading {precision} model from {file_url}");
        self.download_file(&file_url, &destination, progress).await?;
        Ok(destination)
    }

    async fn download_file(
        &self,
        url: &str,
        destination: &Path,
        progress: &ProgressCallback,
    ) -> Result<()> {
        let parent = destination
            .parent()
            .ok_or_else(|| IdPhotoError::internal("Model path has no parent directory"))?;
        fs::create_dir_all(parent)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| IdPhotoError::model_load(format!("Failed to download {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IdPhotoError::model_load(format!("HTTP {status} for {url}")));
        }

        let total = response.content_length();
        let staging = tempfile::NamedTempFile::new_in(parent)?;
        let mut file = tokio::fs::File::from_std(staging.reopen()?);
        let mut stream = response.bytes_stream();

        let mut downloaded = 0u64;
        let mut last_percent = None;
        progress(0);

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                IdPhotoError::model_load(format!("Download of {url} interrupted: {e}"))
            })?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;

            if let Some(percent) = whole_percent(downloaded, total) {
                if last_percent != Some(percent) {
                    last_percent = Some(percent);
                    progress(percent);
                }
            }
        }
        file.flush().await?;
        drop(file);

        staging
            .persist(destination)
            .map_err(|e| IdPhotoError::Io(e.error))?;
        if last_percent != Some(100) {
            progress(100);
        }

        log::info!(
            "Downloaded {} to {}",
            format_size(downloaded),
            destination.display()
        );
        Ok(())
    }

    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }
}

/// Completed share as a whole percentage, when the total is known
#[must_use]
pub fn whole_percent(downloaded: u64, total: Option<u64>) -> Option<u8> {
    match total {
        Some(0) | None => None,
        Some(total) => Some(((downloaded.min(total) * 100) / total) as u8),
    }
}

/// Check a file against an expected SHA-256 hex digest
///
/// # Errors
/// - The file could not be read
pub fn verify_file_integrity(path: &Path, expected_hash: &str) -> Result<bool> {
    let contents = fs::read(path)?;
    let actual = format!("{:x}", Sha256::digest(&contents));
    if actual.eq_ignore_ascii_case(expected_hash) {
        Ok(true)
    } else {
        log::warn!(
            "Integrity check failed for {}: expected {expected_hash}, got {actual}",
            path.display()
        );
        Ok(false)
    }
}

/// Validate that a URL names a `HuggingFace` repository (`user/repo`)
///
/// # Errors
/// - `InvalidConfig` describing what is wrong with the URL
pub fn validate_model_url(url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(IdPhotoError::invalid_config("Model URL cannot be empty"));
    }

    let Some(repo_path) = url.strip_prefix(HUGGINGFACE_PREFIX) else {
        return Err(IdPhotoError::invalid_config(format!(
            "Unsupported URL format: {url}. Only HuggingFace repositories are supported (https://huggingface.co/...)"
        )));
    };

    let mut parts = repo_path.trim_end_matches('/').split('/');
    match (parts.next(), parts.next()) {
        (Some(user), Some(repo)) if !user.is_empty() && !repo.is_empty() => Ok(()),
        _ => Err(IdPhotoError::invalid_config(format!(
            "Invalid HuggingFace repository URL: {url}. Expected format: https://huggingface.co/username/repo-name"
        ))),
    }
}
