//! HTTP access to the analysis API
//!
//! Endpoints:
//! - `POST {base}/analyze/` with a multipart `file` field
//! - `GET {base}/models/status/{model_id}`
//! - `GET {base}/models/{filename}` for the finished model

use async_trait::async_trait;
use fengshui_core::job::{model_download_url, model_status_url};
use fengshui_core::{AnalysisError, AnalysisResult, StatusResponse};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} returned {status}")]
    Status { url: String, status: u16 },
    #[error("Invalid analysis response: {0}")]
    Analysis(#[from] AnalysisError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Anything that can report the status of a model job
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, model_id: &str) -> Result<StatusResponse, ApiError>;
}

/// Compute the hex SHA-256 of a byte slice
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Cache file name for a downloaded model: `{short_sha}-{name}`
pub fn cached_model_name(sha: &str, filename: &str) -> String {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .filter(|n| !n.is_empty())
        .unwrap_or("model.glb");
    let short_sha = &sha[..sha.len().min(8)];
    format!("{}-{}", short_sha, name)
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

/// Client for the analysis API
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, ApiError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Upload a room photo for analysis
    pub async fn analyze(&self, image_path: &Path) -> Result<AnalysisResult, ApiError> {
        let bytes = tokio::fs::read(image_path).await?;
        let file_name = image_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("room.jpg")
            .to_string();
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime_for(image_path))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let url = format!("{}/analyze/", self.base_url);
        info!(url = %url, image = %image_path.display(), "Uploading image for analysis");
        let response = self.client.post(&url).multipart(form).send().await?;
        if !response.status().is_success() {
            return Err(ApiError::Status {
                url,
                status: response.status().as_u16(),
            });
        }
        let body = response.text().await?;
        Ok(AnalysisResult::from_json_str(&body)?)
    }

    /// Download a finished model into `cache_dir`, returning the local path
    ///
    /// Files are stored as `{short_sha}-{filename}`; an existing file with the
    /// same content is reused.
    pub async fn download_model(
        &self,
        filename: &str,
        cache_dir: &Path,
    ) -> Result<PathBuf, ApiError> {
        let url = model_download_url(&self.base_url, filename);
        info!(url = %url, "Downloading model");
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ApiError::Status {
                url,
                status: response.status().as_u16(),
            });
        }
        let bytes = response.bytes().await?;
        let sha = sha256_hex(&bytes);
        let path = cache_dir.join(cached_model_name(&sha, filename));

        if path.exists() {
            info!(path = %path.display(), "Model already cached");
            return Ok(path);
        }
        tokio::fs::create_dir_all(cache_dir).await?;
        tokio::fs::write(&path, &bytes).await?;
        info!(path = %path.display(), size = bytes.len(), "Cached model");
        Ok(path)
    }
}

#[async_trait]
impl StatusSource for ApiClient {
    async fn fetch_status(&self, model_id: &str) -> Result<StatusResponse, ApiError> {
        let url = model_status_url(&self.base_url, model_id);
        debug!(url = %url, "Checking model status");
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ApiError::Status {
                url,
                status: response.status().as_u16(),
            });
        }
        Ok(response.json::<StatusResponse>().await?)
    }
}
