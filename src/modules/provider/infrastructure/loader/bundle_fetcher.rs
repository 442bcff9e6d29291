use crate::shared::errors::{AppError, AppResult};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Progress of a bundle download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub bytes_downloaded: u64,
    pub total_bytes: Option<u64>,
    pub percent: Option<u8>,
    pub done: bool,
}

impl DownloadProgress {
    pub fn new(bytes_downloaded: u64, total_bytes: Option<u64>, done: bool) -> Self {
        let percent = total_bytes.filter(|total| *total > 0).map(|total| {
            let pct = bytes_downloaded.saturating_mul(100) / total;
            pct.min(100) as u8
        });

        Self {
            bytes_downloaded,
            total_bytes,
            percent,
            done,
        }
    }
}

/// Callback receiving download progress; called from the downloading task
pub type ProgressCallback<'a> = &'a (dyn Fn(DownloadProgress) + Send + Sync);

/// Fetches a remote bundle into memory
#[async_trait]
pub trait BundleFetcher: Send + Sync {
    async fn fetch(&self, url: &str, progress: ProgressCallback<'_>) -> AppResult<Vec<u8>>;
}

/// Streams bundles over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpBundleFetcher {
    client: reqwest::Client,
}

impl HttpBundleFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BundleFetcher for HttpBundleFetcher {
    async fn fetch(&self, url: &str, progress: ProgressCallback<'_>) -> AppResult<Vec<u8>> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| AppError::DownloadFailure(format!("Invalid bundle URL {}: {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::DownloadFailure(format!(
                "Unsupported bundle URL scheme: {}",
                parsed.scheme()
            )));
        }

        let response = self.client.get(parsed).send().await?.error_for_status()?;
        let total = response.content_length();
        let mut body = Vec::with_capacity(total.unwrap_or(0).min(64 * 1024 * 1024) as usize);
        let mut chunks = response.bytes_stream();

        progress(DownloadProgress::new(0, total, false));
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            body.extend_from_slice(&chunk);
            progress(DownloadProgress::new(body.len() as u64, total, false));
        }

        if body.is_empty() {
            return Err(AppError::DownloadFailure(format!("Empty bundle at {}", url)));
        }

        debug!("Fetched {} bytes from {}", body.len(), url);
        progress(DownloadProgress::new(body.len() as u64, total, true));
        Ok(body)
    }
}
