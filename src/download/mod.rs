// Download execution — the sink abstraction plus the retry-aware wrapper
// that feeds it.
//
// The sink is the platform download facility from the pipeline's point of
// view: submit a URL and a destination name, observe success or failure.
// Retries, HEAD preflights and the alternate-extension fallback live here,
// one level above the sink; the sink itself never retries.

pub mod filename;
pub mod retry;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::net::{FetchError, HttpFetch};
use crate::notify::Notifier;
use retry::RetryPolicy;

/// What a candidate resolves to on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

/// Opaque identifier handed back by the sink.
pub type DownloadId = u64;

/// One fully-resolved download: absolute URL, destination filename, kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub filename: String,
    pub kind: MediaKind,
}

/// The platform download facility. Submit and observe; never retry here.
#[async_trait]
pub trait DownloadSink: Send + Sync {
    async fn submit(&self, request: &DownloadRequest) -> Result<DownloadId, FetchError>;
}

/// Filesystem sink — fetches the URL and writes it under the target
/// directory. The stand-in for the browser's download manager.
pub struct FsSink {
    client: reqwest::Client,
    dir: PathBuf,
    next_id: AtomicU64,
}

impl FsSink {
    pub fn new(dir: &Path) -> Result<Self, FetchError> {
        std::fs::create_dir_all(dir)
            .map_err(|e| FetchError::Network(format!("create {}: {e}", dir.display())))?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(Self {
            client,
            dir: dir.to_path_buf(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Default download target: `~/Downloads/magpie`, falling back to the
    /// working directory.
    pub fn default_dir() -> PathBuf {
        dirs::download_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("magpie")
    }
}

#[async_trait]
impl DownloadSink for FsSink {
    async fn submit(&self, request: &DownloadRequest) -> Result<DownloadId, FetchError> {
        let response = self
            .client
            .get(&request.url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let dest = self.dir.join(&request.filename);
        tokio::fs::write(&dest, &bytes)
            .await
            .map_err(|e| FetchError::Network(format!("write {}: {e}", dest.display())))?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        info!(id, path = %dest.display(), bytes = bytes.len(), "saved");
        Ok(id)
    }
}

/// Swap the common raster extensions at the end of a URL or filename.
fn swap_raster_extension(name: &str) -> Option<String> {
    if let Some(stem) = name.strip_suffix(".png") {
        Some(format!("{stem}.jpg"))
    } else {
        name.strip_suffix(".jpg").map(|stem| format!("{stem}.png"))
    }
}

/// Retry-aware front of the sink.
pub struct Downloader {
    sink: Arc<dyn DownloadSink>,
    http: Arc<dyn HttpFetch>,
    policy: RetryPolicy,
    notifier: Arc<dyn Notifier>,
}

impl Downloader {
    pub fn new(
        sink: Arc<dyn DownloadSink>,
        http: Arc<dyn HttpFetch>,
        policy: RetryPolicy,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            sink,
            http,
            policy,
            notifier,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.policy.max_attempts
    }

    /// Download an image: HEAD preflight inside the retry loop, then one
    /// alternate-extension attempt if the whole sequence failed. The
    /// "retrying" notice fires on the second attempt only.
    pub async fn download_image(&self, request: &DownloadRequest) -> Result<DownloadId, FetchError> {
        let attempt = |url: String, filename: String| async move {
            self.http.head(&url).await?;
            self.sink
                .submit(&DownloadRequest {
                    url,
                    filename,
                    kind: MediaKind::Image,
                })
                .await
        };

        let outcome = self
            .policy
            .run(
                "image download",
                |notice| {
                    if notice.attempt == 1 {
                        self.notifier
                            .warning("Download retrying", "image download is retrying...");
                    }
                },
                || attempt(request.url.clone(), request.filename.clone()),
            )
            .await;

        match outcome {
            Ok(id) => Ok(id),
            Err(err) => {
                // One shot at the sibling extension; the destination
                // filename keeps the template's extension either way.
                let Some(alt_url) = swap_raster_extension(&request.url) else {
                    return Err(err);
                };
                debug!(url = %alt_url, "trying alternate extension");
                attempt(alt_url, request.filename.clone()).await
            }
        }
    }

    /// Download a video: a direct submit, no preflight and no retry —
    /// resolved video URLs are either good now or never.
    pub async fn download_video(&self, request: &DownloadRequest) -> Result<DownloadId, FetchError> {
        self.sink.submit(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_swaps_to_jpg_and_back() {
        assert_eq!(
            swap_raster_extension("https://h/img_p0.png").as_deref(),
            Some("https://h/img_p0.jpg")
        );
        assert_eq!(
            swap_raster_extension("name.jpg").as_deref(),
            Some("name.png")
        );
    }

    #[test]
    fn other_endings_do_not_swap() {
        assert!(swap_raster_extension("clip.mp4").is_none());
        assert!(swap_raster_extension("https://h/img?format=jpg&name=orig").is_none());
    }
}
