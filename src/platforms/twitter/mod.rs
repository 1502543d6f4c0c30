// Twitter platform — wires detection, extraction, image resolution and
// the video discovery machine into one per-interaction flow.
//
// Candidates inside one interaction download strictly in on-screen order,
// each finishing (retries included) before the next starts. Failures are
// journaled per candidate and never abort the remaining ones.

pub mod api;
pub mod detector;
pub mod video;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use crate::config::ConfigResolver;
use crate::download::filename::{generate, FilenameParams};
use crate::download::{DownloadRequest, Downloader, MediaKind};
use crate::errlog::ErrorLogger;
use crate::net::{HttpFetch, NetworkHub};
use crate::notify::Notifier;
use crate::page::Page;
use crate::platforms::{InteractionEvent, MediaCandidate, Platform, PlatformKind};

use video::{spawn_passive_capture, VideoCache, VideoResolver};

pub struct TwitterPlatform {
    config: ConfigResolver,
    downloader: Arc<Downloader>,
    errlog: Arc<ErrorLogger>,
    notifier: Arc<dyn Notifier>,
    resolver: VideoResolver,
    capture_task: tokio::task::JoinHandle<()>,
}

impl TwitterPlatform {
    pub fn new(
        config: ConfigResolver,
        downloader: Arc<Downloader>,
        errlog: Arc<ErrorLogger>,
        notifier: Arc<dyn Notifier>,
        hub: NetworkHub,
        http: Arc<dyn HttpFetch>,
    ) -> Self {
        Self::with_video_cache(config, downloader, errlog, notifier, hub, http, VideoCache::new())
    }

    /// Construct around an externally-owned video cache — for surfaces
    /// that share one cache across several pipelines, and for tests.
    pub fn with_video_cache(
        config: ConfigResolver,
        downloader: Arc<Downloader>,
        errlog: Arc<ErrorLogger>,
        notifier: Arc<dyn Notifier>,
        hub: NetworkHub,
        http: Arc<dyn HttpFetch>,
        cache: VideoCache,
    ) -> Self {
        let capture_task = spawn_passive_capture(&hub, cache.clone());
        let resolver = VideoResolver::new(cache, hub, http);
        Self {
            config,
            downloader,
            errlog,
            notifier,
            resolver,
            capture_task,
        }
    }
}

impl Drop for TwitterPlatform {
    fn drop(&mut self) {
        self.capture_task.abort();
    }
}

#[async_trait(?Send)]
impl Platform for TwitterPlatform {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Twitter
    }

    fn detect(&self, page: &Page, event: InteractionEvent) -> bool {
        detector::find_like_control(page, event.target)
            .and_then(|control| detector::find_tweet_container(page, control))
            .is_some()
    }

    async fn handle(&self, page: &Page, event: InteractionEvent) -> Result<bool> {
        let Some(control) = detector::find_like_control(page, event.target) else {
            return Ok(false);
        };
        let Some(container) = detector::find_tweet_container(page, control) else {
            return Ok(false);
        };

        let metadata = detector::extract_metadata(page, container);
        info!(
            author = %metadata.author_id,
            tweet_id = %metadata.content_id,
            "handling twitter interaction"
        );

        let tokens = self.config.filename_formats().await?.twitter;
        let today = Utc::now().date_naive();

        // Locate media first; each located element becomes one candidate.
        let images = detector::extract_images(page, container);
        let components = detector::extract_video_components(page, container);
        let total = images.len() + components.len();

        let mut candidates: Vec<MediaCandidate> = Vec::with_capacity(total);
        for (index, src) in images.iter().enumerate() {
            candidates.push(MediaCandidate {
                resolved_url: detector::force_orig_quality(src),
                preview_url: src.clone(),
                kind: MediaKind::Image,
                resolution: None,
                sequence_index: index,
                sequence_total: total,
            });
        }
        for (offset, component) in components.iter().enumerate() {
            let Some(video_el) = page.select_first_within(*component, "video") else {
                continue;
            };
            let Some(poster) = page.attr(video_el, "poster").map(str::to_string) else {
                continue;
            };
            candidates.push(MediaCandidate {
                preview_url: poster,
                resolved_url: None,
                kind: MediaKind::Video,
                resolution: Some(detector::declared_resolution(page, video_el)),
                sequence_index: images.len() + offset,
                sequence_total: total,
            });
        }

        // Consume candidates strictly in on-screen order; a video's
        // resolution runs (and completes) before the next candidate
        // starts.
        let mut saved = 0usize;
        for mut candidate in candidates {
            match candidate.kind {
                MediaKind::Image => {
                    let Some(url) = candidate.resolved_url.clone() else {
                        debug!(src = %candidate.preview_url, "image URL did not parse, skipping");
                        continue;
                    };
                    let filename = generate(&FilenameParams {
                        platform: "twitter",
                        tokens: &tokens,
                        metadata: &metadata,
                        kind: MediaKind::Image,
                        resolution: None,
                        extension: "jpg",
                        today,
                    });
                    let request = DownloadRequest {
                        url: url.clone(),
                        filename,
                        kind: MediaKind::Image,
                    };
                    match self.downloader.download_image(&request).await {
                        Ok(_) => saved += 1,
                        Err(err) => {
                            self.errlog
                                .log(
                                    "twitter",
                                    "downloadImage",
                                    &url,
                                    &err.to_string(),
                                    self.downloader.max_attempts(),
                                )
                                .await?;
                            self.notifier.error("Download failed", &err.to_string());
                        }
                    }
                }
                MediaKind::Video => {
                    let Some(video_id) = detector::video_id_from_poster(&candidate.preview_url)
                    else {
                        continue;
                    };
                    let fallback = candidate
                        .resolution
                        .clone()
                        .unwrap_or_else(|| "unknown".to_string());
                    let resolved = self
                        .resolver
                        .resolve(page, &metadata.content_id, &video_id, &fallback)
                        .await;

                    let Some(found) = resolved else {
                        self.errlog
                            .log(
                                "twitter",
                                "downloadVideo",
                                &candidate.preview_url,
                                "video resolution exhausted",
                                0,
                            )
                            .await?;
                        self.notifier
                            .error("Download failed", "could not resolve a video URL");
                        continue;
                    };
                    candidate.resolved_url = Some(found.url.clone());
                    candidate.resolution = Some(found.resolution.clone());

                    let filename = generate(&FilenameParams {
                        platform: "twitter",
                        tokens: &tokens,
                        metadata: &metadata,
                        kind: MediaKind::Video,
                        resolution: candidate.resolution.as_deref(),
                        extension: "mp4",
                        today,
                    });
                    let request = DownloadRequest {
                        url: found.url.clone(),
                        filename,
                        kind: MediaKind::Video,
                    };
                    match self.downloader.download_video(&request).await {
                        Ok(_) => saved += 1,
                        Err(err) => {
                            self.errlog
                                .log("twitter", "downloadVideo", &found.url, &err.to_string(), 0)
                                .await?;
                            self.notifier.error("Download failed", &err.to_string());
                        }
                    }
                }
            }
            if candidate.sequence_total > 1 {
                self.notifier
                    .progress(candidate.sequence_index + 1, candidate.sequence_total);
            }
        }

        if saved > 0 {
            self.notifier
                .success("Download complete", &format!("{saved} item(s) saved"));
        }
        Ok(true)
    }
}
