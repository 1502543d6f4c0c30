// Pixiv platform — bookmark-driven artwork capture for both the artwork
// page itself and the various feed surfaces.
//
// Two extraction flows share the downstream path: on an artwork page the
// content id comes from the page URL and the page counter; in a feed the
// id comes from the container's main artwork link. Either way the preview
// URL is rebuilt into an original-quality URL per page of the post and
// downloaded sequentially.

pub mod cache;
pub mod detector;
pub mod resolver;

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use ego_tree::NodeId;
use regex_lite::Regex;
use tracing::{debug, info};

use crate::config::ConfigResolver;
use crate::download::filename::{generate, FilenameParams, FilenameToken};
use crate::download::{DownloadRequest, Downloader, MediaKind};
use crate::errlog::ErrorLogger;
use crate::notify::Notifier;
use crate::page::Page;
use crate::platforms::{
    ContentMetadata, InteractionEvent, MediaCandidate, Platform, PlatformKind, SENTINEL_AUTHOR,
    SENTINEL_AUTHOR_NAME, SENTINEL_ID,
};

use cache::DomCache;

const ARTWORK_PAGE_PREFIX: &str = "https://www.pixiv.net/artworks/";

/// Author-name text that is navigation chrome, not a name.
const NAME_REJECT_WORDING: &[&str] = &["查看", "更多"];

/// Avatar alt text that is an artwork caption, not a name.
const ALT_REJECT_WORDING: &str = "的插画";

/// Names longer than this are assumed to be scraped prose.
const MAX_NAME_CHARS: usize = 50;

/// Thumbnails at or under this declared edge are not the primary image.
const THUMBNAIL_EDGE: u32 = 80;

pub struct PixivPlatform {
    config: ConfigResolver,
    downloader: Arc<Downloader>,
    errlog: Arc<ErrorLogger>,
    notifier: Arc<dyn Notifier>,
    cache: Mutex<DomCache>,
}

impl PixivPlatform {
    pub fn new(
        config: ConfigResolver,
        downloader: Arc<Downloader>,
        errlog: Arc<ErrorLogger>,
        notifier: Arc<dyn Notifier>,
        initial_url: &str,
    ) -> Self {
        Self {
            config,
            downloader,
            errlog,
            notifier,
            cache: Mutex::new(DomCache::new(initial_url)),
        }
    }

    pub fn cache_stats(&self) -> cache::CacheStats {
        self.cache.lock().unwrap().stats()
    }

    /// Consume a series of resolved candidates, in on-screen order.
    /// Failures are journaled per page and don't stop the series.
    async fn download_candidates(
        &self,
        candidates: &[MediaCandidate],
        metadata: &ContentMetadata,
        tokens: &[FilenameToken],
    ) -> Result<usize> {
        let today = Utc::now().date_naive();
        let mut saved = 0usize;

        for candidate in candidates {
            let Some(url) = candidate.resolved_url.as_ref() else {
                continue;
            };
            let filename = generate(&FilenameParams {
                platform: "pixiv",
                tokens,
                metadata,
                kind: MediaKind::Image,
                resolution: None,
                extension: "jpg",
                today,
            });
            let filename =
                with_page_suffix(&filename, candidate.sequence_index, candidate.sequence_total);
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
                            "pixiv",
                            "downloadImage",
                            url,
                            &err.to_string(),
                            self.downloader.max_attempts(),
                        )
                        .await?;
                    self.notifier.error("Download failed", &err.to_string());
                }
            }
            if candidate.sequence_total > 1 {
                self.notifier
                    .progress(candidate.sequence_index + 1, candidate.sequence_total);
            }
        }
        Ok(saved)
    }
}

/// Multi-page downloads get the page index in the name so pages don't
/// overwrite each other; single-page downloads keep the template name
/// untouched.
fn with_page_suffix(filename: &str, index: usize, total: usize) -> String {
    if total <= 1 {
        return filename.to_string();
    }
    match filename.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem}_p{index}.{ext}"),
        None => format!("{filename}_p{index}"),
    }
}

fn illust_id_from_href(href: &str) -> Option<String> {
    let re = Regex::new(r"artworks/(\d+)").ok()?;
    re.captures(href)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn user_id_from_href(href: &str) -> Option<String> {
    let re = Regex::new(r"users/(\d+)").ok()?;
    re.captures(href)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Author id and display name from a profile link. The link text is
/// rejected when it is navigation chrome or suspiciously long, in which
/// case the avatar's alt text stands in (unless that is an artwork
/// caption).
fn author_from_link(page: &Page, link: NodeId) -> (String, Option<String>) {
    let author_id = page
        .attr(link, "href")
        .and_then(user_id_from_href)
        .unwrap_or_else(|| SENTINEL_AUTHOR.to_string());

    let mut name = page.text(link).trim().to_string();
    let rejected = name.is_empty()
        || NAME_REJECT_WORDING.iter().any(|word| name.contains(word))
        || name.chars().count() > MAX_NAME_CHARS;
    if rejected {
        if let Some(img) = page.select_first_within(link, "img") {
            if let Some(alt) = page.attr(img, "alt") {
                if !alt.is_empty() && !alt.contains(ALT_REJECT_WORDING) {
                    name = alt.trim().to_string();
                }
            }
        }
    }

    let name = if name.is_empty() { None } else { Some(name) };
    (author_id, name)
}

/// Largest node by declared area; first wins ties (document order).
fn largest_by_area(page: &Page, nodes: &[NodeId]) -> Option<NodeId> {
    let mut best: Option<(NodeId, u64)> = None;
    for &node in nodes {
        let area = detector::declared_area(page, node);
        match best {
            Some((_, best_area)) if area <= best_area => {}
            _ => best = Some((node, area)),
        }
    }
    best.map(|(node, _)| node)
}

/// The primary artwork image among a container's images: filter out
/// declared thumbnails, then take the largest; a single image is taken
/// as-is, and with no usable size data the first image stands.
fn pick_main_image(page: &Page, images: &[NodeId]) -> Option<NodeId> {
    match images {
        [] => None,
        [only] => Some(*only),
        many => {
            let large: Vec<NodeId> = many
                .iter()
                .copied()
                .filter(|&img| {
                    let w: u32 = page
                        .attr(img, "width")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0);
                    let h: u32 = page
                        .attr(img, "height")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0);
                    w > THUMBNAIL_EDGE && h > THUMBNAIL_EDGE
                })
                .collect();
            if large.is_empty() {
                Some(many[0])
            } else {
                largest_by_area(page, &large)
            }
        }
    }
}

/// What one flow hands to the shared download path.
struct Extraction {
    metadata: ContentMetadata,
    preview_urls: Vec<String>,
    total_pages: usize,
}

fn extract_on_artwork_page(
    page: &Page,
    nodes: Option<&cache::CachedNodes>,
) -> Extraction {
    let content_id =
        illust_id_from_href(page.url_str()).unwrap_or_else(|| SENTINEL_ID.to_string());

    let author_link = nodes
        .and_then(|n| n.user_links.first().copied())
        .or_else(|| page.select_first(r#"a[href*="/users/"]"#));
    let (author_id, author_name) = match author_link {
        Some(link) => author_from_link(page, link),
        None => (SENTINEL_AUTHOR.to_string(), None),
    };

    let images: Vec<NodeId> = match nodes.filter(|n| !n.images.is_empty()) {
        Some(n) => n.images.clone(),
        None => page.select_first("main img").into_iter().collect(),
    };
    let preview_urls = images
        .iter()
        .filter_map(|&img| page.attr(img, "src").map(str::to_string))
        .collect();

    let total_pages = page
        .select_first("[data-gtm-value]")
        .and_then(|node| resolver::parse_page_counter(&page.text(node)))
        .unwrap_or(1);

    Extraction {
        metadata: ContentMetadata {
            author_id,
            author_name: author_name.or_else(|| Some(SENTINEL_AUTHOR_NAME.to_string())),
            content_id,
            timestamp: None,
        },
        preview_urls,
        total_pages,
    }
}

fn extract_in_feed(
    page: &Page,
    container: NodeId,
    nodes: Option<&cache::CachedNodes>,
) -> Extraction {
    let artwork_links: Vec<NodeId> = match nodes.filter(|n| !n.artwork_links.is_empty()) {
        Some(n) => n.artwork_links.clone(),
        None => page.select_within(container, r#"a[href*="/artworks/"]"#),
    };
    let main_link = largest_by_area(page, &artwork_links);

    let content_id = main_link
        .and_then(|link| page.attr(link, "href"))
        .and_then(illust_id_from_href)
        .or_else(|| {
            // Unlinked tiles sometimes carry the id as an analytics value.
            page.select_first_within(container, "[data-gtm-value]")
                .and_then(|node| page.attr(node, "data-gtm-value"))
                .map(str::to_string)
        })
        .unwrap_or_else(|| SENTINEL_ID.to_string());

    let author_link = nodes
        .and_then(|n| n.user_links.first().copied())
        .or_else(|| page.select_first_within(container, r#"a[href*="/users/"]"#));
    let (author_id, author_name) = match author_link {
        Some(link) => author_from_link(page, link),
        None => (SENTINEL_AUTHOR.to_string(), None),
    };

    let images: Vec<NodeId> = match nodes.filter(|n| !n.images.is_empty()) {
        Some(n) => n.images.clone(),
        None => page.select_within(container, "img"),
    };
    let preview_urls = pick_main_image(page, &images)
        .and_then(|img| page.attr(img, "src").map(str::to_string))
        .into_iter()
        .collect();

    let total_pages = page
        .select_first_within(container, r#"[class*="sc-"], span"#)
        .and_then(|node| resolver::parse_count_badge(&page.text(node)))
        .unwrap_or(1);

    Extraction {
        metadata: ContentMetadata {
            author_id,
            author_name: author_name.or_else(|| Some(SENTINEL_AUTHOR_NAME.to_string())),
            content_id,
            timestamp: None,
        },
        preview_urls,
        total_pages,
    }
}

#[async_trait(?Send)]
impl Platform for PixivPlatform {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Pixiv
    }

    fn detect(&self, page: &Page, event: InteractionEvent) -> bool {
        detector::find_bookmark_control(page, event.target).is_some()
    }

    async fn handle(&self, page: &Page, event: InteractionEvent) -> Result<bool> {
        let Some(control) = detector::find_bookmark_control(page, event.target) else {
            return Ok(false);
        };

        let container = {
            let mut cache = self.cache.lock().unwrap();
            match cache.container_for(page, control) {
                Some(container) => Some(container),
                None => {
                    let found = detector::find_artwork_container(page, control);
                    if let Some(container) = found {
                        cache.store(page, control, container);
                    }
                    found
                }
            }
        };
        let nodes =
            container.and_then(|c| self.cache.lock().unwrap().nodes_for(page, c));

        let extraction = if page.url_str().starts_with(ARTWORK_PAGE_PREFIX) {
            extract_on_artwork_page(page, nodes.as_ref())
        } else if let Some(container) = container {
            extract_in_feed(page, container, nodes.as_ref())
        } else {
            return Ok(false);
        };

        if extraction.preview_urls.is_empty() {
            debug!("no preview images found, not handling");
            return Ok(false);
        }

        info!(
            author = %extraction.metadata.author_id,
            illust_id = %extraction.metadata.content_id,
            pages = extraction.total_pages,
            "handling pixiv interaction"
        );

        let proxy = self.config.proxy_domain().await?;
        let tokens = self.config.filename_formats().await?.pixiv;

        let mut bases: Vec<(String, resolver::OriginalImage)> = Vec::new();
        for src in &extraction.preview_urls {
            let Some(original) = resolver::build_original_image_url(
                src,
                &proxy,
                Some(&extraction.metadata.content_id),
            ) else {
                debug!(src, "preview path not recognized, skipping");
                continue;
            };
            if !bases.iter().any(|(_, b)| b.url == original.url) {
                bases.push((src.clone(), original));
            }
        }

        let mut saved = 0usize;
        for (preview, base) in &bases {
            let metadata = ContentMetadata {
                content_id: base.illust_id.clone(),
                ..extraction.metadata.clone()
            };
            let series = resolver::series_urls(&base.url, extraction.total_pages);
            let total = series.len();
            let candidates: Vec<MediaCandidate> = series
                .into_iter()
                .enumerate()
                .map(|(index, url)| MediaCandidate {
                    preview_url: preview.clone(),
                    resolved_url: Some(url),
                    kind: MediaKind::Image,
                    resolution: None,
                    sequence_index: index,
                    sequence_total: total,
                })
                .collect();
            saved += self
                .download_candidates(&candidates, &metadata, &tokens)
                .await?;
        }

        if saved > 0 {
            self.notifier
                .success("Download complete", &format!("{saved} item(s) saved"));
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_suffix_only_for_multi_page_series() {
        assert_eq!(with_page_suffix("a_1.png", 0, 1), "a_1.png");
        assert_eq!(with_page_suffix("a_1.png", 0, 3), "a_1_p0.png");
        assert_eq!(with_page_suffix("a_1.png", 2, 3), "a_1_p2.png");
    }

    #[test]
    fn href_id_extraction() {
        assert_eq!(
            illust_id_from_href("https://www.pixiv.net/artworks/119870733").as_deref(),
            Some("119870733")
        );
        assert_eq!(user_id_from_href("/users/77").as_deref(), Some("77"));
        assert!(illust_id_from_href("/tags/oc").is_none());
    }

    #[test]
    fn author_name_rejection_falls_back_to_alt() {
        let doc = r#"<html><body>
            <a id="l" href="/users/77">查看更多作品<img src="a.jpg" alt="ArtistName"></a>
        </body></html>"#;
        let page = Page::parse("https://www.pixiv.net/", doc).unwrap();
        let link = page.select_first("#l").unwrap();
        let (id, name) = author_from_link(&page, link);
        assert_eq!(id, "77");
        assert_eq!(name.as_deref(), Some("ArtistName"));
    }

    #[test]
    fn caption_alt_is_not_a_name() {
        let doc = r#"<html><body>
            <a id="l" href="/users/77"><img src="a.jpg" alt="凪的插画"></a>
        </body></html>"#;
        let page = Page::parse("https://www.pixiv.net/", doc).unwrap();
        let link = page.select_first("#l").unwrap();
        let (_, name) = author_from_link(&page, link);
        assert!(name.is_none());
    }

    #[test]
    fn good_link_text_is_kept() {
        let doc = r#"<html><body><a id="l" href="/users/77">ArtistName</a></body></html>"#;
        let page = Page::parse("https://www.pixiv.net/", doc).unwrap();
        let link = page.select_first("#l").unwrap();
        let (_, name) = author_from_link(&page, link);
        assert_eq!(name.as_deref(), Some("ArtistName"));
    }

    #[test]
    fn main_image_prefers_large_declared_images() {
        let doc = r#"<html><body>
            <img id="avatar" src="a.jpg" width="40" height="40">
            <img id="art" src="b.jpg" width="400" height="500">
            <img id="mid" src="c.jpg" width="100" height="120">
        </body></html>"#;
        let page = Page::parse("https://www.pixiv.net/", doc).unwrap();
        let images = page.select_all("img");
        let main = pick_main_image(&page, &images).unwrap();
        assert_eq!(page.attr(main, "id"), Some("art"));
    }

    #[test]
    fn main_image_without_size_data_takes_the_first() {
        let doc = r#"<html><body>
            <img id="one" src="a.jpg"><img id="two" src="b.jpg">
        </body></html>"#;
        let page = Page::parse("https://www.pixiv.net/", doc).unwrap();
        let images = page.select_all("img");
        let main = pick_main_image(&page, &images).unwrap();
        assert_eq!(page.attr(main, "id"), Some("one"));
    }
}
