// Video URL discovery — a cache fed passively by observed traffic, plus
// the ordered fallback states that hunt for a direct mp4 when the cache
// is cold. First success wins; exhaustion is a `None`, and the caller
// decides what to log.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::net::{hls, HttpFetch, NetworkEvent, NetworkHub};
use crate::page::Page;

use super::api;

/// Captured URLs go stale after this long; the page may have rotated
/// its signed CDN links by then.
pub const VIDEO_CACHE_TTL: Duration = Duration::from_secs(3600);

/// How long the timed network listener stays attached.
pub const NETWORK_WATCH_TIMEOUT: Duration = Duration::from_secs(5);

/// A usable video URL with its display resolution (filename decoration
/// only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVideo {
    pub url: String,
    pub resolution: String,
}

struct CacheSlot {
    video: ResolvedVideo,
    captured_at: Instant,
}

/// Tweet-id-keyed cache of discovered video URLs.
///
/// Shared between the passive capture task (producer) and resolvers
/// (consumers); cheap to clone. Expired slots read as absent and are
/// dropped on access.
#[derive(Clone, Default)]
pub struct VideoCache {
    inner: Arc<Mutex<HashMap<String, CacheSlot>>>,
}

impl VideoCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tweet_id: &str, video: ResolvedVideo) {
        let mut map = self.inner.lock().unwrap();
        map.insert(
            tweet_id.to_string(),
            CacheSlot {
                video,
                captured_at: Instant::now(),
            },
        );
    }

    pub fn get(&self, tweet_id: &str) -> Option<ResolvedVideo> {
        let mut map = self.inner.lock().unwrap();
        match map.get(tweet_id) {
            Some(slot) if slot.captured_at.elapsed() < VIDEO_CACHE_TTL => {
                Some(slot.video.clone())
            }
            Some(_) => {
                map.remove(tweet_id);
                None
            }
            None => None,
        }
    }
}

/// Watch the hub for video-detail GraphQL responses and feed the cache.
///
/// Runs until the hub is dropped. Entries may land before any resolution
/// starts — the resolver re-checks the cache first, so the race is
/// harmless in either direction.
pub fn spawn_passive_capture(hub: &NetworkHub, cache: VideoCache) -> tokio::task::JoinHandle<()> {
    let mut tap = hub.tap();
    tokio::spawn(async move {
        while let Some(event) = tap.next().await {
            let NetworkEvent::JsonResponse { url, body } = event else {
                continue;
            };
            if !api::is_video_detail_route(&url) {
                continue;
            }
            for capture in api::extract_video_captures(&body) {
                debug!(tweet_id = %capture.tweet_id, "passively captured video URL");
                cache.insert(
                    &capture.tweet_id,
                    ResolvedVideo {
                        url: capture.url,
                        resolution: capture.resolution,
                    },
                );
            }
        }
    })
}

/// The discovery state machine. States run strictly in order; each is
/// fallible and the first to produce a URL ends the run.
pub struct VideoResolver {
    cache: VideoCache,
    hub: NetworkHub,
    http: Arc<dyn HttpFetch>,
}

impl VideoResolver {
    pub fn new(cache: VideoCache, hub: NetworkHub, http: Arc<dyn HttpFetch>) -> Self {
        Self { cache, hub, http }
    }

    /// Resolve a direct mp4 for `video_id` belonging to `tweet_id`.
    ///
    /// `fallback_resolution` decorates URLs found by states that don't
    /// learn a resolution of their own (API replay, resource timing,
    /// direct-mp4 sniff, script scan).
    pub async fn resolve(
        &self,
        page: &Page,
        tweet_id: &str,
        video_id: &str,
        fallback_resolution: &str,
    ) -> Option<ResolvedVideo> {
        // State 1+2: the cache, which passive capture may already have
        // filled (or may fill while later states run — hence re-checks).
        if let Some(video) = self.cache.get(tweet_id) {
            info!(tweet_id, "video resolved from cache");
            return Some(video);
        }

        // State 3: active GraphQL replay, both query shapes.
        if let Some(url) = api::fetch_video_url(self.http.as_ref(), page, tweet_id).await {
            let resolution = api::resolution_from_url(&url)
                .unwrap_or_else(|| fallback_resolution.to_string());
            info!(tweet_id, "video resolved via API replay");
            return Some(ResolvedVideo { url, resolution });
        }

        // State 4: the page's recorded resource-timing entries.
        if let Some(url) = scan_resource_entries(page, video_id) {
            info!(tweet_id, "video resolved from resource timing");
            return Some(ResolvedVideo {
                url,
                resolution: fallback_resolution.to_string(),
            });
        }

        // State 5: timed network listener.
        if let Some(video) = self.watch_network(video_id, fallback_resolution).await {
            info!(tweet_id, "video resolved from network watch");
            return Some(video);
        }

        // State 6: inline script scan, the last resort.
        if let Some(url) = scan_page_scripts(page, video_id) {
            info!(tweet_id, "video resolved from page scripts");
            return Some(ResolvedVideo {
                url,
                resolution: fallback_resolution.to_string(),
            });
        }

        debug!(tweet_id, video_id, "all video discovery states failed");
        None
    }

    /// Hold a tap on the hub until a matching CDN request shows up or
    /// the timeout elapses. The tap is dropped on every way out of this
    /// function, so no observation outlives the resolution that needed
    /// it.
    async fn watch_network(&self, video_id: &str, fallback_resolution: &str) -> Option<ResolvedVideo> {
        let mut tap = self.hub.tap();
        let watch = async {
            while let Some(event) = tap.next().await {
                let url = event.url();
                if !url.contains("video.twimg.com") || !url.contains(video_id) {
                    continue;
                }
                if url.contains(".m3u8") {
                    if let Some(video) = self.resolve_hls(url).await {
                        return Some(video);
                    }
                } else if url.contains(".mp4") && url.contains("/vid/") && !url.contains(".m4s") {
                    return Some(ResolvedVideo {
                        url: url.to_string(),
                        resolution: fallback_resolution.to_string(),
                    });
                }
            }
            None
        };
        tokio::time::timeout(NETWORK_WATCH_TIMEOUT, watch)
            .await
            .unwrap_or(None)
    }

    /// Chase an observed HLS master playlist down to a playable mp4:
    /// master → variant with a RESOLUTION tag → `#EXT-X-MAP` init
    /// segment.
    async fn resolve_hls(&self, master_url: &str) -> Option<ResolvedVideo> {
        let master = self.http.get_text(master_url).await.ok()?;
        let variant = hls::find_variant(&master)?;
        let playlist = self.http.get_text(&variant.url).await.ok()?;
        let init_url = hls::find_init_segment(&playlist)?;
        Some(ResolvedVideo {
            url: init_url,
            resolution: variant.resolution,
        })
    }
}

/// State 4 predicate: an already-fetched amplify mp4 that isn't a
/// fragment.
fn scan_resource_entries(page: &Page, video_id: &str) -> Option<String> {
    page.resource_entries()
        .iter()
        .find(|entry| {
            entry.contains("video.twimg.com")
                && entry.contains("amplify_video")
                && entry.contains(video_id)
                && entry.contains(".mp4")
                && !entry.contains(".m4s")
        })
        .cloned()
}

/// State 6: a literal amplify URL for this id somewhere in inline script
/// text.
fn scan_page_scripts(page: &Page, video_id: &str) -> Option<String> {
    let pattern = format!(r#"https://video\.twimg\.com/amplify_video/{video_id}/[^"]+\.mp4"#);
    let re = regex_lite::Regex::new(&pattern).ok()?;
    for script in page.select_all("script") {
        let text = page.text(script);
        if !text.contains("video_url") || !text.contains(video_id) {
            continue;
        }
        if let Some(found) = re.find(&text) {
            return Some(found.as_str().to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(url: &str) -> ResolvedVideo {
        ResolvedVideo {
            url: url.to_string(),
            resolution: "1280x720".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_entries_hit() {
        let cache = VideoCache::new();
        cache.insert("42", video("https://v/hi.mp4"));
        assert_eq!(cache.get("42"), Some(video("https://v/hi.mp4")));
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = VideoCache::new();
        cache.insert("42", video("https://v/hi.mp4"));

        tokio::time::advance(VIDEO_CACHE_TTL + Duration::from_millis(1)).await;
        assert!(cache.get("42").is_none());
        // The expired slot is gone, not just hidden.
        assert!(cache.inner.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn entries_just_under_ttl_still_hit() {
        let cache = VideoCache::new();
        cache.insert("42", video("https://v/hi.mp4"));

        tokio::time::advance(VIDEO_CACHE_TTL - Duration::from_secs(1)).await;
        assert!(cache.get("42").is_some());
    }

    #[tokio::test]
    async fn passive_capture_feeds_the_cache() {
        let hub = NetworkHub::new();
        let cache = VideoCache::new();
        let task = spawn_passive_capture(&hub, cache.clone());

        let body = serde_json::json!({
            "data": { "tweetResult": { "result": {
                "rest_id": "42",
                "legacy": {
                    "id_str": "42",
                    "extended_entities": { "media": [{
                        "type": "video",
                        "video_info": { "variants": [
                            { "content_type": "video/mp4", "bitrate": 100,
                              "url": "https://video.twimg.com/amplify_video/9/vid/1280x720/a.mp4" },
                        ] }
                    }] }
                }
            } } }
        });
        hub.publish(NetworkEvent::JsonResponse {
            url: "https://x.com/i/api/graphql/q/TweetResultByRestId".to_string(),
            body: Arc::new(body),
        });

        // Let the capture task drain the event.
        let mut cached = None;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            cached = cache.get("42");
            if cached.is_some() {
                break;
            }
        }

        assert_eq!(cached.unwrap().resolution, "1280x720");
        task.abort();
    }

    #[tokio::test]
    async fn non_video_routes_are_ignored_by_capture() {
        let hub = NetworkHub::new();
        let cache = VideoCache::new();
        let task = spawn_passive_capture(&hub, cache.clone());

        hub.publish(NetworkEvent::JsonResponse {
            url: "https://x.com/i/api/graphql/q/UserByScreenName".to_string(),
            body: Arc::new(serde_json::json!({})),
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(cache.inner.lock().unwrap().is_empty());
        task.abort();
    }

    #[test]
    fn resource_scan_skips_fragments() {
        let mut page = Page::parse("https://x.com/home", "<html><body></body></html>").unwrap();
        page.record_resource("https://video.twimg.com/amplify_video/55/vid/720/seg1.m4s");
        page.record_resource("https://video.twimg.com/amplify_video/55/vid/720/full.mp4");
        page.record_resource("https://video.twimg.com/amplify_video/99/vid/720/other.mp4");

        assert_eq!(
            scan_resource_entries(&page, "55").as_deref(),
            Some("https://video.twimg.com/amplify_video/55/vid/720/full.mp4")
        );
        assert!(scan_resource_entries(&page, "77").is_none());
    }

    #[test]
    fn script_scan_finds_literal_url() {
        let doc = r#"
            <html><body>
              <script>var unrelated = 1;</script>
              <script>
                window.state = {"video_url":"https://video.twimg.com/amplify_video/55/vid/1280x720/full.mp4"};
              </script>
            </body></html>
        "#;
        let page = Page::parse("https://x.com/home", doc).unwrap();
        assert_eq!(
            scan_page_scripts(&page, "55").as_deref(),
            Some("https://video.twimg.com/amplify_video/55/vid/1280x720/full.mp4")
        );
        assert!(scan_page_scripts(&page, "66").is_none());
    }
}
