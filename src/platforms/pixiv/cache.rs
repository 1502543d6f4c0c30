// DOM lookup cache for pixiv container resolution.
//
// Container hunts over the obfuscated feed markup are the expensive part
// of an interaction, and users often click the same control twice
// (bookmark, un-bookmark, bookmark). The cache remembers, per control,
// the resolved container and a snapshot of its interesting child nodes.
//
// Two invalidation rules keep hits honest: everything drops on a page
// URL change (SPA navigation invalidates both layout and content
// identity), and a hit is only trusted while the cached container is
// still attached to the document.

use std::collections::HashMap;
use std::time::Instant;

use ego_tree::NodeId;
use tracing::debug;

use crate::page::Page;

/// Child nodes worth keeping from a resolved container.
#[derive(Debug, Clone)]
pub struct CachedNodes {
    pub images: Vec<NodeId>,
    pub artwork_links: Vec<NodeId>,
    pub user_links: Vec<NodeId>,
    pub captured_at: Instant,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub queries: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

pub struct DomCache {
    control_to_container: HashMap<NodeId, NodeId>,
    containers: HashMap<NodeId, CachedNodes>,
    last_url: String,
    stats: CacheStats,
}

impl DomCache {
    pub fn new(initial_url: &str) -> Self {
        Self {
            control_to_container: HashMap::new(),
            containers: HashMap::new(),
            last_url: initial_url.to_string(),
            stats: CacheStats::default(),
        }
    }

    /// Drop everything if the page has navigated since the last query.
    fn check_navigation(&mut self, page: &Page) {
        if page.url_str() != self.last_url {
            debug!(url = page.url_str(), "page navigated, dropping DOM cache");
            self.last_url = page.url_str().to_string();
            self.clear();
        }
    }

    /// Cached container for a control, if the entry is still valid.
    pub fn container_for(&mut self, page: &Page, control: NodeId) -> Option<NodeId> {
        self.check_navigation(page);
        self.stats.queries += 1;

        let Some(&container) = self.control_to_container.get(&control) else {
            self.stats.misses += 1;
            return None;
        };
        if !page.is_attached(container) {
            self.control_to_container.remove(&control);
            self.containers.remove(&container);
            self.stats.misses += 1;
            return None;
        }
        self.stats.hits += 1;
        Some(container)
    }

    /// Remember a resolved container and snapshot its child nodes.
    pub fn store(&mut self, page: &Page, control: NodeId, container: NodeId) {
        self.control_to_container.insert(control, container);
        self.containers.insert(
            container,
            CachedNodes {
                images: page.select_within(container, "img"),
                artwork_links: page.select_within(container, r#"a[href*="/artworks/"]"#),
                user_links: page.select_within(container, r#"a[href*="/users/"]"#),
                captured_at: Instant::now(),
            },
        );
    }

    /// The snapshot for a container, while it remains attached.
    pub fn nodes_for(&mut self, page: &Page, container: NodeId) -> Option<CachedNodes> {
        if !page.is_attached(container) {
            self.containers.remove(&container);
            return None;
        }
        self.containers.get(&container).cloned()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn clear(&mut self) {
        self.control_to_container.clear();
        self.containers.clear();
        self.stats = CacheStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
        <html><body>
          <li id="card">
            <a href="/artworks/111">art</a>
            <a href="/users/7">author</a>
            <img src="https://i.pximg.net/img/2025/01/02/03/04/05/111_p0_square.jpg">
            <button data-ga4-label="bookmark_button"><svg></svg></button>
          </li>
        </body></html>
    "#;

    fn setup() -> (Page, DomCache, NodeId, NodeId) {
        let page = Page::parse("https://www.pixiv.net/", DOC).unwrap();
        let cache = DomCache::new(page.url_str());
        let button = page.select_first("button").unwrap();
        let card = page.select_first("#card").unwrap();
        (page, cache, button, card)
    }

    #[test]
    fn store_then_hit() {
        let (page, mut cache, button, card) = setup();
        assert!(cache.container_for(&page, button).is_none());

        cache.store(&page, button, card);
        assert_eq!(cache.container_for(&page, button), Some(card));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.queries, 2);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn snapshot_captures_child_nodes() {
        let (page, mut cache, button, card) = setup();
        cache.store(&page, button, card);

        let nodes = cache.nodes_for(&page, card).unwrap();
        assert_eq!(nodes.images.len(), 1);
        assert_eq!(nodes.artwork_links.len(), 1);
        assert_eq!(nodes.user_links.len(), 1);
    }

    #[test]
    fn detached_container_is_not_served() {
        let (mut page, mut cache, button, card) = setup();
        cache.store(&page, button, card);
        assert_eq!(cache.container_for(&page, button), Some(card));

        page.detach(card);
        assert!(cache.container_for(&page, button).is_none());
        assert!(cache.nodes_for(&page, card).is_none());
    }

    #[test]
    fn navigation_drops_everything() {
        let (mut page, mut cache, button, card) = setup();
        cache.store(&page, button, card);
        assert_eq!(cache.container_for(&page, button), Some(card));

        page.navigate("https://www.pixiv.net/artworks/999").unwrap();
        assert!(cache.container_for(&page, button).is_none());

        // Stats were reset by the navigation; only the post-navigation
        // miss remains.
        assert_eq!(cache.stats().queries, 1);
        assert_eq!(cache.stats().misses, 1);
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn empty_cache_hit_rate_is_zero() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
