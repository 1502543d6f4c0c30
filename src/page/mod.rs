// Page snapshot — parsed markup plus the page-level context the pipeline
// reads: current URL, cookie jar, recorded resource-timing entries.
//
// Nodes are addressed by `ego_tree::NodeId` so containers and controls can
// be held across calls (and used as cache keys) without borrowing the
// tree. The snapshot is read-only for the pipeline; `navigate` and
// `detach` exist to mirror host-page changes (SPA navigation, React
// re-renders) into the model.

pub mod strategy;

use std::collections::HashMap;

use anyhow::{Context, Result};
use ego_tree::NodeId;
use scraper::{ElementRef, Html, Selector};
use url::Url;

pub struct Page {
    html: Html,
    url: Url,
    cookies: HashMap<String, String>,
    resource_entries: Vec<String>,
}

impl Page {
    pub fn parse(url: &str, source: &str) -> Result<Self> {
        let url = Url::parse(url).with_context(|| format!("Invalid page URL: {url}"))?;
        Ok(Self {
            html: Html::parse_document(source),
            url,
            cookies: HashMap::new(),
            resource_entries: Vec::new(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn url_str(&self) -> &str {
        self.url.as_str()
    }

    /// Mirror an SPA navigation: same document object, new address.
    pub fn navigate(&mut self, url: &str) -> Result<()> {
        self.url = Url::parse(url).with_context(|| format!("Invalid page URL: {url}"))?;
        Ok(())
    }

    /// Parse a `name=value; name2=value2` cookie string into the jar.
    pub fn set_cookies(&mut self, cookie_header: &str) {
        for pair in cookie_header.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=') {
                self.cookies
                    .insert(name.trim().to_string(), value.trim().to_string());
            }
        }
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Record a URL the page was observed to have fetched (the model of
    /// the browser's resource-timing buffer).
    pub fn record_resource(&mut self, url: impl Into<String>) {
        self.resource_entries.push(url.into());
    }

    pub fn resource_entries(&self) -> &[String] {
        &self.resource_entries
    }

    // -- Node access --

    pub fn element(&self, id: NodeId) -> Option<ElementRef<'_>> {
        self.html.tree.get(id).and_then(ElementRef::wrap)
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|el| el.value().attr(name))
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|el| el.value().name())
    }

    /// Concatenated descendant text.
    pub fn text(&self, id: NodeId) -> String {
        self.element(id)
            .map(|el| el.text().collect::<String>())
            .unwrap_or_default()
    }

    // -- Queries --

    /// First match in the whole document.
    pub fn select_first(&self, css: &str) -> Option<NodeId> {
        let selector = Selector::parse(css).ok()?;
        self.html.select(&selector).next().map(|el| el.id())
    }

    /// All matches in the whole document.
    pub fn select_all(&self, css: &str) -> Vec<NodeId> {
        let Ok(selector) = Selector::parse(css) else {
            return Vec::new();
        };
        self.html.select(&selector).map(|el| el.id()).collect()
    }

    /// All matches among the descendants of `root`.
    pub fn select_within(&self, root: NodeId, css: &str) -> Vec<NodeId> {
        let Ok(selector) = Selector::parse(css) else {
            return Vec::new();
        };
        let Some(root) = self.element(root) else {
            return Vec::new();
        };
        root.select(&selector).map(|el| el.id()).collect()
    }

    /// First match among the descendants of `root`.
    pub fn select_first_within(&self, root: NodeId, css: &str) -> Option<NodeId> {
        let selector = Selector::parse(css).ok()?;
        self.element(root)?.select(&selector).next().map(|el| el.id())
    }

    /// Nearest self-or-ancestor element matching the selector.
    pub fn closest(&self, id: NodeId, css: &str) -> Option<NodeId> {
        let selector = Selector::parse(css).ok()?;
        let start = self.element(id)?;
        if selector.matches(&start) {
            return Some(id);
        }
        for node in start.ancestors() {
            if let Some(el) = ElementRef::wrap(node) {
                if selector.matches(&el) {
                    return Some(el.id());
                }
            }
        }
        None
    }

    /// Nearest enclosing element (skipping non-element nodes).
    pub fn parent_element(&self, id: NodeId) -> Option<NodeId> {
        let node = self.html.tree.get(id)?;
        node.ancestors()
            .find_map(|a| ElementRef::wrap(a).map(|el| el.id()))
    }

    // -- Structure checks --

    /// Self-inclusive containment, like DOM `Node.contains`.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        if ancestor == node {
            return true;
        }
        let Some(node) = self.html.tree.get(node) else {
            return false;
        };
        node.ancestors().any(|a| a.id() == ancestor)
    }

    /// Is the node still connected to the document root? Cached lookups
    /// must not be trusted once this turns false.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let Some(node) = self.html.tree.get(id) else {
            return false;
        };
        let root = self.html.tree.root().id();
        if node.id() == root {
            return true;
        }
        node.ancestors().last().map(|a| a.id()) == Some(root)
    }

    /// Mirror a host-page removal of a subtree.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(mut node) = self.html.tree.get_mut(id) {
            node.detach();
        }
    }
}
