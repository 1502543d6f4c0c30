// Platform integrations — each platform knows how to recognize its
// interaction control, bound the content container, extract metadata,
// and resolve media to original-quality URLs.

pub mod pixiv;
pub mod twitter;

use anyhow::Result;
use async_trait::async_trait;
use ego_tree::NodeId;

use crate::page::Page;

pub const SENTINEL_AUTHOR: &str = "unknown_author";
pub const SENTINEL_AUTHOR_NAME: &str = "unknown_author_name";
pub const SENTINEL_ID: &str = "unknown_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformKind {
    Twitter,
    Pixiv,
}

impl PlatformKind {
    pub fn name(&self) -> &'static str {
        match self {
            PlatformKind::Twitter => "twitter",
            PlatformKind::Pixiv => "pixiv",
        }
    }
}

/// What an interaction's container yields. Built once per interaction and
/// immutable afterwards; fields the page didn't provide hold sentinels so
/// extraction never fails the interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentMetadata {
    pub author_id: String,
    pub author_name: Option<String>,
    pub content_id: String,
    /// Compact `YYYYMMDD` token when the page carried a machine-readable
    /// datetime.
    pub timestamp: Option<String>,
}

impl ContentMetadata {
    pub fn unknown() -> Self {
        Self {
            author_id: SENTINEL_AUTHOR.to_string(),
            author_name: None,
            content_id: SENTINEL_ID.to_string(),
            timestamp: None,
        }
    }
}

/// A user interaction as the orchestrator sees it. The hint narrows
/// which platforms are asked; without one, attribution happens via
/// `Platform::detect` across all active platforms.
#[derive(Debug, Clone, Copy)]
pub struct InteractionEvent {
    pub target: NodeId,
    pub platform_hint: Option<PlatformKind>,
}

impl InteractionEvent {
    pub fn new(target: NodeId) -> Self {
        Self {
            target,
            platform_hint: None,
        }
    }

    pub fn with_hint(target: NodeId, hint: PlatformKind) -> Self {
        Self {
            target,
            platform_hint: Some(hint),
        }
    }
}

/// One piece of media an interaction wants saved. Created from located
/// media elements, the resolved URL filled in by the platform's media
/// resolver, consumed by the downloader, then discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaCandidate {
    pub preview_url: String,
    pub resolved_url: Option<String>,
    pub kind: crate::download::MediaKind,
    pub resolution: Option<String>,
    pub sequence_index: usize,
    pub sequence_total: usize,
}

/// One platform integration.
///
/// `detect` must be cheap and side-effect free — the orchestrator calls
/// it for every active platform on every click. `handle` runs the full
/// pipeline and reports whether the interaction was consumed; internal
/// failures are logged by the platform, not raised.
#[async_trait(?Send)]
pub trait Platform {
    fn kind(&self) -> PlatformKind;

    fn detect(&self, page: &Page, event: InteractionEvent) -> bool;

    async fn handle(&self, page: &Page, event: InteractionEvent) -> Result<bool>;
}
