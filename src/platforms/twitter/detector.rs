// Twitter DOM location and extraction.
//
// The markup is a class-name-obfuscated React tree, but the like control
// and timeline cells carry stable data-testid markers. Detection tries
// the exact marker first and only then a semantic aria-label fallback;
// container resolution prefers the cell marker and falls back to a plain
// ancestor walk looking for a subtree that holds both media and a status
// link.

use chrono::DateTime;
use ego_tree::NodeId;
use regex_lite::Regex;
use url::Url;

use crate::page::strategy::{resolve_first, Strategy};
use crate::page::Page;
use crate::platforms::{ContentMetadata, SENTINEL_AUTHOR, SENTINEL_ID};

/// Media host twitter serves tweet images from.
const IMAGE_HOST_MARKER: &str = "pbs.twimg.com/media/";

fn by_like_testid(page: &Page, target: NodeId) -> Option<NodeId> {
    page.closest(target, r#"[data-testid="like"]"#)
}

fn by_like_aria_label(page: &Page, target: NodeId) -> Option<NodeId> {
    let button = page.closest(target, "button")?;
    let label = page.attr(button, "aria-label")?.to_lowercase();
    if !label.contains("like") || label.contains("unlike") {
        return None;
    }
    // Only trust the label when the button actually sits in tweet markup.
    find_tweet_container(page, button).map(|_| button)
}

/// The like control the click landed on, if any.
pub fn find_like_control(page: &Page, target: NodeId) -> Option<NodeId> {
    const CHAIN: &[Strategy] = &[
        Strategy {
            name: "like-testid",
            resolve: by_like_testid,
        },
        Strategy {
            name: "like-aria-label",
            resolve: by_like_aria_label,
        },
    ];
    resolve_first(CHAIN, page, target).map(|r| r.node)
}

fn by_cell_marker(page: &Page, control: NodeId) -> Option<NodeId> {
    page.closest(control, r#"[data-testid="cellInnerDiv"]"#)
}

fn by_linear_walk(page: &Page, control: NodeId) -> Option<NodeId> {
    let mut current = page.parent_element(control)?;
    loop {
        if page.tag_name(current) == Some("body") {
            return None;
        }
        let has_media = page
            .select_within(current, "img")
            .iter()
            .any(|&img| is_tweet_image(page, img))
            || page
                .select_first_within(current, r#"[data-testid="videoComponent"]"#)
                .is_some();
        let has_status_link = page
            .select_first_within(current, r#"a[href*="/status/"]"#)
            .is_some();
        if has_media && has_status_link {
            return Some(current);
        }
        current = page.parent_element(current)?;
    }
}

/// The timeline cell bounding the clicked like control.
pub fn find_tweet_container(page: &Page, control: NodeId) -> Option<NodeId> {
    const CHAIN: &[Strategy] = &[
        Strategy {
            name: "cell-marker",
            resolve: by_cell_marker,
        },
        Strategy {
            name: "linear-walk",
            resolve: by_linear_walk,
        },
    ];
    resolve_first(CHAIN, page, control).map(|r| r.node)
}

fn is_tweet_image(page: &Page, img: NodeId) -> bool {
    page.attr(img, "src")
        .map(|src| src.contains(IMAGE_HOST_MARKER))
        .unwrap_or(false)
}

/// Pull author, tweet id and post time out of the cell. Missing pieces
/// become sentinels; this never refuses the interaction.
pub fn extract_metadata(page: &Page, container: NodeId) -> ContentMetadata {
    let mut author_id = SENTINEL_AUTHOR.to_string();
    for span in page.select_within(container, r#"[data-testid="User-Name"] span"#) {
        let text = page.text(span).trim().to_string();
        if text.contains('@') {
            author_id = text;
        }
    }

    let content_id = page
        .select_first_within(container, r#"a[href*="/status/"]"#)
        .and_then(|link| page.attr(link, "href").map(str::to_string))
        .and_then(|href| tweet_id_from_href(&href))
        .unwrap_or_else(|| SENTINEL_ID.to_string());

    let timestamp = page
        .select_first_within(container, "time")
        .and_then(|time| page.attr(time, "datetime"))
        .and_then(|datetime| DateTime::parse_from_rfc3339(datetime).ok())
        .map(|parsed| parsed.format("%Y%m%d").to_string());

    ContentMetadata {
        author_id,
        author_name: None,
        content_id,
        timestamp,
    }
}

fn tweet_id_from_href(href: &str) -> Option<String> {
    let re = Regex::new(r"status/(\d+)").ok()?;
    re.captures(href)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Source URLs of the cell's tweet images.
pub fn extract_images(page: &Page, container: NodeId) -> Vec<String> {
    page.select_within(container, "img")
        .into_iter()
        .filter(|&img| is_tweet_image(page, img))
        .filter_map(|img| page.attr(img, "src").map(str::to_string))
        .collect()
}

/// The cell's video component wrappers.
pub fn extract_video_components(page: &Page, container: NodeId) -> Vec<NodeId> {
    page.select_within(container, r#"[data-testid="videoComponent"]"#)
}

/// The amplify video id embedded in a poster thumbnail URL.
pub fn video_id_from_poster(poster: &str) -> Option<String> {
    let re = Regex::new(r"amplify_video_thumb/(\d+)/").ok()?;
    re.captures(poster)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Declared `WxH` of a video element, or "unknown".
pub fn declared_resolution(page: &Page, video: NodeId) -> String {
    match (page.attr(video, "width"), page.attr(video, "height")) {
        (Some(w), Some(h)) => format!("{w}x{h}"),
        _ => "unknown".to_string(),
    }
}

/// Rewrite a preview image URL to request the original quality rendition.
pub fn force_orig_quality(src: &str) -> Option<String> {
    let mut url = Url::parse(src).ok()?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| name != "name")
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();
    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (name, value) in &kept {
            pairs.append_pair(name, value);
        }
        pairs.append_pair("name", "orig");
    }
    Some(url.into())
}
