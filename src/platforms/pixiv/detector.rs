// Pixiv DOM location — bookmark-control detection and artwork-container
// resolution over markup whose class names are build artifacts.
//
// Detection runs a three-tier chain: class substring, analytics label,
// then a structural heuristic for unmarked buttons. Container resolution
// splits on feed topology: the following feed has one card per artwork
// (a plain ancestor walk works), while recommendation grids share a broad
// ancestor across many artworks, so the walk must verify that exactly the
// clicked control sits inside a candidate before accepting it.

use ego_tree::NodeId;

use crate::page::strategy::{resolve_first, Strategy};
use crate::page::Page;

/// Button text that marks a follow control in the supported locales —
/// never a bookmark.
const FOLLOW_WORDING: &[&str] = &["关注", "フォロー", "follow"];

/// Feed wording that marks a recommendation block ("other works").
const RECOMMENDATION_WORDING: &[&str] = &["其他作品", "的其他作品"];

/// Upper bound on the recommendation-grid ancestor walk.
const MAX_GRID_HOPS: usize = 8;

/// Declared dimension above which an image reads as a primary artwork
/// rather than a thumbnail.
const LARGE_IMAGE_EDGE: u32 = 300;

fn by_class_substring(page: &Page, target: NodeId) -> Option<NodeId> {
    page.closest(target, r#"[class*="bookmark"]"#)
}

fn by_ga4_label(page: &Page, target: NodeId) -> Option<NodeId> {
    page.closest(target, r#"[data-ga4-label="bookmark_button"]"#)
}

fn by_heuristic_button(page: &Page, target: NodeId) -> Option<NodeId> {
    let button = page.closest(target, "button")?;
    if is_likely_bookmark_button(page, button) {
        Some(button)
    } else {
        None
    }
}

/// The bookmark control the click landed on, if any.
pub fn find_bookmark_control(page: &Page, target: NodeId) -> Option<NodeId> {
    const CHAIN: &[Strategy] = &[
        Strategy {
            name: "class-substring",
            resolve: by_class_substring,
        },
        Strategy {
            name: "ga4-label",
            resolve: by_ga4_label,
        },
        Strategy {
            name: "heuristic-button",
            resolve: by_heuristic_button,
        },
    ];
    resolve_first(CHAIN, page, target).map(|r| r.node)
}

/// Structural check for unmarked buttons: sits in a card that has an
/// image and a content link, carries an icon, and is not a follow button
/// in any supported locale.
fn is_likely_bookmark_button(page: &Page, button: NodeId) -> bool {
    let Some(card) = page.closest(button, r#"li, [class*="sc-"], div"#) else {
        return false;
    };
    let has_image = page.select_first_within(card, "img").is_some();
    let has_content_link = page
        .select_first_within(card, r#"a[href*="/artworks/"], a[href*="/users/"]"#)
        .is_some();
    let has_icon = page.select_first_within(button, "svg, img").is_some();

    let text = page.text(button).trim().to_lowercase();
    let is_follow = FOLLOW_WORDING.iter().any(|word| text.contains(word));

    has_image && has_content_link && has_icon && !is_follow
}

/// Recommendation-grid check, first signal wins:
/// (1) explicit grid marker, (2) recommendation wording or class in the
/// nearest block ancestor, (3) more than 3 bookmark controls under it,
/// (4) a large declared primary image.
pub fn is_recommendation_feed(page: &Page, control: NodeId) -> bool {
    if page
        .closest(control, r#"[data-ga4-label="work_content"]"#)
        .is_some()
    {
        return true;
    }
    let Some(block) = page.closest(control, "div") else {
        return false;
    };

    let text = page.text(block);
    if RECOMMENDATION_WORDING.iter().any(|word| text.contains(word))
        || page
            .select_first_within(block, r#"[class*="recommend"], [class*="suggest"]"#)
            .is_some()
    {
        return true;
    }

    let bookmark_count = page
        .select_within(block, r#"button[data-ga4-label="bookmark_button"]"#)
        .len();
    if bookmark_count > 3 {
        return true;
    }

    page.select_first_within(block, "img")
        .map(|img| {
            declared_dimension(page, img, "width") > LARGE_IMAGE_EDGE
                || declared_dimension(page, img, "height") > LARGE_IMAGE_EDGE
        })
        .unwrap_or(false)
}

fn declared_dimension(page: &Page, node: NodeId, attr: &str) -> u32 {
    page.attr(node, attr)
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// Declared width × height, for largest-element selection.
pub fn declared_area(page: &Page, node: NodeId) -> u64 {
    declared_dimension(page, node, "width") as u64 * declared_dimension(page, node, "height") as u64
}

fn has_artwork_shape(page: &Page, node: NodeId) -> bool {
    page.select_first_within(node, "img").is_some()
        && page
            .select_first_within(node, r#"a[href*="/artworks/"]"#)
            .is_some()
}

/// Linear-feed resolution: nearest card-like ancestor that holds both an
/// image and an artwork link, ending with a plain ancestor walk.
pub fn find_following_container(page: &Page, control: NodeId) -> Option<NodeId> {
    if let Some(li) = page.closest(control, "li") {
        if has_artwork_shape(page, li) {
            return Some(li);
        }
    }
    for selector in [r#"[class*="sc-"]"#, r#"[class*="gtm-"]"#] {
        if let Some(node) = page.closest(control, selector) {
            if has_artwork_shape(page, node) {
                return Some(node);
            }
        }
    }

    let mut current = page.parent_element(control)?;
    loop {
        if page.tag_name(current) == Some("body") {
            return None;
        }
        if has_artwork_shape(page, current) {
            return Some(current);
        }
        current = page.parent_element(current)?;
    }
}

fn count_contained(page: &Page, nodes: &[NodeId], container: NodeId, cap: usize) -> usize {
    let mut count = 0;
    for &node in nodes {
        if !page.contains(container, node) {
            continue;
        }
        count += 1;
        if count >= cap {
            break;
        }
    }
    count
}

struct ControlCount {
    count: usize,
    /// Whether the clicked control is (or is inside) one of the counted
    /// controls.
    matches: bool,
}

fn count_controls(
    page: &Page,
    controls: &[NodeId],
    container: NodeId,
    clicked: NodeId,
    cap: usize,
) -> ControlCount {
    let mut count = 0;
    let mut matches = false;
    for &node in controls {
        if !page.contains(container, node) {
            continue;
        }
        count += 1;
        if node == clicked || page.contains(node, clicked) {
            matches = true;
        }
        if count >= cap {
            break;
        }
    }
    ControlCount { count, matches }
}

/// Recommendation-grid resolution: walk upward at most `MAX_GRID_HOPS`,
/// accepting an ancestor only when it bounds media, a content link, and
/// uniquely the clicked control — then weaker acceptance signals (an
/// illust entity id, or a near-unique link count) — before giving up and
/// falling back to the linear strategy.
pub fn find_recommendation_container(page: &Page, control: NodeId) -> Option<NodeId> {
    let all_images = page.select_all("img");
    let all_links = page.select_all(r#"a[href*="/artworks/"]"#);
    let all_controls = page.select_all(r#"button[data-ga4-label="bookmark_button"]"#);

    let mut current = control;
    for _ in 0..MAX_GRID_HOPS {
        let Some(parent) = page.parent_element(current) else {
            break;
        };
        current = parent;
        if page.tag_name(current) == Some("body") {
            break;
        }

        let image_count = count_contained(page, &all_images, current, 1);
        let link_count = count_contained(page, &all_links, current, 3);
        let controls = count_controls(page, &all_controls, current, control, 2);

        if image_count > 0 && link_count > 0 && controls.count == 1 && controls.matches {
            return Some(current);
        }

        if let Some(entity_id) = page.attr(current, "data-ga4-entity-id") {
            if entity_id.starts_with("illust/") && image_count > 0 && link_count > 0 {
                return Some(current);
            }
        }

        if image_count > 0 && link_count > 0 && link_count <= 2 {
            return Some(current);
        }
    }

    find_following_container(page, control)
}

/// Resolve the artwork container for a control, by feed topology.
pub fn find_artwork_container(page: &Page, control: NodeId) -> Option<NodeId> {
    if is_recommendation_feed(page, control) {
        find_recommendation_container(page, control)
    } else {
        find_following_container(page, control)
    }
}
