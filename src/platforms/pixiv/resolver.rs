// Pixiv image URL resolution — rebuild the original-quality asset URL
// from a preview URL's path, on a configurable proxy host.
//
// Preview paths come in two shapes: the full date-time form
// `img/YYYY/MM/DD/HH/MM/SS/<id>_...` and a coarser date-only form.
// The id embedded in the path can be stale in aggregated feeds, so a
// caller-supplied id wins when one is known. Unrecognized paths produce
// no candidate — guessing a URL would just download garbage.

use regex_lite::Regex;

use crate::platforms::SENTINEL_ID;

/// A rebuilt original-image URL, paired with the id that ended up in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalImage {
    pub illust_id: String,
    pub url: String,
}

/// Rebuild the original URL for a preview image.
///
/// `preferred_id` is the id resolved from the container or page URL; it
/// overrides the id embedded in the preview path unless it is missing or
/// the sentinel.
pub fn build_original_image_url(
    img_src: &str,
    proxy_domain: &str,
    preferred_id: Option<&str>,
) -> Option<OriginalImage> {
    let standard =
        Regex::new(r"img/(\d{4})/(\d{2})/(\d{2})/(\d{2})/(\d{2})/(\d{2})/(\d+)_").ok()?;
    if let Some(c) = standard.captures(img_src) {
        let embedded = c.get(7)?.as_str();
        let id = choose_id(preferred_id, embedded);
        return Some(OriginalImage {
            illust_id: id.to_string(),
            url: format!(
                "https://{}/img-original/img/{}/{}/{}/{}/{}/{}/{}_p0.png",
                proxy_domain,
                c.get(1)?.as_str(),
                c.get(2)?.as_str(),
                c.get(3)?.as_str(),
                c.get(4)?.as_str(),
                c.get(5)?.as_str(),
                c.get(6)?.as_str(),
                id,
            ),
        });
    }

    let simple = Regex::new(r"img/(\d{4})/(\d{2})/(\d{2})/(\d+)_").ok()?;
    if let Some(c) = simple.captures(img_src) {
        let embedded = c.get(4)?.as_str();
        let id = choose_id(preferred_id, embedded);
        return Some(OriginalImage {
            illust_id: id.to_string(),
            url: format!(
                "https://{}/img-original/img/{}/{}/{}/00/00/00/{}_p0.png",
                proxy_domain,
                c.get(1)?.as_str(),
                c.get(2)?.as_str(),
                c.get(3)?.as_str(),
                id,
            ),
        });
    }

    None
}

fn choose_id<'a>(preferred: Option<&'a str>, embedded: &'a str) -> &'a str {
    match preferred {
        Some(id) if !id.is_empty() && id != SENTINEL_ID => id,
        _ => embedded,
    }
}

/// Expand a `_p0` base URL into one URL per page of a multi-image post.
pub fn series_urls(base_url: &str, total_pages: usize) -> Vec<String> {
    (0..total_pages.max(1))
        .map(|index| base_url.replacen("_p0", &format!("_p{index}"), 1))
        .collect()
}

/// Parse an `n/m` page counter into the total page count.
pub fn parse_page_counter(text: &str) -> Option<usize> {
    let re = Regex::new(r"(\d+)/(\d+)").ok()?;
    let c = re.captures(text)?;
    c.get(2)?.as_str().parse().ok()
}

/// Parse a bare count indicator (a badge like "4"); only counts above 1
/// are meaningful.
pub fn parse_count_badge(text: &str) -> Option<usize> {
    let re = Regex::new(r"(\d+)").ok()?;
    let count: usize = re.captures(text)?.get(1)?.as_str().parse().ok()?;
    if count > 1 {
        Some(count)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREVIEW: &str =
        "https://i.pximg.net/c/250x250_80_a2/img-master/img/2025/03/04/10/20/30/118999_p0_square1200.jpg";
    const SIMPLE_PREVIEW: &str =
        "https://i.pximg.net/c/128x128/img-master/img/2025/03/04/118999_p0_square1200.jpg";

    #[test]
    fn standard_path_rebuilds_full_datetime_url() {
        let result = build_original_image_url(PREVIEW, "proxy.example", None).unwrap();
        assert_eq!(result.illust_id, "118999");
        assert_eq!(
            result.url,
            "https://proxy.example/img-original/img/2025/03/04/10/20/30/118999_p0.png"
        );
    }

    #[test]
    fn simple_path_pads_the_time_segments() {
        let result = build_original_image_url(SIMPLE_PREVIEW, "proxy.example", None).unwrap();
        assert_eq!(
            result.url,
            "https://proxy.example/img-original/img/2025/03/04/00/00/00/118999_p0.png"
        );
    }

    #[test]
    fn preferred_id_overrides_embedded_id() {
        let result = build_original_image_url(PREVIEW, "proxy.example", Some("777000")).unwrap();
        assert_eq!(result.illust_id, "777000");
        assert!(result.url.contains("/777000_p0.png"));
        assert!(!result.url.contains("118999"));
    }

    #[test]
    fn sentinel_preferred_id_keeps_embedded_id() {
        let result = build_original_image_url(PREVIEW, "proxy.example", Some(SENTINEL_ID)).unwrap();
        assert_eq!(result.illust_id, "118999");
    }

    #[test]
    fn unrecognized_paths_yield_no_candidate() {
        assert!(build_original_image_url(
            "https://i.pximg.net/user-profile/img/avatar.jpg",
            "proxy.example",
            Some("1"),
        )
        .is_none());
    }

    #[test]
    fn series_substitutes_the_page_index() {
        let urls = series_urls(
            "https://proxy.example/img-original/img/2025/03/04/10/20/30/118999_p0.png",
            3,
        );
        assert_eq!(urls.len(), 3);
        assert!(urls[0].ends_with("_p0.png"));
        assert!(urls[1].ends_with("_p1.png"));
        assert!(urls[2].ends_with("_p2.png"));
    }

    #[test]
    fn series_of_zero_still_yields_one_page() {
        assert_eq!(series_urls("https://h/x_p0.png", 0).len(), 1);
    }

    #[test]
    fn page_counter_takes_the_total() {
        assert_eq!(parse_page_counter("1/4"), Some(4));
        assert_eq!(parse_page_counter("  2/12 "), Some(12));
        assert!(parse_page_counter("no pages").is_none());
    }

    #[test]
    fn count_badge_needs_more_than_one() {
        assert_eq!(parse_count_badge("4"), Some(4));
        assert!(parse_count_badge("1").is_none());
        assert!(parse_count_badge("x").is_none());
    }
}
