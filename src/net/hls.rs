// HLS manifest parsing for the timed video listener.
//
// The video CDN serves a master playlist whose stream entries carry a
// RESOLUTION attribute followed by the variant URI on the next line, and
// variant playlists whose `#EXT-X-MAP` tag points at an initialization
// segment that is itself a playable mp4.

use regex_lite::Regex;

/// Host that relative playlist URIs resolve against.
pub const VIDEO_CDN_BASE: &str = "https://video.twimg.com";

/// A stream entry picked out of a master playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantRef {
    /// e.g. "1280x720"
    pub resolution: String,
    /// Absolute URL of the variant playlist.
    pub url: String,
}

/// Make a playlist URI absolute against the video CDN.
pub fn absolutize(uri: &str) -> String {
    if uri.starts_with("http") {
        uri.to_string()
    } else {
        format!("{VIDEO_CDN_BASE}{uri}")
    }
}

/// Find the first avc1 variant in a master playlist.
///
/// Matches the stream-info line carrying RESOLUTION and takes the URI on
/// the following line, skipping entries that are not avc1 renditions.
pub fn find_variant(master: &str) -> Option<VariantRef> {
    let resolution_re = Regex::new(r"RESOLUTION=(\d+x\d+)").ok()?;
    let lines: Vec<&str> = master.lines().collect();
    for (i, line) in lines.iter().enumerate() {
        let line = line.trim();
        if !line.contains("RESOLUTION") {
            continue;
        }
        let Some(captures) = resolution_re.captures(line) else {
            continue;
        };
        let next = lines.get(i + 1).map(|l| l.trim()).unwrap_or("");
        if next.is_empty() || !next.contains("avc1") {
            continue;
        }
        return Some(VariantRef {
            resolution: captures.get(1)?.as_str().to_string(),
            url: absolutize(next),
        });
    }
    None
}

/// Pull the initialization-segment URL out of a variant playlist.
pub fn find_init_segment(variant: &str) -> Option<String> {
    let uri_re = Regex::new(r#"URI="([^"]+)""#).ok()?;
    for line in variant.lines() {
        if !line.contains("#EXT-X-MAP") {
            continue;
        }
        if let Some(captures) = uri_re.captures(line) {
            return Some(absolutize(captures.get(1)?.as_str()));
        }
    }
    None
}
