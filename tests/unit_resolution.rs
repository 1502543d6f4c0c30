// Media-resolution behaviors through the public API: preview-URL
// rebuilding, template-driven filenames, manifest parsing, and GraphQL
// response navigation.

use chrono::NaiveDate;
use serde_json::json;

use magpie::download::filename::{generate, parse_template, FilenameParams, FilenameToken};
use magpie::download::MediaKind;
use magpie::net::hls;
use magpie::platforms::pixiv::resolver;
use magpie::platforms::twitter::api;
use magpie::platforms::ContentMetadata;

fn metadata() -> ContentMetadata {
    ContentMetadata {
        author_id: "77".to_string(),
        author_name: Some("Artist".to_string()),
        content_id: "118999".to_string(),
        timestamp: Some("20250304".to_string()),
    }
}

// ============================================================
// Chain: preview URL -> original URL -> series -> filename
// ============================================================

#[test]
fn preview_to_original_to_named_series() {
    let preview =
        "https://i.pximg.net/c/250x250_80_a2/img-master/img/2025/03/04/10/20/30/999_p0_square1200.jpg";

    // The container knew a better id than the (stale) one in the path.
    let original =
        resolver::build_original_image_url(preview, "proxy.example", Some("118999")).unwrap();
    assert_eq!(original.illust_id, "118999");
    assert!(!original.url.contains("999_p0_square1200"));

    let urls = resolver::series_urls(&original.url, 3);
    assert_eq!(
        urls,
        vec![
            "https://proxy.example/img-original/img/2025/03/04/10/20/30/118999_p0.png",
            "https://proxy.example/img-original/img/2025/03/04/10/20/30/118999_p1.png",
            "https://proxy.example/img-original/img/2025/03/04/10/20/30/118999_p2.png",
        ]
    );

    let tokens = parse_template(&["authorName".to_string(), "illustId".to_string()]);
    let name = generate(&FilenameParams {
        platform: "pixiv",
        tokens: &tokens,
        metadata: &metadata(),
        kind: MediaKind::Image,
        resolution: None,
        extension: "jpg",
        today: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
    });
    assert_eq!(name, "Artist_118999.jpg");
}

#[test]
fn embedded_id_is_used_only_when_no_better_id_exists() {
    let preview = "https://i.pximg.net/c/x/img-master/img/2024/12/31/23/59/59/555_p0_master.jpg";

    let with_preferred =
        resolver::build_original_image_url(preview, "h.example", Some("777")).unwrap();
    assert!(with_preferred.url.contains("/777_p0.png"));

    let without = resolver::build_original_image_url(preview, "h.example", None).unwrap();
    assert!(without.url.contains("/555_p0.png"));
}

// ============================================================
// Filename properties across token orders
// ============================================================

#[test]
fn all_token_orders_produce_clean_names() {
    let orders: Vec<Vec<FilenameToken>> = vec![
        vec![FilenameToken::Account],
        vec![FilenameToken::TweetId, FilenameToken::Account],
        vec![
            FilenameToken::DownloadDate,
            FilenameToken::AuthorName,
            FilenameToken::IllustId,
        ],
        vec![
            FilenameToken::Account,
            FilenameToken::TweetId,
            FilenameToken::TweetTime,
            FilenameToken::DownloadDate,
        ],
        vec![],
    ];

    for (kind, extension) in [(MediaKind::Image, "jpg"), (MediaKind::Video, "mp4")] {
        for tokens in &orders {
            let name = generate(&FilenameParams {
                platform: "twitter",
                tokens,
                metadata: &metadata(),
                kind,
                resolution: Some("640x360"),
                extension,
                today: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            });
            let suffix = format!(".{extension}");
            assert!(name.ends_with(&suffix), "{name} must end with {suffix}");
            let base = name.strip_suffix(&suffix).unwrap();
            assert!(!base.is_empty(), "base name must never be empty");
            assert!(!base.contains("__"), "{name} has a doubled separator");
            assert!(!base.ends_with('_'), "{name} has a trailing separator");
        }
    }
}

// ============================================================
// HLS: master -> variant -> init segment
// ============================================================

#[test]
fn hls_chain_reaches_a_playable_mp4() {
    let master = "\
#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=2176000,RESOLUTION=1280x720,CODECS=\"mp4a.40.2,avc1.640020\"
/amplify_video/42/pl/1280x720/v.m3u8
";
    let variant = hls::find_variant(master).unwrap();
    assert_eq!(variant.resolution, "1280x720");

    let playlist = "\
#EXTM3U
#EXT-X-MAP:URI=\"/amplify_video/42/vid/avc1/1280x720/init.mp4\"
#EXTINF:3.0,
/amplify_video/42/vid/avc1/1280x720/0.m4s
";
    let init = hls::find_init_segment(playlist).unwrap();
    assert_eq!(
        init,
        "https://video.twimg.com/amplify_video/42/vid/avc1/1280x720/init.mp4"
    );
}

// ============================================================
// GraphQL navigation picks the best variant
// ============================================================

#[test]
fn graphql_media_parse_prefers_highest_bitrate() {
    let body = json!({
        "data": { "tweetResult": { "result": { "legacy": {
            "id_str": "9",
            "extended_entities": { "media": [
                { "type": "photo" },
                { "type": "video", "video_info": { "variants": [
                    { "content_type": "application/x-mpegURL",
                      "url": "https://video.twimg.com/amplify_video/9/pl/m.m3u8" },
                    { "content_type": "video/mp4", "bitrate": 256000,
                      "url": "https://video.twimg.com/amplify_video/9/vid/320x180/lo.mp4" },
                    { "content_type": "video/mp4", "bitrate": 2176000,
                      "url": "https://video.twimg.com/amplify_video/9/vid/1280x720/hi.mp4" },
                ] } },
            ] }
        } } } }
    });

    let url = api::find_video_url(&body, "9", api::ParseShape::TweetResult).unwrap();
    assert!(url.ends_with("hi.mp4"));

    let captures = api::extract_video_captures(&body);
    assert_eq!(captures.len(), 1);
    assert_eq!(captures[0].tweet_id, "9");
    assert_eq!(captures[0].resolution, "1280x720");
}
