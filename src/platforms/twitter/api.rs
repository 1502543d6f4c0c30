// Twitter GraphQL video-detail queries and response parsing.
//
// The page never exposes a direct mp4 URL in markup, but its own GraphQL
// responses do. This module carries the two known query shapes (the
// endpoint schema drifts over time, so both are tried), the cookie/header
// plumbing to replay them, and the media-array parse shared by the active
// replay and the passive network capture.

use regex_lite::Regex;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use crate::net::{FetchError, HttpFetch};
use crate::page::Page;

/// Public web-client bearer token; sent with every GraphQL call.
pub const BEARER_TOKEN: &str = "Bearer AAAAAAAAAAAAAAAAAAAAANRILgAAAAAAnNwIzUejRCOuH5E6I8xnZz4puTs%3D1Zv7ttfk8LF81IUq16cHjhLTvJu4FA33AGWWjCpTnA";

/// Cookie holding the CSRF token the API requires.
const CSRF_COOKIE: &str = "ct0";

const GRAPHQL_BASE: &str = "https://x.com/i/api/graphql";

/// How a response body is navigated to reach the media array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseShape {
    /// `data.tweetResult.result` (TweetResultByRestId)
    TweetResult,
    /// `data.threaded_conversation_with_injections_v2` (TweetDetail)
    ConversationTimeline,
}

pub struct GraphqlQuery {
    pub query_id: &'static str,
    pub name: &'static str,
    pub variables: Value,
    pub features: Value,
    pub field_toggles: Option<Value>,
    pub shape: ParseShape,
}

/// The CSRF token from the page's own cookie jar.
pub fn csrf_token(page: &Page) -> Option<String> {
    page.cookie(CSRF_COOKIE).map(str::to_string)
}

/// Is this URL one of the video-detail GraphQL routes worth observing?
pub fn is_video_detail_route(url: &str) -> bool {
    url.contains("/graphql/") && (url.contains("/TweetDetail") || url.contains("/TweetResultByRestId"))
}

/// The two query shapes, tried in order.
pub fn query_shapes(tweet_id: &str) -> Vec<GraphqlQuery> {
    vec![
        GraphqlQuery {
            query_id: "0hWvDhmW8YQ-S_ib3azIrw",
            name: "TweetResultByRestId",
            variables: json!({
                "tweetId": tweet_id,
                "withCommunity": false,
                "includePromotedContent": false,
                "withVoice": false,
            }),
            features: json!({
                "creator_subscriptions_tweet_preview_api_enabled": false,
                "tweetypie_unmention_optimization_enabled": true,
                "responsive_web_edit_tweet_api_enabled": true,
                "graphql_is_translatable_rweb_tweet_is_translatable_enabled": false,
                "view_counts_everywhere_api_enabled": false,
                "longform_notetweets_consumption_enabled": true,
                "responsive_web_twitter_article_tweet_consumption_enabled": false,
                "tweet_awards_web_tipping_enabled": false,
                "freedom_of_speech_not_reach_fetch_enabled": true,
                "standardized_nudges_misinfo": false,
                "tweet_with_visibility_results_prefer_gql_limited_actions_policy_enabled": true,
                "longform_notetweets_rich_text_read_enabled": false,
                "longform_notetweets_inline_media_enabled": false,
                "responsive_web_graphql_exclude_directive_enabled": true,
                "verified_phone_label_enabled": false,
                "responsive_web_media_download_video_enabled": false,
                "responsive_web_graphql_skip_user_profile_image_extensions_enabled": false,
                "responsive_web_graphql_timeline_navigation_enabled": false,
                "responsive_web_enhance_cards_enabled": false,
            }),
            field_toggles: Some(json!({
                "withArticleRichContentState": false,
                "withAuxiliaryUserLabels": false,
            })),
            shape: ParseShape::TweetResult,
        },
        GraphqlQuery {
            query_id: "_8aYOgEDz35BrBcBal1-_w",
            name: "TweetDetail",
            variables: json!({
                "focalTweetId": tweet_id,
                "rankingMode": "Relevance",
                "includePromotedContent": false,
                "withCommunity": false,
                "withQuickPromoteEligibilityTweetFields": false,
                "withBirdwatchNotes": false,
                "withVoice": false,
            }),
            features: json!({
                "rweb_video_screen_enabled": false,
                "profile_label_improvements_pcf_label_in_post_enabled": true,
                "rweb_tipjar_consumption_enabled": true,
                "verified_phone_label_enabled": false,
                "creator_subscriptions_tweet_preview_api_enabled": true,
                "responsive_web_graphql_timeline_navigation_enabled": true,
                "responsive_web_graphql_skip_user_profile_image_extensions_enabled": false,
                "premium_content_api_read_enabled": false,
                "communities_web_enable_tweet_community_results_fetch": true,
                "c9s_tweet_anatomy_moderator_badge_enabled": true,
                "responsive_web_grok_analyze_button_fetch_trends_enabled": false,
                "responsive_web_grok_analyze_post_followups_enabled": true,
                "responsive_web_jetfuel_frame": false,
                "responsive_web_grok_share_attachment_enabled": true,
                "articles_preview_enabled": true,
                "responsive_web_edit_tweet_api_enabled": true,
                "graphql_is_translatable_rweb_tweet_is_translatable_enabled": true,
                "view_counts_everywhere_api_enabled": true,
                "longform_notetweets_consumption_enabled": true,
                "responsive_web_twitter_article_tweet_consumption_enabled": true,
                "tweet_awards_web_tipping_enabled": false,
                "responsive_web_grok_show_grok_translated_post": false,
                "responsive_web_grok_analysis_button_from_backend": false,
                "creator_subscriptions_quote_tweet_preview_enabled": false,
                "freedom_of_speech_not_reach_fetch_enabled": true,
                "standardized_nudges_misinfo": true,
                "tweet_with_visibility_results_prefer_gql_limited_actions_policy_enabled": true,
                "longform_notetweets_rich_text_read_enabled": true,
                "longform_notetweets_inline_media_enabled": true,
                "responsive_web_grok_image_annotation_enabled": true,
                "responsive_web_enhance_cards_enabled": false,
            }),
            field_toggles: Some(json!({
                "withArticleRichContentState": true,
                "withArticlePlainText": false,
                "withGrokAnalyze": false,
                "withDisallowedReplyControls": false,
            })),
            shape: ParseShape::ConversationTimeline,
        },
    ]
}

/// Build the GET URL for a query shape.
pub fn build_url(query: &GraphqlQuery) -> Result<String, FetchError> {
    let base = format!("{GRAPHQL_BASE}/{}/{}", query.query_id, query.name);
    let mut url = Url::parse(&base).map_err(|e| FetchError::Malformed(e.to_string()))?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("variables", &query.variables.to_string());
        pairs.append_pair("features", &query.features.to_string());
        if let Some(toggles) = &query.field_toggles {
            pairs.append_pair("fieldToggles", &toggles.to_string());
        }
    }
    Ok(url.into())
}

/// Headers every replayed call carries.
pub fn request_headers(csrf: &str) -> Vec<(String, String)> {
    vec![
        ("Content-Type".to_string(), "application/json".to_string()),
        ("Authorization".to_string(), BEARER_TOKEN.to_string()),
        ("x-twitter-active-user".to_string(), "yes".to_string()),
        ("x-csrf-token".to_string(), csrf.to_string()),
    ]
}

/// Highest-bitrate mp4 variant out of a media array. Animated GIFs are
/// served as videos and count too.
fn best_mp4(media: &Value) -> Option<&str> {
    let media = media.as_array()?;
    for item in media {
        let kind = item.get("type").and_then(Value::as_str).unwrap_or("");
        if kind != "video" && kind != "animated_gif" {
            continue;
        }
        let variants = item
            .get("video_info")
            .and_then(|info| info.get("variants"))
            .and_then(Value::as_array)?;
        let best = variants
            .iter()
            .filter(|v| v.get("content_type").and_then(Value::as_str) == Some("video/mp4"))
            .max_by_key(|v| v.get("bitrate").and_then(Value::as_u64).unwrap_or(0));
        if let Some(url) = best.and_then(|v| v.get("url")).and_then(Value::as_str) {
            return Some(url);
        }
    }
    None
}

fn legacy_media(result: &Value) -> Option<&Value> {
    let legacy = result
        .get("legacy")
        .or_else(|| result.get("tweet").and_then(|t| t.get("legacy")))?;
    legacy.get("extended_entities").and_then(|e| e.get("media"))
}

/// Walk a GraphQL response body to the media array for `tweet_id` and
/// pick the best mp4 URL.
pub fn find_video_url(data: &Value, tweet_id: &str, shape: ParseShape) -> Option<String> {
    match shape {
        ParseShape::TweetResult => {
            let result = data.get("data")?.get("tweetResult")?.get("result")?;
            best_mp4(legacy_media(result)?).map(str::to_string)
        }
        ParseShape::ConversationTimeline => {
            let instructions = data
                .get("data")?
                .get("threaded_conversation_with_injections_v2")?
                .get("instructions")?
                .as_array()?;
            let entries = instructions
                .iter()
                .find(|i| i.get("type").and_then(Value::as_str) == Some("TimelineAddEntries"))?
                .get("entries")?
                .as_array()?;
            let entry = entries.iter().find(|e| {
                e.get("entryId")
                    .and_then(Value::as_str)
                    .map(|id| id.contains(tweet_id))
                    .unwrap_or(false)
            })?;
            let results = entry
                .get("content")?
                .get("itemContent")?
                .get("tweet_results")?;
            let result = results.get("result")?;
            best_mp4(legacy_media(result)?).map(str::to_string)
        }
    }
}

/// One video the passive capture pulled out of an observed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoCapture {
    pub tweet_id: String,
    pub url: String,
    pub resolution: String,
}

fn capture_from_result(result: &Value) -> Option<VideoCapture> {
    let tweet_id = result
        .get("legacy")
        .and_then(|l| l.get("id_str"))
        .or_else(|| result.get("rest_id"))
        .and_then(Value::as_str)?
        .to_string();
    let url = best_mp4(legacy_media(result)?)?.to_string();
    let resolution = resolution_from_url(&url).unwrap_or_else(|| "unknown".to_string());
    Some(VideoCapture {
        tweet_id,
        url,
        resolution,
    })
}

/// Every video in an observed GraphQL response, whichever shape it is.
pub fn extract_video_captures(data: &Value) -> Vec<VideoCapture> {
    let mut captures = Vec::new();

    if let Some(result) = data
        .get("data")
        .and_then(|d| d.get("tweetResult"))
        .and_then(|t| t.get("result"))
    {
        captures.extend(capture_from_result(result));
    }

    if let Some(instructions) = data
        .get("data")
        .and_then(|d| d.get("threaded_conversation_with_injections_v2"))
        .and_then(|c| c.get("instructions"))
        .and_then(Value::as_array)
    {
        for instruction in instructions {
            if instruction.get("type").and_then(Value::as_str) != Some("TimelineAddEntries") {
                continue;
            }
            let Some(entries) = instruction.get("entries").and_then(Value::as_array) else {
                continue;
            };
            for entry in entries {
                let result = entry
                    .get("content")
                    .and_then(|c| c.get("itemContent"))
                    .and_then(|i| i.get("tweet_results"))
                    .and_then(|t| t.get("result"));
                if let Some(result) = result {
                    captures.extend(capture_from_result(result));
                }
            }
        }
    }

    captures
}

/// Resolution token embedded in a variant URL path (`.../1280x720/...`).
pub fn resolution_from_url(url: &str) -> Option<String> {
    let re = Regex::new(r"(\d+x\d+)/").ok()?;
    re.captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Replay the video-detail queries directly. Returns the first mp4 URL
/// either shape yields; per-shape failures are logged and swallowed so
/// the resolver can move to its next state.
pub async fn fetch_video_url(
    http: &dyn HttpFetch,
    page: &Page,
    tweet_id: &str,
) -> Option<String> {
    let csrf = csrf_token(page)?;
    let headers = request_headers(&csrf);

    for query in query_shapes(tweet_id) {
        let url = match build_url(&query) {
            Ok(url) => url,
            Err(err) => {
                debug!(query = query.name, error = %err, "bad query URL");
                continue;
            }
        };
        match http.get_json(&url, &headers).await {
            Ok(body) => {
                if let Some(video_url) = find_video_url(&body, tweet_id, query.shape) {
                    return Some(video_url);
                }
            }
            Err(err) => {
                debug!(query = query.name, error = %err, "query replay failed");
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tweet_result_body(tweet_id: &str) -> Value {
        json!({
            "data": { "tweetResult": { "result": {
                "rest_id": tweet_id,
                "legacy": {
                    "id_str": tweet_id,
                    "extended_entities": { "media": [{
                        "type": "video",
                        "video_info": { "variants": [
                            { "content_type": "application/x-mpegURL",
                              "url": "https://video.twimg.com/amplify_video/1/pl/master.m3u8" },
                            { "content_type": "video/mp4", "bitrate": 632000,
                              "url": "https://video.twimg.com/amplify_video/1/vid/480x270/lo.mp4" },
                            { "content_type": "video/mp4", "bitrate": 2176000,
                              "url": "https://video.twimg.com/amplify_video/1/vid/1280x720/hi.mp4" },
                        ] }
                    }] }
                }
            } } }
        })
    }

    fn timeline_body(tweet_id: &str) -> Value {
        json!({
            "data": { "threaded_conversation_with_injections_v2": { "instructions": [
                { "type": "TimelineClearCache" },
                { "type": "TimelineAddEntries", "entries": [
                    { "entryId": "promoted-tweet-999", "content": {} },
                    { "entryId": format!("tweet-{tweet_id}"), "content": { "itemContent": {
                        "tweet_results": { "result": {
                            "rest_id": tweet_id,
                            "legacy": {
                                "id_str": tweet_id,
                                "extended_entities": { "media": [{
                                    "type": "animated_gif",
                                    "video_info": { "variants": [
                                        { "content_type": "video/mp4", "bitrate": 832000,
                                          "url": "https://video.twimg.com/tweet_video/640x360/gif.mp4" },
                                    ] }
                                }] }
                            }
                        } }
                    } } },
                ] },
            ] } }
        })
    }

    #[test]
    fn tweet_result_shape_picks_highest_bitrate_mp4() {
        let url = find_video_url(&tweet_result_body("42"), "42", ParseShape::TweetResult).unwrap();
        assert!(url.ends_with("1280x720/hi.mp4"));
    }

    #[test]
    fn timeline_shape_finds_entry_by_tweet_id() {
        let url =
            find_video_url(&timeline_body("42"), "42", ParseShape::ConversationTimeline).unwrap();
        assert!(url.ends_with("gif.mp4"));
    }

    #[test]
    fn wrong_tweet_id_finds_nothing_in_timeline() {
        assert!(find_video_url(&timeline_body("42"), "777", ParseShape::ConversationTimeline)
            .is_none());
    }

    #[test]
    fn missing_media_yields_none() {
        let body = json!({ "data": { "tweetResult": { "result": { "legacy": {} } } } });
        assert!(find_video_url(&body, "42", ParseShape::TweetResult).is_none());
    }

    #[test]
    fn captures_extract_from_both_shapes() {
        let captures = extract_video_captures(&tweet_result_body("42"));
        assert_eq!(captures.len(), 1);
        assert_eq!(captures[0].tweet_id, "42");
        assert_eq!(captures[0].resolution, "1280x720");

        let captures = extract_video_captures(&timeline_body("43"));
        assert_eq!(captures.len(), 1);
        assert_eq!(captures[0].tweet_id, "43");
        assert_eq!(captures[0].resolution, "640x360");
    }

    #[test]
    fn resolution_parses_from_path_segment() {
        assert_eq!(
            resolution_from_url("https://video.twimg.com/amplify_video/1/vid/1280x720/hi.mp4")
                .as_deref(),
            Some("1280x720")
        );
        assert!(resolution_from_url("https://video.twimg.com/x.mp4").is_none());
    }

    #[test]
    fn video_detail_routes_are_recognized() {
        assert!(is_video_detail_route(
            "https://x.com/i/api/graphql/abc/TweetDetail?x=1"
        ));
        assert!(is_video_detail_route(
            "https://x.com/i/api/graphql/abc/TweetResultByRestId"
        ));
        assert!(!is_video_detail_route(
            "https://x.com/i/api/graphql/abc/UserByScreenName"
        ));
        assert!(!is_video_detail_route("https://x.com/TweetDetail"));
    }

    #[test]
    fn build_url_embeds_variables_and_features() {
        let query = &query_shapes("42")[0];
        let url = build_url(query).unwrap();
        assert!(url.starts_with(
            "https://x.com/i/api/graphql/0hWvDhmW8YQ-S_ib3azIrw/TweetResultByRestId?"
        ));
        assert!(url.contains("variables="));
        assert!(url.contains("features="));
        assert!(url.contains("fieldToggles="));
    }

    #[test]
    fn headers_carry_bearer_and_csrf() {
        let headers = request_headers("token123");
        assert!(headers
            .iter()
            .any(|(n, v)| n == "Authorization" && v.starts_with("Bearer ")));
        assert!(headers
            .iter()
            .any(|(n, v)| n == "x-csrf-token" && v == "token123"));
    }
}
