// Template-driven filename construction.
//
// A filename is the joined values of an ordered token list. Tokens the
// metadata cannot fill use "unknown"; a template that yields nothing falls
// back to `<platform>_<date>` so the base name is never empty. Video names
// carry a resolution suffix before the extension, image names don't.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::download::MediaKind;
use crate::platforms::ContentMetadata;

/// One position in a filename template. Serialized names match the
/// values the settings surface stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilenameToken {
    Account,
    TweetId,
    TweetTime,
    AuthorName,
    AuthorId,
    IllustId,
    DownloadDate,
}

impl FilenameToken {
    /// Parse a stored token name; unknown names are skipped by callers.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "account" => Some(Self::Account),
            "tweetId" => Some(Self::TweetId),
            "tweetTime" => Some(Self::TweetTime),
            "authorName" => Some(Self::AuthorName),
            "authorId" => Some(Self::AuthorId),
            "illustId" => Some(Self::IllustId),
            "downloadDate" => Some(Self::DownloadDate),
            _ => None,
        }
    }
}

/// Parse a stored template, dropping names that aren't tokens.
pub fn parse_template(names: &[String]) -> Vec<FilenameToken> {
    names
        .iter()
        .filter_map(|name| FilenameToken::parse(name))
        .collect()
}

/// Everything the generator needs for one file.
pub struct FilenameParams<'a> {
    pub platform: &'a str,
    pub tokens: &'a [FilenameToken],
    pub metadata: &'a ContentMetadata,
    pub kind: MediaKind,
    /// Decorates video names only.
    pub resolution: Option<&'a str>,
    /// Without the leading dot.
    pub extension: &'a str,
    /// The capture date, supplied by the caller so output is deterministic.
    pub today: NaiveDate,
}

/// Build a filename. Pure: same inputs, same output.
pub fn generate(params: &FilenameParams<'_>) -> String {
    let date_token = params.today.format("%Y%m%d").to_string();
    let meta = params.metadata;

    let mut parts: Vec<String> = Vec::new();
    for token in params.tokens {
        let value = match token {
            FilenameToken::Account | FilenameToken::AuthorId => meta.author_id.clone(),
            FilenameToken::TweetId | FilenameToken::IllustId => meta.content_id.clone(),
            FilenameToken::TweetTime => meta
                .timestamp
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            FilenameToken::AuthorName => meta
                .author_name
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            FilenameToken::DownloadDate => date_token.clone(),
        };
        parts.push(value);
    }

    let base = if parts.is_empty() {
        format!("{}_{}", params.platform, date_token)
    } else {
        parts.join("_")
    };

    match params.kind {
        MediaKind::Video => {
            let suffix = params
                .resolution
                .map(|r| format!("_{r}"))
                .unwrap_or_default();
            format!("{}{}.{}", base, suffix, params.extension)
        }
        MediaKind::Image => format!("{}.{}", base, params.extension),
    }
}
