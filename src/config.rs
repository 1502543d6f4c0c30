// Configuration resolver — merges stored preferences with defaults.
//
// All user preferences live in the Synced storage scope; every accessor
// falls back to a default when the key is absent or malformed, so a fresh
// profile works with zero setup. Key names are stable — the settings
// surface writes the same keys.

use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;

use crate::download::filename::{parse_template, FilenameToken};
use crate::storage::{KvStore, Scope};

pub const KEY_TWITTER_ENABLED: &str = "twitter_enabled";
pub const KEY_PIXIV_ENABLED: &str = "pixiv_enabled";
pub const KEY_NOTIFICATIONS_ENABLED: &str = "notifications_enabled";
pub const KEY_TWITTER_FILENAME_FORMAT: &str = "twitter_filename_format";
pub const KEY_PIXIV_FILENAME_FORMAT: &str = "pixiv_filename_format";
pub const KEY_PROXY_DOMAIN: &str = "proxy_domain";

/// Default host substituted into rebuilt original-image URLs.
pub const DEFAULT_PROXY_DOMAIN: &str = "i.pximg.net";

/// Per-platform activation switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Switches {
    pub twitter: bool,
    pub pixiv: bool,
}

impl Default for Switches {
    fn default() -> Self {
        Self {
            twitter: true,
            pixiv: true,
        }
    }
}

/// Parsed filename templates for both platforms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameFormats {
    pub twitter: Vec<FilenameToken>,
    pub pixiv: Vec<FilenameToken>,
}

impl Default for FilenameFormats {
    fn default() -> Self {
        Self {
            twitter: vec![FilenameToken::Account, FilenameToken::TweetId],
            pixiv: vec![FilenameToken::AuthorName, FilenameToken::IllustId],
        }
    }
}

/// Does a write to this key affect platform activation?
pub fn is_switch_key(key: &str) -> bool {
    key == KEY_TWITTER_ENABLED || key == KEY_PIXIV_ENABLED
}

#[derive(Clone)]
pub struct ConfigResolver {
    store: Arc<dyn KvStore>,
}

impl ConfigResolver {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    async fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        Ok(self
            .store
            .get(Scope::Synced, key)
            .await?
            .and_then(|v| v.as_bool())
            .unwrap_or(default))
    }

    async fn get_template(&self, key: &str) -> Result<Option<Vec<FilenameToken>>> {
        let Some(value) = self.store.get(Scope::Synced, key).await? else {
            return Ok(None);
        };
        let names: Vec<String> = match serde_json::from_value(value) {
            Ok(names) => names,
            Err(_) => return Ok(None),
        };
        Ok(Some(parse_template(&names)))
    }

    pub async fn switches(&self) -> Result<Switches> {
        let defaults = Switches::default();
        Ok(Switches {
            twitter: self.get_bool(KEY_TWITTER_ENABLED, defaults.twitter).await?,
            pixiv: self.get_bool(KEY_PIXIV_ENABLED, defaults.pixiv).await?,
        })
    }

    pub async fn notifications_enabled(&self) -> Result<bool> {
        self.get_bool(KEY_NOTIFICATIONS_ENABLED, true).await
    }

    pub async fn filename_formats(&self) -> Result<FilenameFormats> {
        let defaults = FilenameFormats::default();
        Ok(FilenameFormats {
            twitter: self
                .get_template(KEY_TWITTER_FILENAME_FORMAT)
                .await?
                .unwrap_or(defaults.twitter),
            pixiv: self
                .get_template(KEY_PIXIV_FILENAME_FORMAT)
                .await?
                .unwrap_or(defaults.pixiv),
        })
    }

    pub async fn proxy_domain(&self) -> Result<String> {
        Ok(self
            .store
            .get(Scope::Synced, KEY_PROXY_DOMAIN)
            .await?
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| DEFAULT_PROXY_DOMAIN.to_string()))
    }

    /// Raw write for the CLI `set` command and tests.
    pub async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.store.set(Scope::Synced, key, value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn resolver() -> ConfigResolver {
        ConfigResolver::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn empty_store_yields_defaults() {
        let config = resolver();
        assert_eq!(config.switches().await.unwrap(), Switches::default());
        assert!(config.notifications_enabled().await.unwrap());
        assert_eq!(config.proxy_domain().await.unwrap(), DEFAULT_PROXY_DOMAIN);
        assert_eq!(
            config.filename_formats().await.unwrap(),
            FilenameFormats::default()
        );
    }

    #[tokio::test]
    async fn stored_switch_overrides_default() {
        let config = resolver();
        config.set(KEY_TWITTER_ENABLED, json!(false)).await.unwrap();
        let switches = config.switches().await.unwrap();
        assert!(!switches.twitter);
        assert!(switches.pixiv);
    }

    #[tokio::test]
    async fn malformed_template_falls_back_to_default() {
        let config = resolver();
        config
            .set(KEY_PIXIV_FILENAME_FORMAT, json!("not-an-array"))
            .await
            .unwrap();
        assert_eq!(
            config.filename_formats().await.unwrap().pixiv,
            FilenameFormats::default().pixiv
        );
    }

    #[tokio::test]
    async fn stored_template_is_parsed() {
        let config = resolver();
        config
            .set(
                KEY_TWITTER_FILENAME_FORMAT,
                json!(["tweetId", "downloadDate"]),
            )
            .await
            .unwrap();
        assert_eq!(
            config.filename_formats().await.unwrap().twitter,
            vec![FilenameToken::TweetId, FilenameToken::DownloadDate]
        );
    }

    #[test]
    fn switch_keys_are_recognized() {
        assert!(is_switch_key(KEY_TWITTER_ENABLED));
        assert!(is_switch_key(KEY_PIXIV_ENABLED));
        assert!(!is_switch_key(KEY_PROXY_DOMAIN));
    }
}
