// Failure journal — an append-only ring buffer in the Local storage
// scope, newest first, capped at 100 entries. Written on every terminal
// failure so users can inspect what went wrong after the fact.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::storage::{KvStore, Scope};

/// Storage key for the journal.
pub const LOG_KEY: &str = "error_logs";

/// Oldest entries are evicted past this count.
pub const MAX_ENTRIES: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorLogEntry {
    /// RFC 3339, filled in at log time.
    pub timestamp: String,
    pub platform: String,
    /// What was being attempted, e.g. "downloadImage", "downloadVideo".
    pub action: String,
    pub url: String,
    pub error: String,
    pub retry_count: u32,
    pub success: bool,
}

pub struct ErrorLogger {
    store: Arc<dyn KvStore>,
}

impl ErrorLogger {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Record a terminal failure. Prepends, then trims to the cap.
    pub async fn log(
        &self,
        platform: &str,
        action: &str,
        url: &str,
        error: &str,
        retry_count: u32,
    ) -> Result<()> {
        warn!(platform, action, url, error, retry_count, "logging failure");
        let mut entries = self.recent().await?;
        entries.insert(
            0,
            ErrorLogEntry {
                timestamp: Utc::now().to_rfc3339(),
                platform: platform.to_string(),
                action: action.to_string(),
                url: url.to_string(),
                error: error.to_string(),
                retry_count,
                success: false,
            },
        );
        entries.truncate(MAX_ENTRIES);
        self.store
            .set(Scope::Local, LOG_KEY, serde_json::to_value(&entries)?)
            .await
    }

    /// All recorded entries, newest first. Unparseable or absent state
    /// reads as empty.
    pub async fn recent(&self) -> Result<Vec<ErrorLogEntry>> {
        let entries = match self.store.get(Scope::Local, LOG_KEY).await? {
            Some(value) => serde_json::from_value(value).unwrap_or_default(),
            None => Vec::new(),
        };
        Ok(entries)
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.set(Scope::Local, LOG_KEY, json!([])).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn logger() -> ErrorLogger {
        ErrorLogger::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn newest_entry_is_first() {
        let log = logger();
        log.log("twitter", "downloadImage", "https://a", "HTTP 500", 5)
            .await
            .unwrap();
        log.log("pixiv", "downloadImage", "https://b", "timeout", 5)
            .await
            .unwrap();

        let entries = log.recent().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].url, "https://b");
        assert_eq!(entries[1].url, "https://a");
    }

    #[tokio::test]
    async fn ring_caps_at_max_entries() {
        let log = logger();
        for i in 0..(MAX_ENTRIES + 10) {
            log.log("twitter", "downloadVideo", &format!("https://v/{i}"), "x", 0)
                .await
                .unwrap();
        }

        let entries = log.recent().await.unwrap();
        assert_eq!(entries.len(), MAX_ENTRIES);
        // Oldest were evicted: entry 0..9 gone, newest is the last logged.
        assert_eq!(entries[0].url, format!("https://v/{}", MAX_ENTRIES + 9));
        assert_eq!(entries[MAX_ENTRIES - 1].url, "https://v/10");
    }

    #[tokio::test]
    async fn clear_empties_the_journal() {
        let log = logger();
        log.log("pixiv", "downloadImage", "https://a", "x", 1)
            .await
            .unwrap();
        log.clear().await.unwrap();
        assert!(log.recent().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn entries_record_failure_shape() {
        let log = logger();
        log.log("twitter", "downloadVideo", "https://v", "exhausted", 5)
            .await
            .unwrap();
        let entry = &log.recent().await.unwrap()[0];
        assert_eq!(entry.platform, "twitter");
        assert_eq!(entry.action, "downloadVideo");
        assert_eq!(entry.retry_count, 5);
        assert!(!entry.success);
        assert!(!entry.timestamp.is_empty());
    }
}
