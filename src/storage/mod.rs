// Key-value storage gateway — backend-agnostic async interface over two
// scopes: Synced holds user preferences, Local holds logs.
//
// Implementors: MemoryStore (tests, default wiring) and JsonFileStore
// (one JSON document per scope under the platform config directory).
// Writes to the Synced scope are announced on a change feed so the
// orchestrator can hot-reload platform activation without a restart.

pub mod file;

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

pub use file::JsonFileStore;

/// Which of the two storage areas a key lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// User preferences — switches, filename formats, notification toggle.
    Synced,
    /// Machine-local data — the error log.
    Local,
}

/// One announced write.
#[derive(Debug, Clone)]
pub struct StoreChange {
    pub scope: Scope,
    pub key: String,
}

/// Buffered change notices per subscriber.
pub(crate) const CHANGE_FEED_CAPACITY: usize = 32;

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a key. Absent keys are `Ok(None)`, not errors.
    async fn get(&self, scope: Scope, key: &str) -> Result<Option<Value>>;

    /// Write a key, announcing the change to subscribers.
    async fn set(&self, scope: Scope, key: &str, value: Value) -> Result<()>;

    /// Subscribe to write announcements.
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}

/// In-memory store. The default for tests and for wiring that doesn't
/// need persistence.
pub struct MemoryStore {
    synced: Mutex<HashMap<String, Value>>,
    local: Mutex<HashMap<String, Value>>,
    changes: broadcast::Sender<StoreChange>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            synced: Mutex::new(HashMap::new()),
            local: Mutex::new(HashMap::new()),
            changes,
        }
    }

    fn map(&self, scope: Scope) -> &Mutex<HashMap<String, Value>> {
        match scope {
            Scope::Synced => &self.synced,
            Scope::Local => &self.local,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, scope: Scope, key: &str) -> Result<Option<Value>> {
        let map = self.map(scope).lock().unwrap();
        Ok(map.get(key).cloned())
    }

    async fn set(&self, scope: Scope, key: &str, value: Value) -> Result<()> {
        {
            let mut map = self.map(scope).lock().unwrap();
            map.insert(key.to_string(), value);
        }
        let _ = self.changes.send(StoreChange {
            scope,
            key: key.to_string(),
        });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}
