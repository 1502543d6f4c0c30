// JSON-file-backed store — one document per scope, loaded on open and
// rewritten on every set. Settings volumes are tiny (a handful of keys,
// a 100-entry log), so whole-file rewrites are the simple correct choice.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use super::{KvStore, Scope, StoreChange, CHANGE_FEED_CAPACITY};

/// Default directory for the two scope files.
/// `~/.config/magpie/` on Linux.
pub fn default_store_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("magpie")
}

pub struct JsonFileStore {
    dir: PathBuf,
    synced: Mutex<HashMap<String, Value>>,
    local: Mutex<HashMap<String, Value>>,
    changes: broadcast::Sender<StoreChange>,
}

impl JsonFileStore {
    /// Open (or create) the store under `dir`.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create store directory: {}", dir.display()))?;
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Ok(Self {
            dir: dir.to_path_buf(),
            synced: Mutex::new(load_scope(&dir.join("synced.json"))?),
            local: Mutex::new(load_scope(&dir.join("local.json"))?),
            changes,
        })
    }

    fn scope_path(&self, scope: Scope) -> PathBuf {
        match scope {
            Scope::Synced => self.dir.join("synced.json"),
            Scope::Local => self.dir.join("local.json"),
        }
    }

    fn map(&self, scope: Scope) -> &Mutex<HashMap<String, Value>> {
        match scope {
            Scope::Synced => &self.synced,
            Scope::Local => &self.local,
        }
    }
}

fn load_scope(path: &Path) -> Result<HashMap<String, Value>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

#[async_trait]
impl KvStore for JsonFileStore {
    async fn get(&self, scope: Scope, key: &str) -> Result<Option<Value>> {
        let map = self.map(scope).lock().unwrap();
        Ok(map.get(key).cloned())
    }

    async fn set(&self, scope: Scope, key: &str, value: Value) -> Result<()> {
        let serialized = {
            let mut map = self.map(scope).lock().unwrap();
            map.insert(key.to_string(), value);
            serde_json::to_string_pretty(&*map).context("Failed to serialize store scope")?
        };
        let path = self.scope_path(scope);
        std::fs::write(&path, serialized)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        debug!(key, path = %path.display(), "store key written");

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
