//! Persistent key/value store collaborator interface.
//!
//! Concrete drivers (relational, document, in-memory cache servers) live
//! outside the core; the framework only consumes this narrow trait. Keys use
//! exact slash-path naming (`bot/command_prefix`), derived from
//! [`ConfigKey::kv_name`](crate::config::ConfigKey::kv_name).
//!
//! The store may be accessed concurrently by multiple plugins. It provides no
//! cross-key locking — callers needing atomic multi-key writes must use the
//! backend's own transaction primitive.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::config::ConfigValue;
use crate::error::ConfigResult;

/// Callback invoked when a watched key changes. Receives the new value, or
/// `None` when the key was removed.
pub type KvWatchCallback = Arc<dyn Fn(Option<ConfigValue>) + Send + Sync>;

/// External KV store driver interface.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Fetches the value at `key`, if present.
    async fn get(&self, key: &str) -> ConfigResult<Option<ConfigValue>>;

    /// Writes `value` at `key`, creating or overwriting.
    async fn set(&self, key: &str, value: ConfigValue) -> ConfigResult<()>;

    /// Removes the value at `key`. Watchers observe `None`.
    async fn remove(&self, key: &str) -> ConfigResult<()>;

    /// Registers a change callback for `key`.
    fn watch(&self, key: &str, callback: KvWatchCallback);
}

// =============================================================================
// MemoryKv
// =============================================================================

/// In-memory [`KvStore`] used for tests and local runs without a persistent
/// backend. Watch callbacks fire synchronously from `set`/`remove`.
pub struct MemoryKv {
    entries: RwLock<HashMap<String, ConfigValue>>,
    watchers: RwLock<HashMap<String, Vec<KvWatchCallback>>>,
}

impl MemoryKv {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            watchers: RwLock::new(HashMap::new()),
        }
    }

    fn notify(&self, key: &str, value: Option<ConfigValue>) {
        let callbacks: Vec<KvWatchCallback> = self
            .watchers
            .read()
            .get(key)
            .map(|list| list.to_vec())
            .unwrap_or_default();
        for callback in callbacks {
            callback(value.clone());
        }
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> ConfigResult<Option<ConfigValue>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: ConfigValue) -> ConfigResult<()> {
        self.entries.write().insert(key.to_string(), value.clone());
        self.notify(key, Some(value));
        Ok(())
    }

    async fn remove(&self, key: &str) -> ConfigResult<()> {
        self.entries.write().remove(key);
        self.notify(key, None);
        Ok(())
    }

    fn watch(&self, key: &str, callback: KvWatchCallback) {
        self.watchers
            .write()
            .entry(key.to_string())
            .or_default()
            .push(callback);
    }
}
