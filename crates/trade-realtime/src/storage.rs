//! Client-side key-value storage for persisted credentials.
//!
//! The connection manager never reads storage itself; the host reads the
//! token once at startup and passes it in.

use crate::{RealtimeError, RealtimeResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

/// Storage keys used by the client.
pub struct StorageKeys;

impl StorageKeys {
    /// Realtime authentication token.
    pub const AUTH_TOKEN: &'static str = "authToken";
}

/// Trait for key-value storage backends.
pub trait KeyValueStore: Send + Sync {
    /// Store a value.
    fn set(&self, key: &str, value: &str) -> RealtimeResult<()>;

    /// Retrieve a value.
    fn get(&self, key: &str) -> RealtimeResult<Option<String>>;

    /// Delete a value. Returns whether it existed.
    fn delete(&self, key: &str) -> RealtimeResult<bool>;

    /// Check if a key exists.
    fn has(&self, key: &str) -> RealtimeResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// Read the stored authentication token, ignoring blank values.
pub fn load_auth_token(store: &dyn KeyValueStore) -> RealtimeResult<Option<String>> {
    Ok(store
        .get(StorageKeys::AUTH_TOKEN)?
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty()))
}

/// Store backed by a JSON object on disk.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    fn read_all(&self) -> RealtimeResult<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content)
            .map_err(|e| RealtimeError::Storage(format!("{}: {e}", self.path.display())))
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> RealtimeResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(entries)?)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn set(&self, key: &str, value: &str) -> RealtimeResult<()> {
        let _guard = self.lock.lock();
        debug!(key = %key, "Setting stored value");
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries)
    }

    fn get(&self, key: &str) -> RealtimeResult<Option<String>> {
        let _guard = self.lock.lock();
        Ok(self.read_all()?.remove(key))
    }

    fn delete(&self, key: &str) -> RealtimeResult<bool> {
        let _guard = self.lock.lock();
        let mut entries = self.read_all()?;
        let existed = entries.remove(key).is_some();
        if existed {
            self.write_all(&entries)?;
        }
        Ok(existed)
    }
}

/// In-memory store.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn set(&self, key: &str, value: &str) -> RealtimeResult<()> {
        self.data.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> RealtimeResult<Option<String>> {
        Ok(self.data.lock().get(key).cloned())
    }

    fn delete(&self, key: &str) -> RealtimeResult<bool> {
        Ok(self.data.lock().remove(key).is_some())
    }
}
