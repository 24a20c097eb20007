//! File-backed key-value store.

use crate::{KeyValueStore, StoreError, StoreResult};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Durable key-value store persisted as a single JSON file.
///
/// The full map is held in memory behind one mutex and rewritten to disk on
/// every mutation, so reads are synchronous and always observe the latest
/// write. Writes go to a temp file first and are renamed into place so a
/// crash mid-write never leaves a truncated store behind.
pub struct FileStore {
    path: PathBuf,
    data: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Open (or create) a store at the given path.
    pub fn open(path: PathBuf) -> StoreResult<Self> {
        let data = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)
                .map_err(|e| StoreError::Encoding(format!("corrupt store file: {}", e)))?
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    fn persist(&self, data: &HashMap<String, String>) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(data)
            .map_err(|e| StoreError::Encoding(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut data = self.data.lock().map_err(|_| StoreError::Poisoned)?;
        data.insert(key.to_string(), value.to_string());
        self.persist(&data)
    }

    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let data = self.data.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(data.get(key).cloned())
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut data = self.data.lock().map_err(|_| StoreError::Poisoned)?;
        let existed = data.remove(key).is_some();
        if existed {
            self.persist(&data)?;
        }
        Ok(existed)
    }

    fn take(&self, key: &str) -> StoreResult<Option<String>> {
        let mut data = self.data.lock().map_err(|_| StoreError::Poisoned)?;
        let value = data.remove(key);
        if value.is_some() {
            self.persist(&data)?;
        }
        Ok(value)
    }
}
