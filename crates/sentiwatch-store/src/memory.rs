//! In-memory key-value store.

use crate::{KeyValueStore, StoreError, StoreResult};
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory store. Used in tests and anywhere durability is not required.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut data = self.data.lock().map_err(|_| StoreError::Poisoned)?;
        data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let data = self.data.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(data.get(key).cloned())
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut data = self.data.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(data.remove(key).is_some())
    }

    fn take(&self, key: &str) -> StoreResult<Option<String>> {
        let mut data = self.data.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(data.remove(key))
    }
}
