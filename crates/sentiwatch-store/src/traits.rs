//! Storage trait definitions.

use crate::StoreResult;

/// Trait for durable key-value storage backends
pub trait KeyValueStore: Send + Sync {
    /// Store a value
    fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Retrieve a value
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Delete a value, returning whether it existed
    fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Check if a key exists
    fn has(&self, key: &str) -> StoreResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Remove and return a value in one operation.
    ///
    /// Backends that hold their map behind a single lock must override this
    /// so concurrent callers cannot both observe the value.
    fn take(&self, key: &str) -> StoreResult<Option<String>> {
        let value = self.get(key)?;
        if value.is_some() {
            self.delete(key)?;
        }
        Ok(value)
    }
}
