//! Storage trait definitions.

use crate::StorageResult;
use std::collections::BTreeMap;

/// Trait for key-value persistence backends.
pub trait DataStore: Send + Sync {
    /// Store a string value.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Retrieve a string value.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Delete a value. Returns whether anything was removed.
    fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Check if a key exists.
    fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Store a string map as a JSON object.
    fn set_map(&self, key: &str, map: &BTreeMap<String, String>) -> StorageResult<()> {
        let json = serde_json::to_string(map)?;
        self.set(key, &json)
    }

    /// Retrieve a string map stored with [`DataStore::set_map`].
    fn get_map(&self, key: &str) -> StorageResult<Option<BTreeMap<String, String>>> {
        match self.get(key)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}
