//! In-memory data store.

use crate::{DataStore, StorageResult};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Process-local [`DataStore`]; contents are lost on exit.
#[derive(Default)]
pub struct MemoryDataStore {
    data: Mutex<HashMap<String, String>>,
}

impl MemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }
}

impl DataStore for MemoryDataStore {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.data.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.data.lock().get(key).cloned())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        Ok(self.data.lock().remove(key).is_some())
    }
}
