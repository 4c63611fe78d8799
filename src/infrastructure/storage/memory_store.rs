//! In-memory byte store.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::errors::AvatarError;
use crate::domain::ports::{ByteStorePort, StoredEntry, StoredValue};

/// Volatile byte store, used when no cache directory is configured and in tests.
#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, StoredValue>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    /// Returns true if the key is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.read().contains_key(key)
    }
}

#[async_trait]
impl ByteStorePort for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<StoredValue>, AvatarError> {
        Ok(self.values.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: StoredValue) -> Result<(), AvatarError> {
        self.values.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), AvatarError> {
        self.values.write().remove(key);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<StoredEntry>, AvatarError> {
        Ok(self
            .values
            .read()
            .iter()
            .map(|(key, value)| StoredEntry {
                key: key.clone(),
                len: value.len() as u64,
                kind: value.kind(),
            })
            .collect())
    }
}
