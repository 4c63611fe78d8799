//! Persistent key-value byte store port definition.

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::errors::AvatarError;

/// A value held by the byte store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredValue {
    /// Binary payload.
    Bytes(Bytes),
    /// UTF-8 text.
    Text(String),
}

impl StoredValue {
    /// Length of the value in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Bytes(bytes) => bytes.len(),
            Self::Text(text) => text.len(),
        }
    }

    /// Returns true if the value is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Kind of the value.
    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Bytes(_) => ValueKind::Bytes,
            Self::Text(_) => ValueKind::Text,
        }
    }
}

/// Kind of a stored value, reported by enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Binary payload.
    Bytes,
    /// UTF-8 text.
    Text,
}

/// One entry reported by [`ByteStorePort::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    /// Entry key.
    pub key: String,
    /// Value length in bytes.
    pub len: u64,
    /// Value kind.
    pub kind: ValueKind,
}

/// Port for the shared persistent byte store.
///
/// Keys are independent: there are no cross-key transactions and concurrent
/// writers of the same key are last-write-wins.
#[async_trait]
pub trait ByteStorePort: Send + Sync {
    /// Reads a value.
    async fn get(&self, key: &str) -> Result<Option<StoredValue>, AvatarError>;

    /// Writes a value, replacing any previous one.
    async fn set(&self, key: &str, value: StoredValue) -> Result<(), AvatarError>;

    /// Removes a value. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), AvatarError>;

    /// Enumerates all entries.
    async fn list(&self) -> Result<Vec<StoredEntry>, AvatarError>;
}
