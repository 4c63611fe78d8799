//! Persistent avatar cache on top of the byte store.
//!
//! Key namespace:
//! - `ICON_<key>`: JSON [`CacheRecord`] for a domain or email key
//! - `FILE_<path>`: raw image payload referenced by a record
//! - `SETTINGS_*`: reserved for host settings, never touched here

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::domain::entities::{AvatarImage, AvatarSource};
use crate::domain::errors::AvatarError;
use crate::domain::ports::{ByteStorePort, StoredValue, ValueKind};

/// Prefix of metadata records.
pub const ICON_PREFIX: &str = "ICON_";
/// Prefix of image payloads.
pub const FILE_PREFIX: &str = "FILE_";
/// Prefix reserved for settings.
pub const SETTINGS_PREFIX: &str = "SETTINGS_";

/// Default freshness interval of negative entries.
pub const DEFAULT_NOT_FOUND_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Metadata stored under `ICON_<key>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CacheRecord {
    /// An image stored under `FILE_<path>`.
    Icon {
        /// Payload path, without the `FILE_` prefix.
        path: String,
        /// MIME type of the payload.
        mime_type: String,
        /// When the payload was stored.
        #[serde(with = "chrono::serde::ts_milliseconds")]
        ts: DateTime<Utc>,
        /// Provider the payload came from.
        source: String,
    },
    /// No avatar exists for this key.
    NotFound {
        /// When the absence was recorded.
        #[serde(with = "chrono::serde::ts_milliseconds")]
        ts: DateTime<Utc>,
    },
}

/// Outcome of a cache read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// A stored image.
    Hit(AvatarImage),
    /// A fresh negative entry.
    NotFound,
    /// Nothing usable is stored.
    Miss,
}

/// Cache usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSize {
    /// Key lengths plus payload lengths, settings excluded.
    pub bytes: u64,
    /// Number of stored image payloads.
    pub icons_count: usize,
}

impl CacheSize {
    /// Size formatted for humans (`"1.5 KB"`, `"empty"`).
    #[must_use]
    pub fn human_readable(&self) -> String {
        format_bytes(self.bytes)
    }
}

/// Formats a byte count with binary units, at most two decimals.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    if bytes == 0 {
        return "empty".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let formatted = format!("{value:.2}");
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", UNITS[unit])
}

/// Avatar cache over a shared byte store.
pub struct AvatarCache {
    store: Arc<dyn ByteStorePort>,
    not_found_ttl: TimeDelta,
}

impl AvatarCache {
    /// Creates a cache whose negative entries expire after `not_found_ttl`.
    #[must_use]
    pub fn new(store: Arc<dyn ByteStorePort>, not_found_ttl: Duration) -> Self {
        Self {
            store,
            not_found_ttl: TimeDelta::from_std(not_found_ttl).unwrap_or(TimeDelta::MAX),
        }
    }

    /// Reads the payload stored at `FILE_<path>`.
    ///
    /// # Errors
    /// Returns `BlobMissing` if nothing is stored, `CacheCorruption` if the
    /// stored value is not a non-empty binary payload.
    pub async fn get_blob(
        &self,
        path: &str,
        mime_type: &str,
        source: AvatarSource,
    ) -> Result<AvatarImage, AvatarError> {
        let key = format!("{FILE_PREFIX}{path}");
        match self.store.get(&key).await? {
            Some(StoredValue::Bytes(bytes)) if !bytes.is_empty() => {
                Ok(AvatarImage::new(bytes, mime_type, source))
            }
            Some(_) => Err(AvatarError::corruption(key, "payload is not binary image data")),
            None => Err(AvatarError::blob_missing(key)),
        }
    }

    /// Writes a payload at `FILE_<path>`.
    ///
    /// # Errors
    /// Returns error if the store write fails.
    pub async fn save_blob(&self, path: &str, bytes: Bytes) -> Result<(), AvatarError> {
        self.store
            .set(&format!("{FILE_PREFIX}{path}"), StoredValue::Bytes(bytes))
            .await
    }

    /// Reads a JSON property.
    ///
    /// # Errors
    /// Returns `CacheCorruption` if the value cannot be decoded.
    pub async fn get_property<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AvatarError> {
        let decoded = match self.store.get(key).await? {
            None => return Ok(None),
            Some(StoredValue::Text(text)) => serde_json::from_str(&text),
            Some(StoredValue::Bytes(bytes)) => serde_json::from_slice(&bytes),
        };
        decoded
            .map(Some)
            .map_err(|e| AvatarError::corruption(key, e.to_string()))
    }

    /// Writes a JSON property.
    ///
    /// # Errors
    /// Returns error if the value cannot be encoded or stored.
    pub async fn set_property<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), AvatarError> {
        let json = serde_json::to_string(value).map_err(|e| AvatarError::parse(e.to_string()))?;
        self.store.set(key, StoredValue::Text(json)).await
    }

    /// Removes a property.
    ///
    /// # Errors
    /// Returns error if the store removal fails.
    pub async fn remove_property(&self, key: &str) -> Result<(), AvatarError> {
        self.store.remove(key).await
    }

    /// Looks up the avatar cached for a domain or email key.
    ///
    /// Records pointing at a missing or unreadable payload are deleted and
    /// reported as a miss. Negative entries older than the freshness interval
    /// are misses.
    pub async fn lookup(&self, key: &str) -> CacheLookup {
        let record_key = format!("{ICON_PREFIX}{key}");

        let record = match self.get_property::<CacheRecord>(&record_key).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                trace!(key = %key, "Avatar cache miss");
                return CacheLookup::Miss;
            }
            Err(e) => {
                self.discard(&record_key, &e).await;
                return CacheLookup::Miss;
            }
        };

        match record {
            CacheRecord::NotFound { ts } => {
                if Utc::now().signed_duration_since(ts) > self.not_found_ttl {
                    debug!(key = %key, recorded = %ts, "Negative cache entry expired");
                    CacheLookup::Miss
                } else {
                    trace!(key = %key, "Negative cache hit");
                    CacheLookup::NotFound
                }
            }
            CacheRecord::Icon {
                path,
                mime_type,
                source,
                ..
            } => {
                let source = AvatarSource::Cache { provider: source };
                match self.get_blob(&path, &mime_type, source).await {
                    Ok(image) => {
                        trace!(key = %key, size = image.len(), "Avatar cache hit");
                        CacheLookup::Hit(image)
                    }
                    Err(e) => {
                        self.discard(&record_key, &e).await;
                        CacheLookup::Miss
                    }
                }
            }
        }
    }

    async fn discard(&self, record_key: &str, error: &AvatarError) {
        if !error.is_cache_damage() {
            warn!(key = %record_key, error = %error, "Avatar cache read failed");
            return;
        }
        warn!(key = %record_key, error = %error, "Dropping damaged cache entry");
        if let Err(e) = self.remove_property(record_key).await {
            warn!(key = %record_key, error = %e, "Failed to drop damaged cache entry");
        }
    }

    /// Stores an image payload for `key` and points every key in `keys` at it.
    ///
    /// # Errors
    /// Returns error if a store write fails.
    pub async fn store_image(
        &self,
        key: &str,
        aliases: &[&str],
        image: &AvatarImage,
        provider: &str,
    ) -> Result<(), AvatarError> {
        let path = format!("{key}.img");
        self.save_blob(&path, image.bytes().clone()).await?;

        let record = CacheRecord::Icon {
            path,
            mime_type: image.mime_type().to_string(),
            ts: Utc::now(),
            source: provider.to_string(),
        };

        for target in std::iter::once(key).chain(aliases.iter().copied()) {
            if target.is_empty() {
                continue;
            }
            self.set_property(&format!("{ICON_PREFIX}{target}"), &record)
                .await?;
        }

        debug!(key = %key, aliases = ?aliases, provider = %provider, "Cached avatar");
        Ok(())
    }

    /// Records that no avatar exists for `key`.
    ///
    /// # Errors
    /// Returns error if the store write fails.
    pub async fn store_not_found(&self, key: &str) -> Result<(), AvatarError> {
        let record = CacheRecord::NotFound { ts: Utc::now() };
        self.set_property(&format!("{ICON_PREFIX}{key}"), &record)
            .await?;
        debug!(key = %key, "Cached negative result");
        Ok(())
    }

    /// Measures the cache, settings excluded.
    ///
    /// # Errors
    /// Returns error if the store cannot be enumerated.
    pub async fn size(&self) -> Result<CacheSize, AvatarError> {
        let entries = self.store.list().await?;

        Ok(entries
            .iter()
            .filter(|entry| !entry.key.starts_with(SETTINGS_PREFIX))
            .fold(CacheSize::default(), |mut size, entry| {
                size.bytes += entry.key.len() as u64 + entry.len;
                if entry.kind == ValueKind::Bytes {
                    size.icons_count += 1;
                }
                size
            }))
    }

    /// Removes all payloads and records, keeping settings.
    ///
    /// # Errors
    /// Returns error if the store cannot be enumerated or an entry cannot be removed.
    pub async fn clear(&self) -> Result<usize, AvatarError> {
        let entries = self.store.list().await?;
        let mut removed = 0;

        for entry in entries
            .iter()
            .filter(|entry| entry.key.starts_with(FILE_PREFIX) || entry.key.starts_with(ICON_PREFIX))
        {
            self.store.remove(&entry.key).await?;
            removed += 1;
        }

        debug!(removed, "Cleared avatar cache");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::mocks::FailingStore;
    use crate::infrastructure::storage::MemoryStore;
    use test_case::test_case;

    fn create_cache() -> (AvatarCache, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (AvatarCache::new(store.clone(), DEFAULT_NOT_FOUND_TTL), store)
    }

    fn png(bytes: &'static [u8]) -> AvatarImage {
        AvatarImage::new(bytes, "image/png", AvatarSource::Network {
            provider: "bimi".into(),
        })
    }

    #[test_case(0, "empty" ; "zero")]
    #[test_case(512, "512 B" ; "bytes")]
    #[test_case(1024, "1 KB" ; "exact_kilobyte")]
    #[test_case(1536, "1.5 KB" ; "fractional")]
    #[test_case(1_234_567, "1.18 MB" ; "megabytes")]
    #[test_case(5 * 1024 * 1024 * 1024, "5 GB" ; "gigabytes")]
    fn test_format_bytes(bytes: u64, expected: &str) {
        assert_eq!(format_bytes(bytes), expected);
    }

    #[test]
    fn test_record_json_shape() {
        let record = CacheRecord::Icon {
            path: "bigcorp.com.img".into(),
            mime_type: "image/svg+xml".into(),
            ts: DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
            source: "bimi".into(),
        };
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["type"], "icon");
        assert_eq!(json["mimeType"], "image/svg+xml");
        assert_eq!(json["ts"], 1_700_000_000_000_i64);

        let not_found = serde_json::to_value(CacheRecord::NotFound {
            ts: DateTime::from_timestamp_millis(0).unwrap(),
        })
        .unwrap();
        assert_eq!(not_found["type"], "notFound");
    }

    #[tokio::test]
    async fn test_store_and_lookup_image() {
        let (cache, _store) = create_cache();

        cache
            .store_image("bigcorp.com", &["jane@bigcorp.com"], &png(b"logo"), "bimi")
            .await
            .unwrap();

        for key in ["bigcorp.com", "jane@bigcorp.com"] {
            let CacheLookup::Hit(image) = cache.lookup(key).await else {
                panic!("expected hit for {key}");
            };
            assert_eq!(image.bytes().as_ref(), b"logo");
            assert_eq!(image.mime_type(), "image/png");
            assert_eq!(
                image.source(),
                &AvatarSource::Cache {
                    provider: "bimi".into()
                }
            );
        }
    }

    #[tokio::test]
    async fn test_lookup_miss() {
        let (cache, _store) = create_cache();
        assert_eq!(cache.lookup("nobody.com").await, CacheLookup::Miss);
    }

    #[tokio::test]
    async fn test_not_found_marker() {
        let (cache, _store) = create_cache();

        cache.store_not_found("foo@gmail.com").await.unwrap();

        assert_eq!(cache.lookup("foo@gmail.com").await, CacheLookup::NotFound);
    }

    #[tokio::test]
    async fn test_expired_not_found_is_miss() {
        let (cache, _store) = create_cache();
        let stale = CacheRecord::NotFound {
            ts: Utc::now() - TimeDelta::days(31),
        };
        cache.set_property("ICON_old.com", &stale).await.unwrap();

        assert_eq!(cache.lookup("old.com").await, CacheLookup::Miss);
    }

    #[tokio::test]
    async fn test_missing_payload_self_heals() {
        let (cache, store) = create_cache();
        cache
            .store_image("bigcorp.com", &[], &png(b"logo"), "bimi")
            .await
            .unwrap();
        store.remove("FILE_bigcorp.com.img").await.unwrap();

        assert_eq!(cache.lookup("bigcorp.com").await, CacheLookup::Miss);
        assert!(!store.contains("ICON_bigcorp.com"));
    }

    #[tokio::test]
    async fn test_undecodable_record_self_heals() {
        let (cache, store) = create_cache();
        store
            .set("ICON_broken.com", StoredValue::Text("{not json".into()))
            .await
            .unwrap();

        assert_eq!(cache.lookup("broken.com").await, CacheLookup::Miss);
        assert!(!store.contains("ICON_broken.com"));
    }

    #[tokio::test]
    async fn test_storage_failure_is_miss_and_keeps_entry() {
        let store = Arc::new(FailingStore::new());
        let cache = AvatarCache::new(store.clone(), DEFAULT_NOT_FOUND_TTL);
        cache.store_not_found("x.com").await.unwrap();

        store.set_failing(true);
        assert_eq!(cache.lookup("x.com").await, CacheLookup::Miss);

        store.set_failing(false);
        assert_eq!(cache.lookup("x.com").await, CacheLookup::NotFound);
    }

    #[tokio::test]
    async fn test_size_and_clear_keep_settings() {
        let (cache, store) = create_cache();
        store
            .set("SETTINGS_provider", StoredValue::Text("\"google\"".into()))
            .await
            .unwrap();
        cache
            .store_image("a.com", &[], &png(b"1234"), "google")
            .await
            .unwrap();

        let size = cache.size().await.unwrap();
        assert_eq!(size.icons_count, 1);
        let record_len = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .find(|entry| entry.key == "ICON_a.com")
            .unwrap()
            .len;
        let expected = "FILE_a.com.img".len() as u64 + 4 + "ICON_a.com".len() as u64 + record_len;
        assert_eq!(size.bytes, expected);

        assert_eq!(cache.clear().await.unwrap(), 2);
        assert_eq!(cache.size().await.unwrap(), CacheSize::default());
        assert!(store.contains("SETTINGS_provider"));
    }

    #[tokio::test]
    async fn test_property_round_trip() {
        let (cache, _store) = create_cache();
        cache.set_property("SETTINGS_size", &42_u32).await.unwrap();

        assert_eq!(cache.get_property::<u32>("SETTINGS_size").await.unwrap(), Some(42));
        cache.remove_property("SETTINGS_size").await.unwrap();
        assert_eq!(cache.get_property::<u32>("SETTINGS_size").await.unwrap(), None);
    }
}
