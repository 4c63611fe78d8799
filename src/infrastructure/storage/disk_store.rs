//! Disk-backed byte store, one file per key.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncBufReadExt;
use tracing::{debug, trace, warn};

use crate::domain::errors::AvatarError;
use crate::domain::ports::{ByteStorePort, StoredEntry, StoredValue, ValueKind};

const BYTES_EXTENSION: &str = "bin";
const TEXT_EXTENSION: &str = "txt";
const HASHED_PREFIX: &str = "sha256-";
/// Longest hex-encoded key used verbatim as a file name stem.
const MAX_ENCODED_KEY_LEN: usize = 240;

/// Byte store persisting each key as a file named after the hex-encoded key.
///
/// Binary values use the `.bin` extension and text values `.txt`. Keys whose
/// encoding would not fit a file name are stored as `sha256-<digest>` files
/// that start with a `hex(key)\n` header. Writes go through a temporary file
/// that is renamed over the target.
pub struct DiskStore {
    dir: PathBuf,
}

/// Where a key lives on disk.
struct Slot {
    path: PathBuf,
    header: Option<Vec<u8>>,
}

enum FileName {
    Plain(String),
    Hashed,
}

impl DiskStore {
    /// Opens a store in the given directory, creating it if needed.
    ///
    /// # Errors
    /// Returns error if the directory cannot be created.
    pub async fn open(dir: PathBuf) -> Result<Self, AvatarError> {
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| AvatarError::storage(format!("Failed to create store dir: {e}")))?;
        debug!(dir = %dir.display(), "Opened disk store");
        Ok(Self { dir })
    }

    fn slot(&self, key: &str, kind: ValueKind) -> Slot {
        let extension = match kind {
            ValueKind::Bytes => BYTES_EXTENSION,
            ValueKind::Text => TEXT_EXTENSION,
        };
        let encoded = hex::encode(key);
        if encoded.len() <= MAX_ENCODED_KEY_LEN {
            return Slot {
                path: self.dir.join(format!("{encoded}.{extension}")),
                header: None,
            };
        }

        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        let mut header = encoded.into_bytes();
        header.push(b'\n');
        Slot {
            path: self.dir.join(format!("{HASHED_PREFIX}{digest}.{extension}")),
            header: Some(header),
        }
    }

    async fn read(&self, key: &str, kind: ValueKind) -> Result<Option<Bytes>, AvatarError> {
        let slot = self.slot(key, kind);
        let data = match fs::read(&slot.path).await {
            Ok(data) => Bytes::from(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AvatarError::storage(format!("Failed to read {key}: {e}"))),
        };

        match slot.header {
            None => Ok(Some(data)),
            Some(header) if data.starts_with(&header) => Ok(Some(data.slice(header.len()..))),
            Some(_) => Err(AvatarError::storage(format!(
                "Stored file {} does not belong to {key}",
                slot.path.display()
            ))),
        }
    }

    async fn remove_file(path: &Path) -> Result<(), AvatarError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AvatarError::storage(format!(
                "Failed to remove {}: {e}",
                path.display()
            ))),
        }
    }
}

fn write_atomic(dir: &Path, target: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut temp_file = tempfile::NamedTempFile::new_in(dir)?;
    temp_file.write_all(data)?;
    temp_file.persist(target).map_err(|e| e.error)?;
    Ok(())
}

fn parse_file_name(name: &str) -> Option<(FileName, ValueKind)> {
    let (stem, extension) = name.rsplit_once('.')?;
    let kind = match extension {
        BYTES_EXTENSION => ValueKind::Bytes,
        TEXT_EXTENSION => ValueKind::Text,
        _ => return None,
    };
    if stem.starts_with(HASHED_PREFIX) {
        return Some((FileName::Hashed, kind));
    }
    let key = String::from_utf8(hex::decode(stem).ok()?).ok()?;
    Some((FileName::Plain(key), kind))
}

/// Reads the key header of a hashed file, with the header length.
async fn read_header(path: &Path) -> std::io::Result<Option<(String, u64)>> {
    let file = fs::File::open(path).await?;
    let mut reader = tokio::io::BufReader::new(file);
    let mut line = Vec::new();
    reader.read_until(b'\n', &mut line).await?;

    let Some(encoded) = line.strip_suffix(b"\n") else {
        return Ok(None);
    };
    let key = hex::decode(encoded)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok());
    Ok(key.map(|key| (key, line.len() as u64)))
}

#[async_trait]
impl ByteStorePort for DiskStore {
    async fn get(&self, key: &str) -> Result<Option<StoredValue>, AvatarError> {
        if let Some(bytes) = self.read(key, ValueKind::Bytes).await? {
            trace!(key = %key, "Disk store hit");
            return Ok(Some(StoredValue::Bytes(bytes)));
        }

        match self.read(key, ValueKind::Text).await? {
            Some(bytes) => {
                trace!(key = %key, "Disk store hit");
                let text = String::from_utf8(bytes.to_vec())
                    .map_err(|e| AvatarError::storage(format!("Failed to read {key}: {e}")))?;
                Ok(Some(StoredValue::Text(text)))
            }
            None => {
                trace!(key = %key, "Disk store miss");
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: StoredValue) -> Result<(), AvatarError> {
        let kind = value.kind();
        let target = self.slot(key, kind);
        let stale = self.slot(
            key,
            match kind {
                ValueKind::Bytes => ValueKind::Text,
                ValueKind::Text => ValueKind::Bytes,
            },
        );
        let payload = match value {
            StoredValue::Bytes(bytes) => bytes,
            StoredValue::Text(text) => Bytes::from(text),
        };
        let size = payload.len();
        let mut data = target.header.unwrap_or_default();
        data.extend_from_slice(&payload);

        let dir = self.dir.clone();
        let path = target.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&dir, &path, &data))
            .await
            .map_err(|e| AvatarError::storage(format!("Write task failed: {e}")))?
            .map_err(|e| AvatarError::storage(format!("Failed to write {key}: {e}")))?;

        Self::remove_file(&stale.path).await?;

        trace!(key = %key, size, path = %target.path.display(), "Stored value on disk");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), AvatarError> {
        Self::remove_file(&self.slot(key, ValueKind::Bytes).path).await?;
        Self::remove_file(&self.slot(key, ValueKind::Text).path).await
    }

    async fn list(&self) -> Result<Vec<StoredEntry>, AvatarError> {
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| AvatarError::storage(format!("Failed to read store dir: {e}")))?;

        let mut listed = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AvatarError::storage(format!("Failed to read entry: {e}")))?
        {
            let name = entry.file_name();
            let Some((name, kind)) = name.to_str().and_then(parse_file_name) else {
                continue;
            };
            let len = match entry.metadata().await {
                Ok(meta) => meta.len(),
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Failed to stat store entry");
                    continue;
                }
            };

            let (key, len) = match name {
                FileName::Plain(key) => (key, len),
                FileName::Hashed => match read_header(&entry.path()).await {
                    Ok(Some((key, header_len))) => (key, len.saturating_sub(header_len)),
                    Ok(None) => {
                        warn!(path = %entry.path().display(), "Store entry without key header");
                        continue;
                    }
                    Err(e) => {
                        warn!(path = %entry.path().display(), error = %e, "Failed to read store entry");
                        continue;
                    }
                },
            };
            listed.push(StoredEntry { key, len, kind });
        }

        Ok(listed)
    }
}
