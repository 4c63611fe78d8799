//! Avatar resolution error types.

use thiserror::Error;

/// Avatar resolution error variants.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum AvatarError {
    #[error("network error: {message}")]
    Network { message: String },

    #[error("request timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("invalid content: {reason}")]
    InvalidContent { reason: String },

    #[error("corrupt cache entry {key}: {reason}")]
    CacheCorruption { key: String, reason: String },

    #[error("cached payload missing: {path}")]
    BlobMissing { path: String },

    #[error("storage error: {message}")]
    Storage { message: String },

    #[error("parse error: {message}")]
    Parse { message: String },

    #[error("unknown avatar provider: {name}")]
    UnknownProvider { name: String },
}

impl AvatarError {
    /// Creates network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates timeout error.
    #[must_use]
    pub fn timeout(after: std::time::Duration) -> Self {
        Self::Timeout {
            after_ms: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Creates invalid content error.
    #[must_use]
    pub fn invalid_content(reason: impl Into<String>) -> Self {
        Self::InvalidContent {
            reason: reason.into(),
        }
    }

    /// Creates cache corruption error.
    #[must_use]
    pub fn corruption(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CacheCorruption {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Creates missing blob error.
    #[must_use]
    pub fn blob_missing(path: impl Into<String>) -> Self {
        Self::BlobMissing { path: path.into() }
    }

    /// Creates storage error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates parse error.
    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Creates unknown provider error.
    #[must_use]
    pub fn unknown_provider(name: impl Into<String>) -> Self {
        Self::UnknownProvider { name: name.into() }
    }

    /// Returns whether error is network related.
    #[must_use]
    pub const fn is_network_error(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Timeout { .. })
    }

    /// Returns whether error means the cache entry should be dropped.
    #[must_use]
    pub const fn is_cache_damage(&self) -> bool {
        matches!(
            self,
            Self::CacheCorruption { .. } | Self::BlobMissing { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_timeout_reports_millis() {
        let err = AvatarError::timeout(Duration::from_secs(2));
        assert_eq!(err.to_string(), "request timed out after 2000ms");
        assert!(err.is_network_error());
    }

    #[test]
    fn test_classification() {
        assert!(AvatarError::network("boom").is_network_error());
        assert!(!AvatarError::invalid_content("html").is_network_error());
        assert!(AvatarError::blob_missing("FILE_x").is_cache_damage());
        assert!(AvatarError::corruption("ICON_x", "bad json").is_cache_damage());
        assert!(!AvatarError::storage("disk full").is_cache_damage());
    }
}
