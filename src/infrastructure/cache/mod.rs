//! Persistent avatar cache.

mod avatar_cache;

pub use avatar_cache::{
    AvatarCache, CacheLookup, CacheRecord, CacheSize, DEFAULT_NOT_FOUND_TTL, FILE_PREFIX,
    ICON_PREFIX, SETTINGS_PREFIX, format_bytes,
};
