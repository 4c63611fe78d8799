//! Infrastructure layer with external service adapters.

/// Persistent avatar cache over a byte store.
pub mod cache;
/// Application configuration.
pub mod config;
/// Local contact photo adapters.
pub mod contacts;
/// HTTP transport.
pub mod http;
/// Content sniffing and PNG canonicalization.
pub mod image;
/// Avatar provider catalog.
pub mod providers;
/// Byte store adapters.
pub mod storage;

pub use cache::{AvatarCache, CacheLookup, CacheSize};
pub use config::{AppConfig, CliArgs, Command, ConfigFile, LogLevel};
pub use contacts::DirectoryContacts;
pub use http::HttpClient;
pub use image::{ImageNormalizer, TargetSize};
pub use providers::{Provider, ProviderScope};
pub use storage::{DiskStore, MemoryStore};
