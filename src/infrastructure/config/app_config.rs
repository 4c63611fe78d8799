//! Application configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use super::args::CliArgs;
use crate::domain::entities::{DEFAULT_PUBLIC_DOMAINS, PublicDomains};
use crate::infrastructure::providers::Provider;

const APP_NAME: &str = "sender-avatars";
const APP_QUALIFIER: &str = "org";
const APP_ORGANIZATION: &str = "sender-avatars";

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    Info,
    /// Warning level.
    #[default]
    Warn,
    /// Error level.
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration file path.
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Log file path. Logs go to stderr when unset.
    #[serde(default)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Directory of the persistent avatar cache.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Directory of local contact photos (`<email>.<ext>`).
    #[serde(default)]
    pub contacts_dir: Option<PathBuf>,

    /// Public webmail domains, matched without TLD (`gmail`) or as top domain (`orange.fr`).
    #[serde(default = "default_public_domains")]
    pub public_domains: Vec<String>,

    /// Resolution chain configuration.
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Concurrency control configuration.
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
}

/// Resolution chain configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Favicon API used for company domains.
    #[serde(default)]
    pub default_provider: Provider,

    /// Skip cache reads. Results are still written.
    #[serde(default)]
    pub disable_cache: bool,

    /// Look up local contact photos first.
    #[serde(default = "default_true")]
    pub contacts_enabled: bool,

    /// Timeout of one attempt (URL resolution plus download), in seconds.
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,

    /// Transport-level HTTP timeout, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Days after which a cached "not found" is retried.
    #[serde(default = "default_not_found_ttl_days")]
    pub not_found_ttl_days: u64,

    /// Longer side of SVGs rasterized without explicit size.
    #[serde(default = "default_svg_size")]
    pub svg_size: u32,
}

impl ResolverConfig {
    /// Per-attempt timeout.
    #[must_use]
    pub const fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    /// HTTP request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Freshness interval of negative cache entries.
    #[must_use]
    pub const fn not_found_ttl(&self) -> Duration {
        Duration::from_secs(self.not_found_ttl_days.saturating_mul(24 * 60 * 60))
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            default_provider: Provider::default(),
            disable_cache: false,
            contacts_enabled: true,
            attempt_timeout_secs: default_attempt_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            not_found_ttl_days: default_not_found_ttl_days(),
            svg_size: default_svg_size(),
        }
    }
}

/// Concurrency control configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Maximum resolutions in flight at once.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// How long a repeat caller waits for an in-flight resolution, in milliseconds.
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,

    /// Return colored initials instead of "not found".
    #[serde(default = "default_true")]
    pub fallback_to_initials: bool,
}

impl ConcurrencyConfig {
    /// Wait timeout for repeat callers.
    #[must_use]
    pub const fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            wait_timeout_ms: default_wait_timeout_ms(),
            fallback_to_initials: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_public_domains() -> Vec<String> {
    DEFAULT_PUBLIC_DOMAINS.iter().map(ToString::to_string).collect()
}

fn default_attempt_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_not_found_ttl_days() -> u64 {
    30
}

fn default_svg_size() -> u32 {
    1000
}

fn default_max_in_flight() -> usize {
    100
}

fn default_wait_timeout_ms() -> u64 {
    5000
}

impl AppConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(config_path) = &args.config {
            self.config = Some(config_path.clone());
        }
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(cache_dir) = &args.cache_dir {
            self.cache_dir = Some(cache_dir.clone());
        }
        if let Some(contacts_dir) = &args.contacts_dir {
            self.contacts_dir = Some(contacts_dir.clone());
        }
        if let Some(provider) = args.provider {
            self.resolver.default_provider = provider;
        }
        if let Some(disable_cache) = args.disable_cache {
            self.resolver.disable_cache = disable_cache;
        }
        if let Some(max_in_flight) = args.max_in_flight {
            self.concurrency.max_in_flight = max_in_flight;
        }
        if let Some(wait_timeout_ms) = args.wait_timeout_ms {
            self.concurrency.wait_timeout_ms = wait_timeout_ms;
        }
        if let Some(fallback) = args.fallback_to_initials {
            self.concurrency.fallback_to_initials = fallback;
        }
    }

    /// Configured public domains.
    #[must_use]
    pub fn public_domains(&self) -> Arc<PublicDomains> {
        Arc::new(PublicDomains::new(&self.public_domains))
    }

    /// Returns default config directory.
    #[must_use]
    pub fn default_config_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Returns default cache directory.
    #[must_use]
    pub fn default_cache_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.cache_dir().join("avatars"))
    }

    /// Returns effective cache directory.
    #[must_use]
    pub fn effective_cache_dir(&self) -> Option<PathBuf> {
        self.cache_dir.clone().or_else(Self::default_cache_dir)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config: None,
            log_path: None,
            log_level: LogLevel::default(),
            cache_dir: None,
            contacts_dir: None,
            public_domains: default_public_domains(),
            resolver: ResolverConfig::default(),
            concurrency: ConcurrencyConfig::default(),
        }
    }
}
