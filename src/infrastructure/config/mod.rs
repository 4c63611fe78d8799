//! Application configuration.

pub mod app_config;
pub mod args;
pub mod config_file;

pub use app_config::{AppConfig, ConcurrencyConfig, LogLevel, ResolverConfig};
pub use args::{CliArgs, Command};
pub use config_file::{ConfigError, ConfigFile};
