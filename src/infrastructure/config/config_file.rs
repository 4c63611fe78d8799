//! Locating and loading `config.toml`.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::app_config::AppConfig;

const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration file errors.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum ConfigError {
    #[error("no configuration directory on this platform")]
    NoConfigDir,
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to encode configuration: {0}")]
    Encode(#[from] toml::ser::Error),
}

/// The configuration file in effect, either given with `--config` or in the
/// platform config directory.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    /// Picks the explicit path if any, else `<config dir>/config.toml`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NoConfigDir` if no path is given and the platform
    /// has no config directory.
    pub fn locate(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Ok(Self::at(path)),
            None => AppConfig::default_config_dir()
                .map(|dir| Self::at(dir.join(CONFIG_FILE_NAME)))
                .ok_or(ConfigError::NoConfigDir),
        }
    }

    /// Uses the given path.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the configuration.
    ///
    /// On first run the file is created with the defaults. A file that does
    /// not parse is left untouched and the defaults are used.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or the defaults
    /// cannot be written.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = match fs::read_to_string(&self.path) {
            Ok(text) => toml::from_str::<AppConfig>(&text).unwrap_or_else(|e| {
                warn!(path = %self.path.display(), error = %e, "Ignoring malformed configuration");
                AppConfig::default()
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let config = AppConfig::default();
                self.write(&config)?;
                config
            }
            Err(source) => return Err(self.io_error(source)),
        };

        debug!(path = %self.path.display(), "Configuration loaded");
        config.config = Some(self.path.clone());
        Ok(config)
    }

    fn write(&self, config: &AppConfig) -> Result<(), ConfigError> {
        info!(path = %self.path.display(), "Writing default configuration");
        let text = toml::to_string_pretty(config)?;

        let dir = self
            .path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|e| self.io_error(e))?;

        let mut file = tempfile::NamedTempFile::new_in(dir).map_err(|e| self.io_error(e))?;
        file.write_all(text.as_bytes())
            .map_err(|e| self.io_error(e))?;
        file.persist(&self.path).map_err(|e| self.io_error(e.error))?;
        Ok(())
    }

    fn io_error(&self, source: std::io::Error) -> ConfigError {
        ConfigError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::providers::Provider;
    use tempfile::tempdir;

    #[test]
    fn test_first_run_writes_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let config = ConfigFile::at(&path).load().unwrap();

        assert_eq!(config.concurrency.max_in_flight, 100);
        assert_eq!(config.config.as_deref(), Some(path.as_path()));
        let written: AppConfig = toml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.resolver.default_provider, Provider::DuckDuckGo);
    }

    #[test]
    fn test_existing_file_is_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(
            &path,
            "[resolver]\ndefault_provider = \"splitbee\"\n\n[concurrency]\nwait_timeout_ms = 250\n",
        )
        .unwrap();

        let config = ConfigFile::at(&path).load().unwrap();

        assert_eq!(config.resolver.default_provider, Provider::Splitbee);
        assert_eq!(config.concurrency.wait_timeout_ms, 250);
        assert!(config.resolver.contacts_enabled);
    }

    #[test]
    fn test_malformed_file_is_left_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "invalid_toml = [").unwrap();

        let config = ConfigFile::at(&path).load().unwrap();

        assert_eq!(config.resolver.default_provider, Provider::DuckDuckGo);
        assert_eq!(fs::read_to_string(&path).unwrap(), "invalid_toml = [");
    }

    #[test]
    fn test_explicit_path_wins() {
        let dir = tempdir().unwrap();
        let custom = dir.path().join("custom.toml");

        let file = ConfigFile::locate(Some(custom.as_path())).unwrap();
        assert_eq!(file.path(), custom.as_path());

        file.load().unwrap();
        assert!(custom.exists());
    }

    #[test]
    fn test_unreadable_path_is_an_error() {
        let dir = tempdir().unwrap();

        let err = ConfigFile::at(dir.path()).load().unwrap_err();

        assert!(matches!(err, ConfigError::Io { ref path, .. } if path == dir.path()));
    }
}
