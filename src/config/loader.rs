use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::types::Config;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },
}

impl Config {
    /// Returns the path to the configuration file.
    ///
    /// Uses `~/.config/glasgow-web/config.toml` on Unix/macOS,
    /// or equivalent on other platforms via `dirs::config_dir()`.
    /// Falls back to current directory if config_dir is unavailable.
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        config_dir.join("glasgow-web").join("config.toml")
    }

    /// Loads configuration from the default config file.
    ///
    /// A missing file yields `Config::default()`.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Config::default());
        }
        Self::load_from(&path)
    }

    /// Loads, parses and validates the config file at `path`.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// Checks:
    /// - home and mount directories are absolute, distinct and not `/`
    /// - `max_failures` is at least 1
    /// - bundle names are unique, command names unique across bundles
    pub fn validate(&self) -> Result<(), ConfigError> {
        let session = &self.session;
        for (label, dir) in [
            ("home_directory", &session.home_directory),
            ("mount_directory", &session.mount_directory),
        ] {
            if !dir.starts_with('/') || dir.trim_end_matches('/').is_empty() {
                return Err(invalid(format!(
                    "session.{} must be an absolute path below '/', got '{}'",
                    label, dir
                )));
            }
        }
        let home = session.home_directory.trim_end_matches('/');
        let mount = session.mount_directory.trim_end_matches('/');
        if home == mount
            || mount.starts_with(&format!("{}/", home))
            || home.starts_with(&format!("{}/", mount))
        {
            return Err(invalid(format!(
                "session.home_directory '{}' and session.mount_directory '{}' must not overlap",
                home, mount
            )));
        }

        if session.max_failures == 0 {
            return Err(invalid("session.max_failures must be at least 1".to_string()));
        }

        let mut bundles = HashSet::new();
        let mut commands = HashSet::new();
        for bundle in &self.bundles {
            if !bundles.insert(bundle.name.as_str()) {
                return Err(invalid(format!("Duplicate bundle '{}'", bundle.name)));
            }
            for command in &bundle.commands {
                if !commands.insert(command.name.as_str()) {
                    return Err(invalid(format!(
                        "Command '{}' is provided by more than one bundle",
                        command.name
                    )));
                }
            }
        }

        Ok(())
    }
}

fn invalid(message: String) -> ConfigError {
    ConfigError::ValidationError { message }
}
