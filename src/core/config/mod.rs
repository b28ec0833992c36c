//! core::config
//!
//! Configuration schema and loading.
//!
//! # Overview
//!
//! relink has two configuration scopes:
//! - **Global**: User-level settings
//! - **Store**: Settings for one store file
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Global config file
//! 3. Store config file
//! 4. CLI flags (not handled here)
//!
//! # Global Config Locations
//!
//! Searched in order:
//! 1. `$RELINK_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/relink/config.toml`
//! 3. `~/.relink/config.toml`
//!
//! # Example
//!
//! ```no_run
//! use relink::core::config::Config;
//! use std::path::Path;
//!
//! let result = Config::load(Some(Path::new("/data/master.json"))).unwrap();
//! let config = result.config;
//!
//! println!("Site: {}", config.site());
//! println!("Async: {}", config.trigger_async());
//! ```

pub mod schema;

pub use schema::{GlobalConfig, LogConfig, StoreConfig, TriggerConfig};

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::core::types::FieldId;

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Result of loading configuration.
#[derive(Debug)]
pub struct ConfigLoadResult {
    /// The loaded configuration.
    pub config: Config,
}

/// Merged configuration from all sources.
///
/// Accessors apply precedence rules: store config overrides global config.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Global configuration
    pub global: GlobalConfig,
    /// Store configuration (if a store file was given and has one)
    pub store: Option<StoreConfig>,
    global_path: Option<PathBuf>,
    store_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// If `store_file` is provided, also loads `<store_file>.relink.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error if config files exist but cannot be parsed or
    /// fail validation. Missing files are not an error.
    pub fn load(store_file: Option<&Path>) -> Result<ConfigLoadResult, ConfigError> {
        let global_path = Self::find_global();
        let store_path = store_file.map(Self::store_config_path);
        Self::load_from(global_path.as_deref(), store_path.as_deref())
    }

    /// Load configuration from explicit file locations.
    ///
    /// Paths that do not exist are skipped.
    pub fn load_from(
        global_path: Option<&Path>,
        store_path: Option<&Path>,
    ) -> Result<ConfigLoadResult, ConfigError> {
        let (global, global_path) = match global_path.filter(|p| p.exists()) {
            Some(path) => (Self::read_toml::<GlobalConfig>(path)?, Some(path.to_path_buf())),
            None => (GlobalConfig::default(), None),
        };
        let (store, store_path) = match store_path.filter(|p| p.exists()) {
            Some(path) => (
                Some(Self::read_toml::<StoreConfig>(path)?),
                Some(path.to_path_buf()),
            ),
            None => (None, None),
        };

        global.validate()?;
        if let Some(ref s) = store {
            s.validate()?;
        }

        Ok(ConfigLoadResult {
            config: Config {
                global,
                store,
                global_path,
                store_path,
            },
        })
    }

    /// Locate the global config file, if any.
    fn find_global() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("RELINK_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("relink/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        dirs::home_dir()
            .map(|home| home.join(".relink/config.toml"))
            .filter(|path| path.exists())
    }

    /// Path of the config file that belongs to a store file.
    ///
    /// `master.json` maps to `master.json.relink.toml`.
    pub fn store_config_path(store_file: &Path) -> PathBuf {
        let mut name = store_file.as_os_str().to_os_string();
        name.push(".relink.toml");
        PathBuf::from(name)
    }

    fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    // =========================================================================
    // Accessor methods with precedence
    // =========================================================================

    fn trigger_value<T: Clone>(&self, pick: impl Fn(&TriggerConfig) -> Option<T>) -> Option<T> {
        self.store
            .as_ref()
            .and_then(|s| s.trigger.as_ref())
            .and_then(&pick)
            .or_else(|| self.global.trigger.as_ref().and_then(&pick))
    }

    /// Site (tenant) name that scheduled jobs run under.
    ///
    /// Defaults to "website".
    pub fn site(&self) -> &str {
        self.store
            .as_ref()
            .and_then(|s| s.site.as_deref())
            .or(self.global.site.as_deref())
            .unwrap_or("website")
    }

    /// Log level.
    ///
    /// Defaults to "info".
    pub fn log_level(&self) -> &str {
        self.global
            .log
            .as_ref()
            .and_then(|l| l.level.as_deref())
            .unwrap_or("info")
    }

    /// Whether the trigger schedules its job in the background.
    ///
    /// Defaults to `false`.
    pub fn trigger_async(&self) -> bool {
        self.trigger_value(|t| t.async_mode).unwrap_or(false)
    }

    /// Whether the trigger processes the whole subtree.
    ///
    /// Defaults to `true`.
    pub fn trigger_deep(&self) -> bool {
        self.trigger_value(|t| t.deep).unwrap_or(true)
    }

    /// Field filter for the trigger. Empty means all fields.
    pub fn trigger_fields(&self) -> Result<Vec<FieldId>, ConfigError> {
        self.trigger_value(|t| t.fields.clone())
            .unwrap_or_default()
            .iter()
            .map(|raw| FieldId::parse(raw).map_err(|e| ConfigError::InvalidValue(e.to_string())))
            .collect()
    }

    /// Get the path to the loaded global config file.
    pub fn global_config_loaded_from(&self) -> Option<&Path> {
        self.global_path.as_deref()
    }

    /// Get the path to the loaded store config file.
    pub fn store_config_loaded_from(&self) -> Option<&Path> {
        self.store_path.as_deref()
    }
}
