//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Global Config
//!
//! Located at (in order of precedence):
//! 1. `$RELINK_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/relink/config.toml`
//! 3. `~/.relink/config.toml`
//!
//! # Store Config
//!
//! Located beside the store file as `<store file>.relink.toml`.
//!
//! # Validation
//!
//! Config values are validated after parsing: log levels must be known and
//! field ids must parse.

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::types::FieldId;

/// Log levels accepted in `[log] level`.
pub const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Global configuration (user scope).
///
/// # Example
///
/// ```toml
/// site = "website"
///
/// [log]
/// level = "info"
///
/// [trigger]
/// async = false
/// deep = true
/// fields = ["{A60ACD61-A6DB-4182-8329-C957982CEC74}"]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GlobalConfig {
    /// Site (tenant) that scheduled jobs run under
    pub site: Option<String>,

    /// Logging settings
    pub log: Option<LogConfig>,

    /// Clone-trigger defaults
    pub trigger: Option<TriggerConfig>,
}

impl GlobalConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(log) = &self.log {
            log.validate()?;
        }
        if let Some(trigger) = &self.trigger {
            trigger.validate()?;
        }
        Ok(())
    }
}

/// Store-scoped configuration, overriding the global one.
///
/// # Example
///
/// ```toml
/// site = "intranet"
///
/// [trigger]
/// async = true
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Site (tenant) override
    pub site: Option<String>,

    /// Trigger overrides
    pub trigger: Option<TriggerConfig>,
}

impl StoreConfig {
    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(trigger) = &self.trigger {
            trigger.validate()?;
        }
        Ok(())
    }
}

/// Logging settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// One of [`LOG_LEVELS`]
    pub level: Option<String>,
}

impl LogConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(level) = &self.level {
            if !LOG_LEVELS.contains(&level.as_str()) {
                return Err(ConfigError::InvalidValue(format!(
                    "invalid log level '{}', must be one of: {}",
                    level,
                    LOG_LEVELS.join(", ")
                )));
            }
        }
        Ok(())
    }
}

/// How the clone trigger runs its replacement job.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TriggerConfig {
    /// Hand the walk to the background scheduler
    #[serde(rename = "async")]
    pub async_mode: Option<bool>,

    /// Process the whole cloned subtree, not only its root
    pub deep: Option<bool>,

    /// Field ids to restrict rewriting to (empty = all fields)
    pub fields: Option<Vec<String>>,
}

impl TriggerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(fields) = &self.fields {
            for field in fields {
                FieldId::parse(field).map_err(|e| {
                    ConfigError::InvalidValue(format!("trigger.fields: {e}"))
                })?;
            }
        }
        Ok(())
    }
}
