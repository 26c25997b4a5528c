//! core::config::schema
//!
//! Settings file schema.
//!
//! # Location
//!
//! Searched in order (first match wins):
//! 1. `--config <path>` on the command line
//! 2. `$LECTERN_CONFIG` if set
//! 3. `$XDG_CONFIG_HOME/lectern/config.toml`
//! 4. `~/.lectern/config.toml`
//!
//! # Validation
//!
//! Values are validated after parsing, so a bad delimiter or log filter is
//! reported at startup instead of surfacing as odd coercion behavior later.

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Settings file contents.
///
/// # Example
///
/// ```toml
/// [coercion]
/// list_delimiter = ";"
///
/// [log]
/// filter = "lectern=debug"
///
/// [output]
/// quiet = false
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Token coercion settings
    pub coercion: Option<CoercionSettings>,

    /// Logging settings
    pub log: Option<LogSettings>,

    /// Output settings
    pub output: Option<OutputSettings>,
}

impl Settings {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(coercion) = &self.coercion {
            coercion.validate()?;
        }
        if let Some(log) = &self.log {
            log.validate()?;
        }
        Ok(())
    }
}

/// Coercion defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CoercionSettings {
    /// Delimiter used to split a single token for container types
    pub list_delimiter: Option<String>,
}

impl CoercionSettings {
    /// Characters that already carry meaning inside container tokens.
    pub const RESERVED: &'static [char] = &['='];

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(delim) = &self.list_delimiter {
            let mut chars = delim.chars();
            let (Some(c), None) = (chars.next(), chars.next()) else {
                return Err(ConfigError::InvalidValue(format!(
                    "list_delimiter must be a single character, got '{}'",
                    delim
                )));
            };
            if Self::RESERVED.contains(&c) || c.is_whitespace() {
                return Err(ConfigError::InvalidValue(format!(
                    "list_delimiter '{}' is reserved",
                    c
                )));
            }
        }
        Ok(())
    }
}

/// Logging defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LogSettings {
    /// Default tracing filter directive (overridden by `RUST_LOG`)
    pub filter: Option<String>,
}

impl LogSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(filter) = &self.filter {
            if filter.trim().is_empty() {
                return Err(ConfigError::InvalidValue(
                    "log filter cannot be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Output defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSettings {
    /// Suppress result output by default
    pub quiet: Option<bool>,
}
