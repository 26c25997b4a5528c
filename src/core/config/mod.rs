//! core::config
//!
//! Settings discovery and loading.
//!
//! # Precedence
//!
//! Values are resolved in this order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Settings file
//! 3. CLI flags and `RUST_LOG` (not handled here)
//!
//! # Settings File Locations
//!
//! Searched in order:
//! 1. An explicit path (from `--config`), which must exist
//! 2. `$LECTERN_CONFIG` if set
//! 3. `$XDG_CONFIG_HOME/lectern/config.toml`
//! 4. `~/.lectern/config.toml`
//!
//! # Example
//!
//! ```no_run
//! use lectern::core::config::Config;
//!
//! let config = Config::load(None).unwrap();
//! println!("delimiter: {}", config.list_delimiter());
//! println!("log filter: {}", config.log_filter());
//! ```

pub mod schema;

pub use schema::{CoercionSettings, LogSettings, OutputSettings, Settings};

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Environment variable naming an explicit settings file.
pub const CONFIG_ENV: &str = "LECTERN_CONFIG";

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

    #[error("config file '{0}' does not exist")]
    NotFound(PathBuf),

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Loaded settings with defaults applied by the accessors.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Parsed settings file contents
    pub settings: Settings,
    /// Path the settings were loaded from, if any
    path: Option<PathBuf>,
}

impl Config {
    /// Default delimiter for splitting a single container token.
    pub const DEFAULT_DELIMITER: char = ',';

    /// Default tracing filter.
    pub const DEFAULT_LOG_FILTER: &'static str = "warn";

    /// Load settings from `explicit`, or discover them from the process
    /// environment and home directory.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit path is missing, or if a settings file
    /// exists but cannot be read, parsed or validated. A missing discovered
    /// file is not an error (defaults are used).
    pub fn load(explicit: Option<&Path>) -> Result<Config, ConfigError> {
        match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound(path.to_path_buf()));
                }
                Self::load_from(path)
            }
            None => Self::discover(|key| std::env::var(key).ok(), dirs::home_dir()),
        }
    }

    /// Discover settings using the given environment lookup and home directory.
    pub fn discover<F>(env: F, home: Option<PathBuf>) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        for candidate in Self::candidates(&env, home) {
            if candidate.exists() {
                return Self::load_from(&candidate);
            }
        }
        Ok(Config::default())
    }

    fn candidates<F>(env: &F, home: Option<PathBuf>) -> Vec<PathBuf>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut paths = Vec::new();
        if let Some(path) = env(CONFIG_ENV) {
            paths.push(PathBuf::from(path));
        }
        if let Some(xdg) = env("XDG_CONFIG_HOME") {
            paths.push(PathBuf::from(xdg).join("lectern/config.toml"));
        }
        if let Some(home) = home {
            paths.push(home.join(".lectern/config.toml"));
        }
        paths
    }

    /// Read, parse and validate one settings file.
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let settings: Settings = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        settings.validate()?;

        Ok(Config {
            settings,
            path: Some(path.to_path_buf()),
        })
    }

    // =========================================================================
    // Accessor methods with defaults
    // =========================================================================

    /// Delimiter for splitting a single token into container elements.
    ///
    /// Defaults to `,` if not configured.
    pub fn list_delimiter(&self) -> char {
        self.settings
            .coercion
            .as_ref()
            .and_then(|c| c.list_delimiter.as_deref())
            .and_then(|d| d.chars().next())
            .unwrap_or(Self::DEFAULT_DELIMITER)
    }

    /// Default tracing filter directive.
    ///
    /// Defaults to `warn` if not configured.
    pub fn log_filter(&self) -> &str {
        self.settings
            .log
            .as_ref()
            .and_then(|l| l.filter.as_deref())
            .unwrap_or(Self::DEFAULT_LOG_FILTER)
    }

    /// Whether result output is suppressed by default.
    ///
    /// Defaults to `false` if not configured.
    pub fn quiet(&self) -> bool {
        self.settings
            .output
            .as_ref()
            .and_then(|o| o.quiet)
            .unwrap_or(false)
    }

    /// Path to the loaded settings file.
    pub fn loaded_from(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_found() {
        let temp = TempDir::new().unwrap();
        let config = Config::discover(env_of(&[]), Some(temp.path().to_path_buf())).unwrap();

        assert_eq!(config.list_delimiter(), ',');
        assert_eq!(config.log_filter(), "warn");
        assert!(!config.quiet());
        assert!(config.loaded_from().is_none());
    }

    #[test]
    fn env_var_takes_precedence() {
        let temp = TempDir::new().unwrap();
        let explicit = temp.path().join("explicit.toml");
        fs::write(&explicit, "[coercion]\nlist_delimiter = \";\"\n").unwrap();

        let home = temp.path().join("home");
        fs::create_dir_all(home.join(".lectern")).unwrap();
        fs::write(
            home.join(".lectern/config.toml"),
            "[coercion]\nlist_delimiter = \"|\"\n",
        )
        .unwrap();

        let env = env_of(&[(CONFIG_ENV, explicit.to_str().unwrap())]);
        let config = Config::discover(env, Some(home)).unwrap();

        assert_eq!(config.list_delimiter(), ';');
        assert_eq!(config.loaded_from(), Some(explicit.as_path()));
    }

    #[test]
    fn xdg_before_home() {
        let temp = TempDir::new().unwrap();
        let xdg = temp.path().join("xdg");
        fs::create_dir_all(xdg.join("lectern")).unwrap();
        fs::write(xdg.join("lectern/config.toml"), "[log]\nfilter = \"debug\"\n").unwrap();

        let home = temp.path().join("home");
        fs::create_dir_all(home.join(".lectern")).unwrap();
        fs::write(home.join(".lectern/config.toml"), "[log]\nfilter = \"info\"\n").unwrap();

        let env = env_of(&[("XDG_CONFIG_HOME", xdg.to_str().unwrap())]);
        let config = Config::discover(env, Some(home)).unwrap();

        assert_eq!(config.log_filter(), "debug");
    }

    #[test]
    fn home_fallback() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join(".lectern")).unwrap();
        fs::write(
            temp.path().join(".lectern/config.toml"),
            "[output]\nquiet = true\n",
        )
        .unwrap();

        let config = Config::discover(env_of(&[]), Some(temp.path().to_path_buf())).unwrap();
        assert!(config.quiet());
    }

    #[test]
    fn explicit_missing_is_error() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope.toml");
        assert!(matches!(
            Config::load(Some(&missing)),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn invalid_delimiter_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "[coercion]\nlist_delimiter = \"=\"\n").unwrap();

        assert!(matches!(
            Config::load(Some(&path)),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn unknown_fields_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "colour = true\n").unwrap();

        assert!(matches!(
            Config::load(Some(&path)),
            Err(ConfigError::ParseError { .. })
        ));
    }
}
