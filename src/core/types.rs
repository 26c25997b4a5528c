//! core::types
//!
//! Strong types for registry identifiers.
//!
//! # Types
//!
//! - [`CommandName`] - Kebab-normalized command name
//! - [`ParamName`] - Validated parameter identifier
//!
//! # Validation
//!
//! These types enforce validity at construction time. A descriptor table can
//! never hold a name that the CLI scaffolding or the argument mapping would
//! be unable to address.
//!
//! # Examples
//!
//! ```
//! use lectern::core::types::{CommandName, ParamName};
//!
//! let name = CommandName::new("deploy_service").unwrap();
//! assert_eq!(name.as_str(), "deploy-service");
//!
//! let param = ParamName::new("retry_count").unwrap();
//! assert_eq!(param.flag(), "retry-count");
//!
//! assert!(CommandName::new("").is_err());
//! assert!(ParamName::new("9lives").is_err());
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::naming::kebab_case;

/// Errors from name validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid command name: {0}")]
    InvalidCommandName(String),

    #[error("invalid parameter name: {0}")]
    InvalidParamName(String),
}

/// A command name, normalized to kebab case.
///
/// Underscores, spaces and camel-case boundaries become hyphens, so
/// `deploy_service`, `DeployService` and `deploy-service` all name the same
/// command.
///
/// # Example
///
/// ```
/// use lectern::core::types::CommandName;
///
/// let a = CommandName::new("Deploy_Service").unwrap();
/// let b = CommandName::new("deploy-service").unwrap();
/// assert_eq!(a, b);
///
/// assert!(CommandName::new("--").is_err());
/// assert!(CommandName::new("bad/name").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommandName(String);

impl CommandName {
    /// Create a normalized command name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidCommandName` if the normalized name is empty
    /// or contains characters other than ASCII alphanumerics and hyphens.
    pub fn new(name: impl AsRef<str>) -> Result<Self, TypeError> {
        let raw = name.as_ref();
        let normalized = kebab_case(raw);

        if normalized.is_empty() {
            return Err(TypeError::InvalidCommandName(format!(
                "'{}' normalizes to an empty name",
                raw
            )));
        }

        if let Some(bad) = normalized
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-'))
        {
            return Err(TypeError::InvalidCommandName(format!(
                "'{}' contains invalid character '{}'",
                raw, bad
            )));
        }

        Ok(Self(normalized))
    }

    /// Get the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CommandName {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CommandName> for String {
    fn from(name: CommandName) -> Self {
        name.0
    }
}

/// A parameter identifier.
///
/// Parameter names are kept as declared (they are the keys of the argument
/// mapping handed to callbacks). The command-line spelling is derived with
/// [`ParamName::flag`].
///
/// Rules:
/// - Cannot be empty
/// - Must start with an ASCII letter or `_`
/// - May contain only ASCII alphanumerics, `_` and `-`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ParamName(String);

impl ParamName {
    /// Create a validated parameter name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidParamName` if the name violates the rules above.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<(), TypeError> {
        let mut chars = name.chars();
        let first = chars.next().ok_or_else(|| {
            TypeError::InvalidParamName("parameter name cannot be empty".into())
        })?;

        if !(first.is_ascii_alphabetic() || first == '_') {
            return Err(TypeError::InvalidParamName(format!(
                "'{}' must start with a letter or '_'",
                name
            )));
        }

        if let Some(bad) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-')) {
            return Err(TypeError::InvalidParamName(format!(
                "'{}' contains invalid character '{}'",
                name, bad
            )));
        }

        Ok(())
    }

    /// Get the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The long-option spelling of this parameter, without the leading `--`.
    pub fn flag(&self) -> String {
        kebab_case(&self.0)
    }
}

impl fmt::Display for ParamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ParamName {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ParamName> for String {
    fn from(name: ParamName) -> Self {
        name.0
    }
}
