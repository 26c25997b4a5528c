//! engine::params
//!
//! Parameter descriptors and the precedence resolver.
//!
//! # Precedence
//!
//! For one parameter, the winning raw value is picked in this order:
//!
//! ```text
//! supplied token -> environment variable -> default -> (flag: false) -> missing
//! ```
//!
//! A required parameter that reaches the end of the chain fails with
//! [`ResolveError::MissingRequiredValue`]. An optional one resolves to
//! [`RawValue::Missing`], which coercion turns into the empty value of its
//! declared type.
//!
//! # Invariants
//!
//! - A required parameter never carries a default (checked at registration)
//! - A variadic parameter has a container type (checked at registration)
//! - Resolution is a pure function of descriptor, token and environment
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//! use lectern::core::typespec::TypeSpec;
//! use lectern::engine::params::{resolve, ParameterDescriptor, RawValue};
//!
//! let desc = ParameterDescriptor::option("retries", TypeSpec::Integer)
//!     .default("3")
//!     .env_var("RETRIES");
//!
//! let mut env = HashMap::new();
//! env.insert("RETRIES".to_string(), "7".to_string());
//!
//! let resolved = resolve(&desc, None, &env).unwrap();
//! assert_eq!(resolved.raw, RawValue::Single("7".into()));
//!
//! let supplied = RawValue::Single("9".into());
//! let resolved = resolve(&desc, Some(&supplied), &env).unwrap();
//! assert_eq!(resolved.raw, RawValue::Single("9".into()));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::trace;

use crate::core::naming::kebab_case;
use crate::core::types::{ParamName, TypeError};
use crate::core::typespec::TypeSpec;

/// Errors from precedence resolution.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("missing required value for parameter '{parameter}'")]
    MissingRequiredValue { parameter: String },
}

/// An unconverted value picked by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RawValue {
    /// Nothing was supplied and no fallback applied.
    #[default]
    Missing,
    /// A boolean flag was given (or defaulted).
    Flag(bool),
    /// One token, possibly delimited for container types.
    Single(String),
    /// Several tokens, one per element.
    Many(Vec<String>),
}

impl RawValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, RawValue::Missing)
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Single(s.to_string())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        RawValue::Single(s)
    }
}

impl From<bool> for RawValue {
    fn from(b: bool) -> Self {
        RawValue::Flag(b)
    }
}

impl From<Vec<String>> for RawValue {
    fn from(tokens: Vec<String>) -> Self {
        RawValue::Many(tokens)
    }
}

impl From<Vec<&str>> for RawValue {
    fn from(tokens: Vec<&str>) -> Self {
        RawValue::Many(tokens.into_iter().map(String::from).collect())
    }
}

/// Where a parameter's value comes from on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// `--name value`
    NamedOption,
    /// Bare token, consumed in declaration order.
    PositionalArgument,
    /// Only from the environment (or default).
    EnvironmentVar,
    /// `--name '{"json": ...}'`, decoded by the encoder registry.
    StructuredPayload,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceKind::NamedOption => "option",
            SourceKind::PositionalArgument => "argument",
            SourceKind::EnvironmentVar => "env",
            SourceKind::StructuredPayload => "payload",
        };
        f.write_str(s)
    }
}

/// Factory for defaults computed at resolution time.
pub type DefaultFactory = Arc<dyn Fn() -> RawValue + Send + Sync>;

/// A parameter's fallback value.
#[derive(Clone)]
pub enum DefaultValue {
    Raw(RawValue),
    /// Evaluated each time the default is needed.
    Factory(DefaultFactory),
}

impl DefaultValue {
    pub fn produce(&self) -> RawValue {
        match self {
            DefaultValue::Raw(raw) => raw.clone(),
            DefaultValue::Factory(factory) => factory(),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Raw(raw) => f.debug_tuple("Raw").field(raw).finish(),
            DefaultValue::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

/// Static description of one command parameter.
///
/// Built with the source-kind constructors and chained modifiers:
///
/// ```
/// use lectern::core::typespec::TypeSpec;
/// use lectern::engine::params::{ParameterDescriptor, SourceKind};
///
/// let name = ParameterDescriptor::argument("name", TypeSpec::Text).required();
/// let verbose = ParameterDescriptor::option("verbose", TypeSpec::Bool);
/// let files = ParameterDescriptor::argument("files", TypeSpec::list(TypeSpec::Path)).variadic();
///
/// assert!(name.required);
/// assert_eq!(verbose.source, SourceKind::NamedOption);
/// assert!(files.variadic);
/// ```
///
/// Names are validated when the owning command is registered.
#[derive(Debug, Clone)]
pub struct ParameterDescriptor {
    pub name: String,
    pub ty: TypeSpec,
    pub source: SourceKind,
    pub required: bool,
    pub default: Option<DefaultValue>,
    pub env_var: Option<String>,
    pub silent: bool,
    pub variadic: bool,
    pub help: Option<String>,
}

impl ParameterDescriptor {
    fn with_source(name: &str, ty: TypeSpec, source: SourceKind) -> Self {
        Self {
            name: name.to_string(),
            ty,
            source,
            required: false,
            default: None,
            env_var: None,
            silent: false,
            variadic: false,
            help: None,
        }
    }

    /// A named option (`--name value`, or `--name` for flags).
    pub fn option(name: &str, ty: TypeSpec) -> Self {
        Self::with_source(name, ty, SourceKind::NamedOption)
    }

    /// A positional argument.
    pub fn argument(name: &str, ty: TypeSpec) -> Self {
        Self::with_source(name, ty, SourceKind::PositionalArgument)
    }

    /// A parameter read only from environment variable `var`.
    pub fn env(name: &str, ty: TypeSpec, var: &str) -> Self {
        Self::with_source(name, ty, SourceKind::EnvironmentVar).env_var(var)
    }

    /// A structured payload option.
    pub fn payload(name: &str, ty: TypeSpec) -> Self {
        Self::with_source(name, ty, SourceKind::StructuredPayload)
    }

    /// A parameter injected from the state registry.
    pub fn state<T: 'static>(name: &str) -> Self {
        Self::with_source(name, TypeSpec::state::<T>(), SourceKind::NamedOption)
    }

    /// A parameter receiving the invocation context.
    pub fn context(name: &str) -> Self {
        Self::with_source(name, TypeSpec::Context, SourceKind::NamedOption)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set a raw default. Clears `required`.
    pub fn default(mut self, raw: impl Into<RawValue>) -> Self {
        self.default = Some(DefaultValue::Raw(raw.into()));
        self.required = false;
        self
    }

    /// Set a default computed when needed. Clears `required`.
    pub fn default_with<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> RawValue + Send + Sync + 'static,
    {
        self.default = Some(DefaultValue::Factory(Arc::new(factory)));
        self.required = false;
        self
    }

    pub fn env_var(mut self, var: &str) -> Self {
        self.env_var = Some(var.to_string());
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    pub fn help(mut self, text: &str) -> Self {
        self.help = Some(text.to_string());
        self
    }

    /// Validated form of the parameter name.
    pub fn param_name(&self) -> Result<ParamName, TypeError> {
        ParamName::new(self.name.as_str())
    }

    /// Long-option spelling, without the leading `--`.
    pub fn flag(&self) -> String {
        kebab_case(&self.name)
    }

    /// Whether this parameter behaves as a flag on the command line.
    pub fn is_flag(&self) -> bool {
        self.source == SourceKind::NamedOption && self.ty.is_flag()
    }
}

/// Read access to environment variables.
pub trait Environment: Send + Sync {
    fn var(&self, name: &str) -> Option<String>;
}

/// The process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl Environment for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl Environment for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Which precedence step produced a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Supplied,
    Environment,
    Default,
    /// Nothing applied; the value is missing or a flag's implicit false.
    Absent,
}

/// The outcome of resolving one parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub raw: RawValue,
    pub source: ValueSource,
}

/// Pick the winning raw value for `desc`.
///
/// # Errors
///
/// Returns `ResolveError::MissingRequiredValue` when a required parameter
/// has no supplied token, no environment value and no default.
pub fn resolve(
    desc: &ParameterDescriptor,
    supplied: Option<&RawValue>,
    env: &dyn Environment,
) -> Result<Resolution, ResolveError> {
    if let Some(raw) = supplied.filter(|r| !r.is_missing()) {
        trace!(parameter = %desc.name, "using supplied value");
        return Ok(Resolution {
            raw: raw.clone(),
            source: ValueSource::Supplied,
        });
    }

    if let Some(value) = desc.env_var.as_deref().and_then(|var| env.var(var)) {
        trace!(parameter = %desc.name, "using environment value");
        return Ok(Resolution {
            raw: RawValue::Single(value),
            source: ValueSource::Environment,
        });
    }

    if let Some(default) = &desc.default {
        trace!(parameter = %desc.name, "using default");
        return Ok(Resolution {
            raw: default.produce(),
            source: ValueSource::Default,
        });
    }

    if desc.is_flag() && !desc.required {
        return Ok(Resolution {
            raw: RawValue::Flag(false),
            source: ValueSource::Absent,
        });
    }

    if desc.required {
        return Err(ResolveError::MissingRequiredValue {
            parameter: desc.name.clone(),
        });
    }

    Ok(Resolution {
        raw: RawValue::Missing,
        source: ValueSource::Absent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    mod precedence {
        use super::*;

        fn count() -> ParameterDescriptor {
            ParameterDescriptor::option("n", TypeSpec::Integer)
                .default("3")
                .env_var("N")
        }

        #[test]
        fn default_when_nothing_else() {
            let r = resolve(&count(), None, &env(&[])).unwrap();
            assert_eq!(r.raw, RawValue::from("3"));
            assert_eq!(r.source, ValueSource::Default);
        }

        #[test]
        fn env_beats_default() {
            let r = resolve(&count(), None, &env(&[("N", "7")])).unwrap();
            assert_eq!(r.raw, RawValue::from("7"));
            assert_eq!(r.source, ValueSource::Environment);
        }

        #[test]
        fn token_beats_env() {
            let token = RawValue::from("9");
            let r = resolve(&count(), Some(&token), &env(&[("N", "7")])).unwrap();
            assert_eq!(r.raw, RawValue::from("9"));
            assert_eq!(r.source, ValueSource::Supplied);
        }

        #[test]
        fn missing_token_falls_through() {
            let r = resolve(&count(), Some(&RawValue::Missing), &env(&[])).unwrap();
            assert_eq!(r.source, ValueSource::Default);
        }

        #[test]
        fn factory_default_evaluated() {
            let desc = ParameterDescriptor::option("stamp", TypeSpec::Text)
                .default_with(|| RawValue::from("generated"));
            let r = resolve(&desc, None, &env(&[])).unwrap();
            assert_eq!(r.raw, RawValue::from("generated"));
        }
    }

    mod missing {
        use super::*;

        #[test]
        fn required_fails_with_name() {
            let desc = ParameterDescriptor::argument("target", TypeSpec::Text).required();
            let err = resolve(&desc, None, &env(&[])).unwrap_err();
            assert_eq!(
                err,
                ResolveError::MissingRequiredValue {
                    parameter: "target".into()
                }
            );
            assert!(err.to_string().contains("target"));
        }

        #[test]
        fn required_satisfied_by_env() {
            let desc = ParameterDescriptor::env("token", TypeSpec::Text, "TOKEN").required();
            let r = resolve(&desc, None, &env(&[("TOKEN", "abc")])).unwrap();
            assert_eq!(r.raw, RawValue::from("abc"));
        }

        #[test]
        fn optional_resolves_missing() {
            let desc = ParameterDescriptor::option("label", TypeSpec::Text);
            let r = resolve(&desc, None, &env(&[])).unwrap();
            assert!(r.raw.is_missing());
            assert_eq!(r.source, ValueSource::Absent);
        }

        #[test]
        fn bool_option_defaults_false() {
            let desc = ParameterDescriptor::option("force", TypeSpec::Bool);
            let r = resolve(&desc, None, &env(&[])).unwrap();
            assert_eq!(r.raw, RawValue::Flag(false));
        }

        #[test]
        fn bool_argument_is_not_a_flag() {
            let desc = ParameterDescriptor::argument("enabled", TypeSpec::Bool);
            let r = resolve(&desc, None, &env(&[])).unwrap();
            assert!(r.raw.is_missing());
        }
    }

    mod descriptor {
        use super::*;

        #[test]
        fn default_clears_required() {
            let desc = ParameterDescriptor::option("x", TypeSpec::Integer)
                .required()
                .default("1");
            assert!(!desc.required);
        }

        #[test]
        fn debug_hides_factory() {
            let desc =
                ParameterDescriptor::option("x", TypeSpec::Text).default_with(|| RawValue::Missing);
            assert!(format!("{:?}", desc).contains("Factory(..)"));
        }

        #[test]
        fn name_validated_on_request() {
            assert!(ParameterDescriptor::option("dry_run", TypeSpec::Bool)
                .param_name()
                .is_ok());
            assert!(ParameterDescriptor::option("1bad", TypeSpec::Text)
                .param_name()
                .is_err());
        }

        #[test]
        fn flag_spelling() {
            let desc = ParameterDescriptor::option("dry_run", TypeSpec::Bool);
            assert_eq!(desc.flag(), "dry-run");
            assert!(desc.is_flag());
        }
    }
}
