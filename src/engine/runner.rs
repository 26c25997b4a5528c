//! engine::runner
//!
//! Invocation orchestrator: the single path from supplied tokens to a result.
//!
//! # Architecture
//!
//! ```text
//! tokens -> resolve (per parameter) -> coerce | decode | inject state
//!        -> before hooks -> callback -> after hooks -> Outcome
//! ```
//!
//! Parameters are processed in declaration order. Positional tokens are
//! consumed by positional parameters in that same order: a fixed tuple takes
//! as many tokens as its arity, a variadic parameter takes the rest, any
//! other positional takes one.
//!
//! # Invariants
//!
//! - The first resolution or coercion failure stops the invocation; the
//!   callback never sees a partial argument set
//! - Silent parameters are resolved and validated but never reach the
//!   argument mapping
//! - Registered state classes bypass token resolution entirely
//! - A callback failure skips every after-hook
//!
//! # Exit Codes
//!
//! | Outcome | Code |
//! |---|---|
//! | success | 0 |
//! | callback, hook or runtime failure | 1 |
//! | usage failure (unknown command, missing or malformed value) | 2 |

use std::collections::{HashMap, VecDeque};

use thiserror::Error;
use tracing::debug;

use super::coerce::{Coercer, ConversionError};
use super::command::{Arguments, CommandDescriptor};
use super::encoders::{EncodeError, EncoderRegistry};
use super::middleware::{MiddlewareAbort, MiddlewareRegistry};
use super::params::{resolve, Environment, ParameterDescriptor, RawValue, ResolveError, SourceKind};
use super::state::StateRegistry;
use crate::core::typespec::TypeSpec;
use crate::core::value::{InvocationContext, Value};

/// Exit code for a successful invocation.
pub const EXIT_SUCCESS: i32 = 0;

/// Exit code for failures while running the command.
pub const EXIT_FAILURE: i32 = 1;

/// Exit code for malformed invocations.
pub const EXIT_USAGE: i32 = 2;

/// Errors from one invocation.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("unknown option '{option}' for command '{command}'")]
    UnknownOption { command: String, option: String },

    #[error("unexpected arguments: {}", .0.join(" "))]
    UnexpectedArguments(Vec<String>),

    #[error(transparent)]
    MissingValue(#[from] ResolveError),

    #[error("invalid value for '{parameter}': {source}")]
    Conversion {
        parameter: String,
        #[source]
        source: ConversionError,
    },

    #[error("invalid payload for '{parameter}': {source}")]
    Encode {
        parameter: String,
        #[source]
        source: EncodeError,
    },

    #[error("parameter '{parameter}' needs state class {class}, which is not registered")]
    UnregisteredState {
        parameter: String,
        class: &'static str,
    },

    #[error(transparent)]
    MiddlewareAbort(#[from] MiddlewareAbort),

    #[error("command '{command}' failed: {source}")]
    CallbackFailed {
        command: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("cannot start a blocking invocation inside a running async runtime; use invoke_async")]
    NestedBridge,

    #[error("failed to start async runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

impl InvokeError {
    /// Whether the failure is the caller's input rather than the command's.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            InvokeError::UnknownCommand(_)
                | InvokeError::UnknownOption { .. }
                | InvokeError::UnexpectedArguments(_)
                | InvokeError::MissingValue(_)
                | InvokeError::Conversion { .. }
                | InvokeError::Encode { .. }
        )
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_usage() {
            EXIT_USAGE
        } else {
            EXIT_FAILURE
        }
    }
}

/// A successful invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub command: String,
    pub result: Value,
}

impl Outcome {
    pub fn exit_status(&self) -> i32 {
        EXIT_SUCCESS
    }
}

/// Exit status for any invocation result.
pub fn exit_status(result: &Result<Outcome, InvokeError>) -> i32 {
    match result {
        Ok(outcome) => outcome.exit_status(),
        Err(err) => err.exit_code(),
    }
}

/// Tokens already split by the argument parser.
///
/// Option keys may use either the declared parameter name or its
/// kebab-case flag spelling.
///
/// # Example
///
/// ```
/// use lectern::engine::runner::SuppliedTokens;
///
/// let tokens = SuppliedTokens::new()
///     .positional("alice")
///     .option("greeting", "Hi")
///     .flag("shout")
///     .payload("target", r#"{"host": "db"}"#);
///
/// assert_eq!(tokens.positionals, vec!["alice".to_string()]);
/// assert_eq!(tokens.options.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuppliedTokens {
    pub options: HashMap<String, RawValue>,
    pub positionals: Vec<String>,
    pub payloads: HashMap<String, String>,
    /// Name the program was invoked as, reported through the context.
    pub program: Option<String>,
}

impl SuppliedTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn option(mut self, name: &str, raw: impl Into<RawValue>) -> Self {
        self.options.insert(name.to_string(), raw.into());
        self
    }

    pub fn flag(self, name: &str) -> Self {
        self.option(name, RawValue::Flag(true))
    }

    pub fn positional(mut self, token: &str) -> Self {
        self.positionals.push(token.to_string());
        self
    }

    pub fn positionals<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.positionals.extend(tokens.into_iter().map(Into::into));
        self
    }

    pub fn payload(mut self, name: &str, text: &str) -> Self {
        self.payloads.insert(name.to_string(), text.to_string());
        self
    }

    pub fn program(mut self, name: &str) -> Self {
        self.program = Some(name.to_string());
        self
    }

    fn option_for(&self, param: &ParameterDescriptor) -> Option<&RawValue> {
        self.options
            .get(&param.name)
            .or_else(|| self.options.get(&param.flag()))
    }

    fn payload_for(&self, param: &ParameterDescriptor) -> Option<&String> {
        self.payloads
            .get(&param.name)
            .or_else(|| self.payloads.get(&param.flag()))
    }
}

/// Borrowed view of the registries an invocation needs.
#[derive(Debug, Clone, Copy)]
pub struct Runner<'a> {
    pub middleware: &'a MiddlewareRegistry,
    pub states: &'a StateRegistry,
    pub encoders: &'a EncoderRegistry,
}

impl<'a> Runner<'a> {
    fn coercer(&self) -> &Coercer {
        self.encoders.coercer()
    }

    /// Run one command to completion.
    pub async fn run(
        &self,
        desc: &CommandDescriptor,
        tokens: &SuppliedTokens,
        env: &dyn Environment,
    ) -> Result<Outcome, InvokeError> {
        let args = self.resolve_arguments(desc, tokens, env)?;
        let command = desc.name.as_str();

        let chain = self.middleware.resolve(&desc.middleware);
        chain.run_before(command, &args).await?;

        debug!(command, is_async = desc.is_async(), "invoking callback");
        let result = desc
            .callback
            .call(args.clone())
            .await
            .map_err(|e| InvokeError::CallbackFailed {
                command: command.to_string(),
                source: e.into(),
            })?;

        chain.run_after(command, &args, &result).await?;

        Ok(Outcome {
            command: command.to_string(),
            result,
        })
    }

    /// Resolve every parameter and assemble the visible argument mapping.
    pub fn resolve_arguments(
        &self,
        desc: &CommandDescriptor,
        tokens: &SuppliedTokens,
        env: &dyn Environment,
    ) -> Result<Arguments, InvokeError> {
        self.check_known_options(desc, tokens)?;

        let mut positionals: VecDeque<String> = tokens.positionals.iter().cloned().collect();
        let mut args = Arguments::new();

        for param in &desc.parameters {
            let value = match &param.ty {
                TypeSpec::Context => {
                    Value::Context(InvocationContext::new(desc.name.clone(), tokens.program.clone()))
                }
                TypeSpec::State(key) => {
                    let shared = self.states.get_instance(key).ok_or_else(|| {
                        InvokeError::UnregisteredState {
                            parameter: param.name.clone(),
                            class: key.name(),
                        }
                    })?;
                    debug!(parameter = %param.name, class = key.name(), "injecting state");
                    Value::State(shared)
                }
                _ => {
                    let supplied = match param.source {
                        SourceKind::NamedOption => tokens.option_for(param).cloned(),
                        SourceKind::PositionalArgument => take_positionals(param, &mut positionals),
                        SourceKind::EnvironmentVar => None,
                        SourceKind::StructuredPayload => {
                            tokens.payload_for(param).cloned().map(RawValue::Single)
                        }
                    };
                    self.resolve_one(param, supplied.as_ref(), env)?
                }
            };

            if param.silent {
                debug!(parameter = %param.name, "silent parameter validated");
            } else {
                args.insert(param.name.clone(), value);
            }
        }

        if !positionals.is_empty() {
            return Err(InvokeError::UnexpectedArguments(positionals.into()));
        }

        Ok(args)
    }

    fn resolve_one(
        &self,
        param: &ParameterDescriptor,
        supplied: Option<&RawValue>,
        env: &dyn Environment,
    ) -> Result<Value, InvokeError> {
        let resolution = resolve(param, supplied, env)?;
        debug!(
            parameter = %param.name,
            source = ?resolution.source,
            target = %param.ty,
            "resolved parameter"
        );

        if param.source == SourceKind::StructuredPayload {
            let text = match &resolution.raw {
                RawValue::Missing => return Ok(Value::Null),
                RawValue::Single(text) => text.clone(),
                RawValue::Many(items) => items.join(""),
                RawValue::Flag(b) => b.to_string(),
            };
            return self
                .encoders
                .decode(&text, &param.ty)
                .map_err(|source| InvokeError::Encode {
                    parameter: param.name.clone(),
                    source,
                });
        }

        self.coercer()
            .coerce(&resolution.raw, &param.ty)
            .map_err(|source| InvokeError::Conversion {
                parameter: param.name.clone(),
                source,
            })
    }

    fn check_known_options(
        &self,
        desc: &CommandDescriptor,
        tokens: &SuppliedTokens,
    ) -> Result<(), InvokeError> {
        let accepts = |key: &str, kind: SourceKind| {
            desc.parameters
                .iter()
                .filter(|p| !p.ty.is_injected())
                .any(|p| p.source == kind && (p.name == key || p.flag() == key))
        };

        let unknown = tokens
            .options
            .keys()
            .find(|k| !accepts(k.as_str(), SourceKind::NamedOption))
            .or_else(|| {
                tokens
                    .payloads
                    .keys()
                    .find(|k| !accepts(k.as_str(), SourceKind::StructuredPayload))
            });

        match unknown {
            Some(option) => Err(InvokeError::UnknownOption {
                command: desc.name.clone(),
                option: option.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// Take the tokens `param` consumes. One token is passed bare so that a
/// delimited list still splits; several are passed as a list.
fn take_positionals(param: &ParameterDescriptor, queue: &mut VecDeque<String>) -> Option<RawValue> {
    if queue.is_empty() {
        return None;
    }
    let take = if param.variadic {
        queue.len()
    } else {
        match param.ty.fixed_arity() {
            Some(n) if n > 1 || param.ty.is_container() => n.min(queue.len()),
            _ => 1,
        }
    };
    let mut taken: Vec<String> = queue.drain(..take).collect();
    if taken.len() == 1 {
        taken.pop().map(RawValue::Single)
    } else {
        Some(RawValue::Many(taken))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod positionals {
        use super::*;

        #[test]
        fn tuple_takes_arity() {
            let param = ParameterDescriptor::argument(
                "point",
                TypeSpec::Tuple(vec![TypeSpec::Integer, TypeSpec::Integer]),
            );
            let mut queue: VecDeque<String> = ["1", "2", "3"].iter().map(|s| s.to_string()).collect();
            assert_eq!(
                take_positionals(&param, &mut queue),
                Some(RawValue::from(vec!["1", "2"]))
            );
            assert_eq!(queue.len(), 1);
        }

        #[test]
        fn variadic_takes_rest() {
            let param =
                ParameterDescriptor::argument("files", TypeSpec::list(TypeSpec::Text)).variadic();
            let mut queue: VecDeque<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
            assert_eq!(
                take_positionals(&param, &mut queue),
                Some(RawValue::from(vec!["a", "b"]))
            );
            assert!(queue.is_empty());
        }

        #[test]
        fn variadic_single_token_is_bare() {
            let param =
                ParameterDescriptor::argument("files", TypeSpec::list(TypeSpec::Text)).variadic();
            let mut queue: VecDeque<String> = ["a;b"].iter().map(|s| s.to_string()).collect();
            assert_eq!(take_positionals(&param, &mut queue), Some(RawValue::from("a;b")));
        }

        #[test]
        fn scalar_takes_one() {
            let param = ParameterDescriptor::argument("name", TypeSpec::Text);
            let mut queue: VecDeque<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
            assert_eq!(take_positionals(&param, &mut queue), Some(RawValue::from("a")));
        }

        #[test]
        fn list_without_variadic_takes_one_delimited() {
            let param = ParameterDescriptor::argument("tags", TypeSpec::list(TypeSpec::Text));
            let mut queue: VecDeque<String> = ["a,b", "c"].iter().map(|s| s.to_string()).collect();
            assert_eq!(take_positionals(&param, &mut queue), Some(RawValue::from("a,b")));
        }

        #[test]
        fn empty_queue_supplies_nothing() {
            let param = ParameterDescriptor::argument("name", TypeSpec::Text);
            assert_eq!(take_positionals(&param, &mut VecDeque::new()), None);
        }
    }

    mod exit_codes {
        use super::*;

        #[test]
        fn usage_errors_are_two() {
            let err = InvokeError::UnknownCommand("x".into());
            assert_eq!(err.exit_code(), EXIT_USAGE);
            let err = InvokeError::MissingValue(ResolveError::MissingRequiredValue {
                parameter: "p".into(),
            });
            assert_eq!(err.exit_code(), EXIT_USAGE);
        }

        #[test]
        fn execution_errors_are_one() {
            let err = InvokeError::CallbackFailed {
                command: "x".into(),
                source: "boom".into(),
            };
            assert_eq!(err.exit_code(), EXIT_FAILURE);
            assert_eq!(InvokeError::NestedBridge.exit_code(), EXIT_FAILURE);
        }

        #[test]
        fn outcome_is_zero() {
            let ok: Result<Outcome, InvokeError> = Ok(Outcome {
                command: "x".into(),
                result: Value::Null,
            });
            assert_eq!(exit_status(&ok), EXIT_SUCCESS);
        }
    }
}
