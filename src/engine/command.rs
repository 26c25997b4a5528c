//! engine::command
//!
//! Command descriptors and the registry that owns them.
//!
//! # Architecture
//!
//! A command is registered once, as an explicit descriptor table: name,
//! callback, ordered parameter descriptors and middleware references. Every
//! structural check happens in [`CommandRegistry::register`], so invocation
//! never has to re-validate a signature.
//!
//! # Invariants
//!
//! - Command names are unique after kebab-case normalization
//! - Parameter names are unique within a command
//! - A required parameter never carries a default
//! - A variadic parameter has a container type
//! - Descriptors are immutable once registered
//!
//! # Example
//!
//! ```
//! use lectern::core::typespec::TypeSpec;
//! use lectern::core::value::Value;
//! use lectern::engine::command::{Callback, CommandDescriptor, CommandRegistry};
//! use lectern::engine::params::ParameterDescriptor;
//!
//! let greet = CommandDescriptor::new(
//!     "say_hello",
//!     Callback::new(|args| Ok(Value::text(format!("hello {}", args.text("name")?)))),
//! )
//! .param(ParameterDescriptor::argument("name", TypeSpec::Text).required());
//!
//! let mut registry = CommandRegistry::default();
//! let name = registry.register(greet).unwrap();
//! assert_eq!(name.as_str(), "say-hello");
//! assert!(registry.get("say_hello").is_some());
//! ```

use std::fmt;
use std::future::{ready, Future};
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail};
use thiserror::Error;

use super::middleware::{MiddlewareRef, MiddlewareSet};
use super::params::ParameterDescriptor;
use crate::core::naming::kebab_case;
use crate::core::types::{CommandName, TypeError};
use crate::core::value::{InvocationContext, Value};

/// Boxed future used for callbacks and hooks.
///
/// Every callback and hook is driven through this one shape, whether or not
/// it ever suspends.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

type CallbackFn = dyn Fn(Arguments) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync;

/// Errors from command registration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("command '{command}' is already registered")]
    DuplicateCommandName { command: String },

    #[error("command '{command}' declares parameter '{parameter}' more than once")]
    DuplicateParameterName { command: String, parameter: String },

    #[error("parameter '{parameter}' of command '{command}' is required but has a default")]
    RequiredWithDefault { command: String, parameter: String },

    #[error("variadic parameter '{parameter}' of command '{command}' must have a container type")]
    VariadicRequiresContainer { command: String, parameter: String },

    #[error(transparent)]
    InvalidName(#[from] TypeError),
}

/// A command body.
#[derive(Clone)]
pub struct Callback {
    run: Arc<CallbackFn>,
    is_async: bool,
}

impl Callback {
    /// Wrap a synchronous body.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Arguments) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self {
            run: Arc::new(move |args: Arguments| -> BoxFuture<'static, anyhow::Result<Value>> {
                Box::pin(ready(f(&args)))
            }),
            is_async: false,
        }
    }

    /// Wrap an asynchronous body.
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self {
            run: Arc::new(move |args: Arguments| -> BoxFuture<'static, anyhow::Result<Value>> {
                Box::pin(f(args))
            }),
            is_async: true,
        }
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    pub fn call(&self, args: Arguments) -> BoxFuture<'static, anyhow::Result<Value>> {
        (self.run)(args)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("is_async", &self.is_async)
            .finish_non_exhaustive()
    }
}

/// The resolved argument mapping handed to callbacks and hooks.
///
/// Keys are parameter names in declaration order. Silent parameters are
/// never present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    values: Vec<(String, Value)>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn require(&self, name: &str) -> anyhow::Result<&Value> {
        self.get(name)
            .ok_or_else(|| anyhow!("no argument named '{}'", name))
    }

    pub fn text(&self, name: &str) -> anyhow::Result<&str> {
        let value = self.require(name)?;
        value
            .as_str()
            .ok_or_else(|| anyhow!("argument '{}' is {}, not text", name, value.kind()))
    }

    pub fn int(&self, name: &str) -> anyhow::Result<i64> {
        let value = self.require(name)?;
        value
            .as_i64()
            .ok_or_else(|| anyhow!("argument '{}' is {}, not an integer", name, value.kind()))
    }

    pub fn float(&self, name: &str) -> anyhow::Result<f64> {
        let value = self.require(name)?;
        value
            .as_f64()
            .ok_or_else(|| anyhow!("argument '{}' is {}, not a number", name, value.kind()))
    }

    pub fn boolean(&self, name: &str) -> anyhow::Result<bool> {
        let value = self.require(name)?;
        value
            .as_bool()
            .ok_or_else(|| anyhow!("argument '{}' is {}, not a boolean", name, value.kind()))
    }

    /// The shared instance injected for a state parameter.
    pub fn state<T: Send + 'static>(&self, name: &str) -> anyhow::Result<Arc<Mutex<T>>> {
        match self.require(name)? {
            Value::State(shared) => match shared.downcast::<T>() {
                Some(instance) => Ok(instance),
                None => bail!(
                    "argument '{}' holds state {}, not the requested class",
                    name,
                    shared.key().name()
                ),
            },
            other => bail!("argument '{}' is {}, not state", name, other.kind()),
        }
    }

    pub fn context(&self, name: &str) -> anyhow::Result<&InvocationContext> {
        match self.require(name)? {
            Value::Context(ctx) => Ok(ctx),
            other => bail!("argument '{}' is {}, not the invocation context", name, other.kind()),
        }
    }
}

/// A registered command.
#[derive(Debug, Clone)]
pub struct CommandDescriptor {
    /// Kebab-normalized by registration.
    pub name: String,
    pub help: Option<String>,
    pub callback: Callback,
    pub parameters: Vec<ParameterDescriptor>,
    pub middleware: Vec<MiddlewareRef>,
}

impl CommandDescriptor {
    pub fn new(name: &str, callback: Callback) -> Self {
        Self {
            name: name.to_string(),
            help: None,
            callback,
            parameters: Vec::new(),
            middleware: Vec::new(),
        }
    }

    pub fn help(mut self, text: &str) -> Self {
        self.help = Some(text.to_string());
        self
    }

    pub fn param(mut self, param: ParameterDescriptor) -> Self {
        self.parameters.push(param);
        self
    }

    /// Reference a named middleware set.
    pub fn middleware(mut self, set: &str) -> Self {
        self.middleware.push(MiddlewareRef::Named(set.to_string()));
        self
    }

    /// Attach an anonymous hook set to this command only.
    pub fn middleware_inline(mut self, set: MiddlewareSet) -> Self {
        self.middleware.push(MiddlewareRef::Inline(set));
        self
    }

    pub fn is_async(&self) -> bool {
        self.callback.is_async()
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.parameters.iter().find(|p| p.name == name)
    }

    fn validate(&self, command: &str) -> Result<(), RegistrationError> {
        for (i, param) in self.parameters.iter().enumerate() {
            param.param_name()?;

            // `dry_run` and `dry-run` share one flag and one token key.
            if self.parameters[..i].iter().any(|p| p.flag() == param.flag()) {
                return Err(RegistrationError::DuplicateParameterName {
                    command: command.to_string(),
                    parameter: param.name.clone(),
                });
            }
            if param.required && param.default.is_some() {
                return Err(RegistrationError::RequiredWithDefault {
                    command: command.to_string(),
                    parameter: param.name.clone(),
                });
            }
            if param.variadic && !param.ty.is_container() {
                return Err(RegistrationError::VariadicRequiresContainer {
                    command: command.to_string(),
                    parameter: param.name.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Registered commands, in registration order.
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    commands: Vec<Arc<CommandDescriptor>>,
}

impl CommandRegistry {
    /// Validate and register a command.
    ///
    /// # Errors
    ///
    /// Returns a `RegistrationError` if the name is invalid or taken, or if
    /// the parameter table breaks one of the invariants above.
    pub fn register(&mut self, mut desc: CommandDescriptor) -> Result<CommandName, RegistrationError> {
        let name = CommandName::new(&desc.name)?;
        if self.get(name.as_str()).is_some() {
            return Err(RegistrationError::DuplicateCommandName {
                command: name.to_string(),
            });
        }
        desc.validate(name.as_str())?;

        desc.name = name.to_string();
        self.commands.push(Arc::new(desc));
        Ok(name)
    }

    /// Look up a command. The name is normalized first.
    pub fn get(&self, name: &str) -> Option<Arc<CommandDescriptor>> {
        let wanted = kebab_case(name);
        self.commands.iter().find(|c| c.name == wanted).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.commands.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandDescriptor> {
        self.commands.iter().map(|c| c.as_ref())
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
