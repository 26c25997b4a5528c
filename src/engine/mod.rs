//! engine
//!
//! Resolves declared parameters and runs commands through their middleware.
//!
//! # Architecture
//!
//! The engine is a plain aggregate of explicit registries:
//!
//! - [`command::CommandRegistry`] - descriptor tables, validated at registration
//! - [`middleware::MiddlewareRegistry`] - named hook sets and global hooks
//! - [`state::StateRegistry`] - lazily created singletons
//! - [`encoders::EncoderRegistry`] - structured payload molding
//!
//! One invocation flows strictly upward:
//!
//! ```text
//! raw tokens -> resolved values -> typed values -> injected state
//!     -> middleware-wrapped execution -> Outcome
//! ```
//!
//! # Invariants
//!
//! - Every registry is an owned value; tests build isolated engines freely
//! - [`Engine::global`] exists only for the binary's convenience
//! - [`Engine::invoke`] is the only blocking bridge and refuses to nest
//!   inside a running runtime
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//! use lectern::core::typespec::TypeSpec;
//! use lectern::core::value::Value;
//! use lectern::engine::command::{Callback, CommandDescriptor};
//! use lectern::engine::params::ParameterDescriptor;
//! use lectern::engine::runner::SuppliedTokens;
//! use lectern::engine::Engine;
//!
//! let mut engine = Engine::new();
//! engine
//!     .register_command(
//!         CommandDescriptor::new("double", Callback::new(|args| Ok(Value::Int(args.int("n")? * 2))))
//!             .param(ParameterDescriptor::argument("n", TypeSpec::Integer).required()),
//!     )
//!     .unwrap();
//!
//! let tokens = SuppliedTokens::new().positional("21");
//! let outcome = engine.invoke("double", &tokens, &HashMap::<String, String>::new()).unwrap();
//! assert_eq!(outcome.result, Value::Int(42));
//! ```

pub mod coerce;
pub mod command;
pub mod encoders;
pub mod middleware;
pub mod params;
pub mod runner;
pub mod state;

// Re-exports for convenience
pub use coerce::{Coercer, ConversionError};
pub use command::{Arguments, Callback, CommandDescriptor, CommandRegistry, RegistrationError};
pub use encoders::{EncodeError, Encoder, EncoderRegistry};
pub use middleware::{Hook, HookContext, MiddlewareAbort, MiddlewareRef, MiddlewareRegistry, MiddlewareSet};
pub use params::{Environment, ParameterDescriptor, ProcessEnv, RawValue, ResolveError, SourceKind};
pub use runner::{InvokeError, Outcome, Runner, SuppliedTokens};
pub use state::StateRegistry;

use std::sync::{OnceLock, RwLock};

use serde::Serialize;
use tracing::debug;

use crate::core::config::Config;
use crate::core::types::CommandName;
use params::DefaultValue;

/// One parameter as exposed to help renderers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParameterInfo {
    pub name: String,
    pub flag: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub source: String,
    pub required: bool,
    pub default: Option<String>,
    pub env_var: Option<String>,
    pub variadic: bool,
    pub help: Option<String>,
}

impl ParameterInfo {
    fn from_descriptor(p: &ParameterDescriptor) -> Self {
        Self {
            name: p.name.clone(),
            flag: p.flag(),
            type_name: p.ty.to_string(),
            source: p.source.to_string(),
            required: p.required,
            default: p.default.as_ref().and_then(render_default),
            env_var: p.env_var.clone(),
            variadic: p.variadic,
            help: p.help.clone(),
        }
    }
}

fn render_default(default: &DefaultValue) -> Option<String> {
    match default {
        DefaultValue::Factory(_) => Some("<computed>".to_string()),
        DefaultValue::Raw(RawValue::Missing) => None,
        DefaultValue::Raw(RawValue::Flag(b)) => Some(b.to_string()),
        DefaultValue::Raw(RawValue::Single(s)) => Some(s.clone()),
        DefaultValue::Raw(RawValue::Many(items)) => Some(items.join(",")),
    }
}

/// A command as exposed to help renderers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandInfo {
    pub name: String,
    pub help: Option<String>,
    pub is_async: bool,
    pub parameters: Vec<ParameterInfo>,
}

/// All registries needed to resolve and run commands.
#[derive(Debug, Default)]
pub struct Engine {
    commands: CommandRegistry,
    middleware: MiddlewareRegistry,
    states: StateRegistry,
    encoders: EncoderRegistry,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine whose coercion follows the loaded settings.
    pub fn with_config(config: &Config) -> Self {
        Self {
            encoders: EncoderRegistry::with_coercer(Coercer::new(config.list_delimiter())),
            ..Self::default()
        }
    }

    /// The process-wide engine used by the binary.
    pub fn global() -> &'static RwLock<Engine> {
        static ENGINE: OnceLock<RwLock<Engine>> = OnceLock::new();
        ENGINE.get_or_init(|| RwLock::new(Engine::new()))
    }

    // =========================================================================
    // Registration
    // =========================================================================

    pub fn register_command(&mut self, desc: CommandDescriptor) -> Result<CommandName, RegistrationError> {
        let name = self.commands.register(desc)?;
        debug!(command = %name, "registered command");
        Ok(name)
    }

    pub fn register_middleware(&mut self, set: MiddlewareSet) {
        debug!(set = %set.name, "registered middleware set");
        self.middleware.register(set);
    }

    pub fn add_before_global(&mut self, hook: Hook) {
        self.middleware.add_before_global(hook);
    }

    pub fn add_after_global(&mut self, hook: Hook) {
        self.middleware.add_after_global(hook);
    }

    pub fn register_state<T: Default + Send + 'static>(&self) -> bool {
        self.states.register::<T>()
    }

    pub fn register_state_with<T, F>(&self, factory: F) -> bool
    where
        T: Send + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.states.register_with(factory)
    }

    pub fn register_encoder<E: Encoder + 'static>(&mut self, encoder: E) {
        self.encoders.register(encoder);
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    pub fn middleware(&self) -> &MiddlewareRegistry {
        &self.middleware
    }

    pub fn middleware_mut(&mut self) -> &mut MiddlewareRegistry {
        &mut self.middleware
    }

    pub fn states(&self) -> &StateRegistry {
        &self.states
    }

    pub fn encoders(&self) -> &EncoderRegistry {
        &self.encoders
    }

    pub fn encoders_mut(&mut self) -> &mut EncoderRegistry {
        &mut self.encoders
    }

    /// Visible parameters of a command, in declaration order.
    ///
    /// Silent parameters and injected state are left out.
    pub fn describe(&self, name: &str) -> Option<CommandInfo> {
        let desc = self.commands.get(name)?;
        Some(CommandInfo {
            name: desc.name.clone(),
            help: desc.help.clone(),
            is_async: desc.is_async(),
            parameters: desc
                .parameters
                .iter()
                .filter(|p| !p.silent && !p.ty.is_injected())
                .map(ParameterInfo::from_descriptor)
                .collect(),
        })
    }

    // =========================================================================
    // Invocation
    // =========================================================================

    fn runner(&self) -> Runner<'_> {
        Runner {
            middleware: &self.middleware,
            states: &self.states,
            encoders: &self.encoders,
        }
    }

    /// Invoke a command from inside an async context.
    pub async fn invoke_async(
        &self,
        name: &str,
        tokens: &SuppliedTokens,
        env: &dyn Environment,
    ) -> Result<Outcome, InvokeError> {
        let desc = self
            .commands
            .get(name)
            .ok_or_else(|| InvokeError::UnknownCommand(name.to_string()))?;
        debug!(command = %desc.name, "invoking");
        self.runner().run(&desc, tokens, env).await
    }

    /// Invoke a command from synchronous code.
    ///
    /// Builds a current-thread runtime and blocks on the invocation.
    ///
    /// # Errors
    ///
    /// Returns `InvokeError::NestedBridge` when called from inside a running
    /// tokio runtime; use [`Engine::invoke_async`] there.
    pub fn invoke(
        &self,
        name: &str,
        tokens: &SuppliedTokens,
        env: &dyn Environment,
    ) -> Result<Outcome, InvokeError> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(InvokeError::NestedBridge);
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.invoke_async(name, tokens, env))
    }
}
