//! Lectern - declarative command parameter resolution and invocation
//!
//! Commands are registered as descriptor tables: a name, a callback, an
//! ordered list of typed parameters and the middleware that wraps them. At
//! invocation time Lectern resolves every parameter from supplied tokens,
//! the environment or a default, converts it to its declared type, injects
//! shared state, and runs the callback between its before and after hooks.
//!
//! # Architecture
//!
//! The codebase follows a strict layered architecture:
//!
//! - [`cli`] - Command-line interface layer (parses argv, delegates to engine)
//! - [`engine`] - Resolve → Coerce → Inject → Hooks → Callback lifecycle
//! - [`core`] - Declared types, typed values, naming and settings
//! - [`ui`] - Output formatting
//!
//! # Correctness Invariants
//!
//! Lectern maintains the following invariants:
//!
//! 1. A callback only ever sees a fully resolved, fully typed argument set
//! 2. Precedence is always supplied token, then environment, then default
//! 3. Silent parameters are validated but never passed on
//! 4. At most one instance of each state class exists per engine

pub mod cli;
pub mod core;
pub mod engine;
pub mod ui;
