//! core
//!
//! Domain types shared by every layer.
//!
//! # Modules
//!
//! - [`types`] - Strong types: CommandName, ParamName
//! - [`typespec`] - Declared parameter types
//! - [`value`] - Typed values produced by resolution
//! - [`naming`] - Kebab-case normalization
//! - [`config`] - Settings schema and loading
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid descriptors from being registered
//! - Declared types are plain data, inspected once at registration
//! - Nothing in `core` performs I/O except settings loading

pub mod config;
pub mod naming;
pub mod types;
pub mod typespec;
pub mod value;
