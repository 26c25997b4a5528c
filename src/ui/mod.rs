//! ui
//!
//! User-facing output.
//!
//! # Modules
//!
//! - [`output`] - Result rendering, command descriptions and diagnostics
//!
//! # Design
//!
//! All printing goes through this module so quiet mode is honored in one
//! place. The engine itself never writes to stdout.

pub mod output;
