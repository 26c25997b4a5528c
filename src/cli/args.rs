//! cli::args
//!
//! Global flags and the root command definition.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--config <path>`: Load settings from this file
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Minimal output
//!
//! Subcommands are not known at compile time; they are generated from the
//! engine's command registry by [`super::parser`].

use std::path::PathBuf;

use clap::{Args, Command};

/// Name of the root command.
pub const PROGRAM: &str = "lectern";

/// Name of the built-in help subcommand.
pub const DESCRIBE: &str = "describe";

/// Flags shared by every subcommand.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalArgs {
    /// Load settings from this file instead of searching
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Arguments of the built-in `describe` subcommand.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct DescribeArgs {
    /// Command to describe; lists all commands when omitted
    pub command: Option<String>,

    /// Print machine-readable JSON
    #[arg(long)]
    pub json: bool,
}

/// The root command, without any registered subcommands.
pub fn root() -> Command {
    let root = Command::new(PROGRAM)
        .version(env!("CARGO_PKG_VERSION"))
        .about("Declarative command parameter resolution and invocation")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(DescribeArgs::augment_args(
            Command::new(DESCRIBE).about("Show the parameters of registered commands"),
        ));
    GlobalArgs::augment_args(root)
}
