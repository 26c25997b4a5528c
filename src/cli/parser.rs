//! cli::parser
//!
//! Generates clap subcommands from command descriptors and turns matches
//! back into [`SuppliedTokens`].
//!
//! # Mapping
//!
//! | Source | Command line |
//! |---|---|
//! | named option, `bool` | `--flag` |
//! | named option, container | `--flag a,b` or `--flag a --flag b` |
//! | named option | `--flag v` |
//! | positional | in order, after options |
//! | payload | `--flag '<json>'` |
//! | environment, state, context | not exposed |
//!
//! Clap only splits tokens. It never enforces `required`, applies defaults or
//! reads the environment; those stay with the engine so that every caller
//! gets the same precedence rules.
//!
//! All positional tokens are collected into one list and distributed by the
//! runner, which knows each parameter's arity.
//!
//! Commands and options share a namespace with the root's built-ins, so
//! [`check_surface`] must pass before a descriptor is handed to clap.

use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches, Command};
use thiserror::Error;

use crate::engine::command::CommandDescriptor;
use crate::engine::params::{ParameterDescriptor, RawValue, SourceKind};
use crate::engine::runner::SuppliedTokens;

use super::args;

/// Id of the argument collecting every positional token.
const POSITIONALS: &str = "positionals";

/// Subcommands the root defines itself.
const RESERVED_COMMANDS: &[&str] = &[args::DESCRIBE, "help"];

/// Argument ids and long flags the root or clap already claim.
const RESERVED_OPTIONS: &[&str] = &["config", "debug", "quiet", "help", "version", POSITIONALS];

/// A registered command that cannot be exposed on the command line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("command '{0}' clashes with a built-in subcommand")]
    ReservedCommand(String),

    #[error("option '{parameter}' of command '{command}' clashes with built-in --{reserved}")]
    ReservedOption {
        command: String,
        parameter: String,
        reserved: &'static str,
    },
}

/// Reject descriptors whose names collide with the root's built-ins.
pub fn check_surface(desc: &CommandDescriptor) -> Result<(), SurfaceError> {
    if RESERVED_COMMANDS.contains(&desc.name.as_str()) {
        return Err(SurfaceError::ReservedCommand(desc.name.clone()));
    }

    let options = desc
        .parameters
        .iter()
        .filter(|p| visible(p) && p.source != SourceKind::PositionalArgument);
    for param in options {
        let flag = param.flag();
        if let Some(reserved) = RESERVED_OPTIONS
            .iter()
            .copied()
            .find(|r| *r == param.name || *r == flag)
        {
            return Err(SurfaceError::ReservedOption {
                command: desc.name.clone(),
                parameter: param.name.clone(),
                reserved,
            });
        }
    }
    Ok(())
}

fn visible(param: &ParameterDescriptor) -> bool {
    !param.ty.is_injected() && param.source != SourceKind::EnvironmentVar
}

/// Build the clap subcommand for one descriptor.
pub fn build_command(desc: &CommandDescriptor) -> Command {
    let mut cmd = Command::new(desc.name.clone()).allow_negative_numbers(true);
    if let Some(help) = &desc.help {
        cmd = cmd.about(help.clone());
    }

    let mut positional_names = Vec::new();
    let mut positional_help = Vec::new();

    for param in desc.parameters.iter().filter(|p| visible(p)) {
        if param.source == SourceKind::PositionalArgument {
            positional_names.push(param.name.to_uppercase());
            positional_help.push(match &param.help {
                Some(help) => format!("{}: {help}", param.name),
                None => format!("{} ({})", param.name, param.ty),
            });
            continue;
        }
        cmd = cmd.arg(option_arg(param));
    }

    if !positional_names.is_empty() {
        cmd = cmd.arg(
            Arg::new(POSITIONALS)
                .num_args(1..)
                .value_names(positional_names)
                .action(ArgAction::Append)
                .help(positional_help.join("; ")),
        );
    }

    cmd
}

fn option_arg(param: &ParameterDescriptor) -> Arg {
    let mut arg = Arg::new(param.name.clone())
        .long(param.flag())
        .hide(param.silent);

    arg = if param.is_flag() {
        arg.action(ArgAction::SetTrue)
    } else if param.source == SourceKind::NamedOption && param.ty.is_container() {
        arg.action(ArgAction::Append).value_name(param.ty.to_string())
    } else if param.source == SourceKind::StructuredPayload {
        arg.action(ArgAction::Set).value_name("JSON")
    } else {
        arg.action(ArgAction::Set).value_name(param.ty.to_string())
    };

    if let Some(help) = &param.help {
        arg = arg.help(help.clone());
    }
    arg
}

/// Collect the tokens the user actually typed for `desc`.
pub fn tokens_from_matches(desc: &CommandDescriptor, matches: &ArgMatches) -> SuppliedTokens {
    let mut tokens = SuppliedTokens::new();

    for param in desc.parameters.iter().filter(|p| visible(p)) {
        if param.source == SourceKind::PositionalArgument {
            continue;
        }
        let id = param.name.as_str();
        if matches.value_source(id) != Some(ValueSource::CommandLine) {
            continue;
        }

        if param.is_flag() {
            tokens
                .options
                .insert(param.name.clone(), RawValue::Flag(matches.get_flag(id)));
            continue;
        }

        let values: Vec<String> = matches
            .get_many::<String>(id)
            .map(|v| v.cloned().collect())
            .unwrap_or_default();

        match param.source {
            SourceKind::StructuredPayload => {
                if let Some(text) = values.into_iter().last() {
                    tokens.payloads.insert(param.name.clone(), text);
                }
            }
            _ if param.ty.is_container() && values.len() > 1 => {
                tokens.options.insert(param.name.clone(), RawValue::Many(values));
            }
            _ => {
                if let Some(value) = values.into_iter().last() {
                    tokens.options.insert(param.name.clone(), RawValue::Single(value));
                }
            }
        }
    }

    if let Some(values) = matches.try_get_many::<String>(POSITIONALS).ok().flatten() {
        tokens.positionals = values.cloned().collect();
    }

    tokens
}
