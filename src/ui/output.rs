//! ui::output
//!
//! Output formatting and display.
//!
//! # Design
//!
//! Output is formatted consistently and respects the quiet flag.
//! Command results go to stdout: text is printed as-is, null prints
//! nothing, and everything else is rendered as JSON through the encoder
//! registry. Diagnostics go to stderr.

use std::fmt::Display;

use crate::core::value::Value;
use crate::engine::encoders::{EncodeError, EncoderRegistry};
use crate::engine::{CommandInfo, ParameterInfo};

/// Output verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Quiet mode - minimal output
    Quiet,
    /// Normal mode - standard output
    Normal,
    /// Debug mode - verbose output
    Debug,
}

impl Verbosity {
    /// Create verbosity from flags.
    pub fn from_flags(quiet: bool, debug: bool) -> Self {
        if quiet {
            Verbosity::Quiet
        } else if debug {
            Verbosity::Debug
        } else {
            Verbosity::Normal
        }
    }
}

/// Print a message (respects quiet mode).
pub fn print(message: impl Display, verbosity: Verbosity) {
    if verbosity != Verbosity::Quiet {
        println!("{}", message);
    }
}

/// Print an error message (always shown).
pub fn error(message: impl Display) {
    eprintln!("error: {}", message);
}

/// Print a warning message (respects quiet mode).
pub fn warn(message: impl Display, verbosity: Verbosity) {
    if verbosity != Verbosity::Quiet {
        eprintln!("warning: {}", message);
    }
}

/// Render a command result for stdout.
///
/// Returns `None` when there is nothing to print.
pub fn render_result(value: &Value, encoders: &EncoderRegistry) -> Result<Option<String>, EncodeError> {
    match value {
        Value::Null => Ok(None),
        Value::Text(s) => Ok(Some(s.clone())),
        other => {
            let json = encoders.encode(other)?;
            Ok(Some(
                serde_json::to_string_pretty(&json).unwrap_or_else(|_| json.to_string()),
            ))
        }
    }
}

/// Format a list of items.
pub fn format_list<T: Display>(items: &[T], prefix: &str) -> String {
    items
        .iter()
        .map(|item| format!("{}{}", prefix, item))
        .collect::<Vec<_>>()
        .join("\n")
}

/// One line per command: name and summary.
pub fn format_command_list(commands: &[CommandInfo]) -> String {
    let width = commands.iter().map(|c| c.name.len()).max().unwrap_or(0);
    let lines: Vec<String> = commands
        .iter()
        .map(|c| match &c.help {
            Some(help) => format!("{:width$}  {}", c.name, help),
            None => c.name.clone(),
        })
        .collect();
    format_list(&lines, "  ")
}

fn format_parameter(p: &ParameterInfo) -> String {
    let mut line = match p.source.as_str() {
        "argument" => format!("<{}>", p.name),
        "env" => format!("${}", p.env_var.as_deref().unwrap_or(&p.name)),
        _ => format!("--{}", p.flag),
    };
    line.push_str(&format!(" : {}", p.type_name));
    if p.variadic {
        line.push_str("...");
    }
    if p.required {
        line.push_str(" (required)");
    }
    if let Some(default) = &p.default {
        line.push_str(&format!(" [default: {default}]"));
    }
    if let Some(var) = p.env_var.as_deref().filter(|_| p.source != "env") {
        line.push_str(&format!(" [env: {var}]"));
    }
    if let Some(help) = &p.help {
        line.push_str(&format!("  {help}"));
    }
    line
}

/// Multi-line description of one command.
pub fn format_command(info: &CommandInfo) -> String {
    let mut out = info.name.clone();
    if let Some(help) = &info.help {
        out.push_str(&format!(" - {help}"));
    }
    if info.parameters.is_empty() {
        return out;
    }
    let params: Vec<String> = info.parameters.iter().map(format_parameter).collect();
    out.push('\n');
    out.push_str(&format_list(&params, "  "));
    out
}
