//! cli
//!
//! Command-line interface layer for Lectern.
//!
//! # Responsibilities
//!
//! - Parse global flags and split argv into tokens
//! - Load settings and install the tracing subscriber
//! - Delegate to the engine for resolution and execution
//! - Does NOT coerce values or apply defaults itself
//!
//! # Architecture
//!
//! The CLI layer is thin. Subcommands are generated from the engine's
//! command registry, the matches are turned into
//! [`crate::engine::SuppliedTokens`], and everything after that flows through
//! [`crate::engine::Engine::invoke`].

pub mod args;
pub mod demo;
pub mod parser;

pub use args::{DescribeArgs, GlobalArgs};

use std::ffi::OsString;
use std::sync::PoisonError;

use anyhow::{anyhow, Result};
use clap::FromArgMatches;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::core::config::Config;
use crate::engine::{Coercer, Engine, Environment, ProcessEnv};
use crate::ui::output::{self, Verbosity};

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`. Returns the process
/// exit status.
pub fn run() -> Result<i32> {
    let mut engine = Engine::global()
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    if engine.commands().is_empty() {
        demo::install(&mut engine)?;
    }
    dispatch(&mut engine, std::env::args_os(), &ProcessEnv)
}

/// Parse `argv` against `engine`'s commands and run the selected one.
pub fn dispatch<I, T>(engine: &mut Engine, argv: I, env: &dyn Environment) -> Result<i32>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    for desc in engine.commands().iter() {
        parser::check_surface(desc)?;
    }
    let root = engine
        .commands()
        .iter()
        .fold(args::root(), |root, desc| root.subcommand(parser::build_command(desc)));

    let matches = match root.try_get_matches_from(argv) {
        Ok(matches) => matches,
        Err(err) => {
            err.print()?;
            return Ok(err.exit_code());
        }
    };

    let globals = GlobalArgs::from_arg_matches(&matches)?;
    let config = Config::load(globals.config.as_deref())?;
    init_tracing(&config, globals.debug);
    if let Some(path) = config.loaded_from() {
        debug!(path = %path.display(), "loaded settings");
    }

    let verbosity = Verbosity::from_flags(globals.quiet || config.quiet(), globals.debug);
    engine
        .encoders_mut()
        .set_coercer(Coercer::new(config.list_delimiter()));

    let (name, sub) = matches
        .subcommand()
        .ok_or_else(|| anyhow!("no command given"))?;

    if name == args::DESCRIBE {
        return describe(engine, &DescribeArgs::from_arg_matches(sub)?);
    }

    let desc = engine
        .commands()
        .get(name)
        .ok_or_else(|| anyhow!("unknown command '{name}'"))?;
    let tokens = parser::tokens_from_matches(&desc, sub).program(args::PROGRAM);

    match engine.invoke(name, &tokens, env) {
        Ok(outcome) => {
            if let Some(text) = output::render_result(&outcome.result, engine.encoders())? {
                output::print(text, verbosity);
            }
            Ok(outcome.exit_status())
        }
        Err(err) => {
            output::error(&err);
            Ok(err.exit_code())
        }
    }
}

fn describe(engine: &Engine, args: &DescribeArgs) -> Result<i32> {
    let infos = match &args.command {
        Some(name) => {
            let Some(info) = engine.describe(name) else {
                output::error(format!("unknown command '{name}'"));
                return Ok(crate::engine::runner::EXIT_USAGE);
            };
            vec![info]
        }
        None => engine
            .commands()
            .names()
            .into_iter()
            .filter_map(|name| engine.describe(name))
            .collect(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
    } else if args.command.is_some() {
        for info in &infos {
            println!("{}", output::format_command(info));
        }
    } else {
        println!("{}", output::format_command_list(&infos));
    }
    Ok(crate::engine::runner::EXIT_SUCCESS)
}

/// Install the stderr subscriber.
///
/// `RUST_LOG` wins over the settings file; `--debug` wins over both.
/// A second call is a no-op.
fn init_tracing(config: &Config, debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_filter()))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
