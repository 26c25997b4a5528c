//! cli::demo
//!
//! The commands shipped with the `lectern` binary.
//!
//! Each one exercises a different part of the engine so the binary doubles
//! as a smoke test:
//!
//! | Command | Exercises |
//! |---|---|
//! | `greet` | precedence (flag, env, default), silent parameter |
//! | `sum` | variadic positional, async callback |
//! | `tag` | mapping option |
//! | `offset` | tuple positional |
//! | `deploy` | record payload, enum, optional date, env source, middleware |
//! | `count` | injected state |
//! | `area` | tagged union payload |

use tracing::info;

use crate::core::typespec::{EnumSpec, RecordSpec, TaggedSpec, TypeSpec};
use crate::core::value::{Record, Value};
use crate::engine::command::{Callback, CommandDescriptor};
use crate::engine::middleware::{Hook, MiddlewareSet};
use crate::engine::params::ParameterDescriptor;
use crate::engine::{Engine, RegistrationError};

/// Calls handled by `count` in this process.
#[derive(Debug, Default)]
pub struct Counter {
    pub hits: i64,
}

/// Register every bundled command, its middleware and state.
pub fn install(engine: &mut Engine) -> Result<(), RegistrationError> {
    engine.register_state::<Counter>();
    engine.register_middleware(audit());

    engine.register_command(greet())?;
    engine.register_command(sum())?;
    engine.register_command(tag())?;
    engine.register_command(offset())?;
    engine.register_command(deploy())?;
    engine.register_command(count())?;
    engine.register_command(area())?;
    Ok(())
}

fn audit() -> MiddlewareSet {
    MiddlewareSet::new("audit")
        .before(Hook::new("announce", |ctx| {
            info!(command = %ctx.command, args = ctx.args.len(), "starting");
            Ok(())
        }))
        .after(Hook::new("record", |ctx| {
            let status = if ctx.result.is_some() { "ok" } else { "empty" };
            info!(command = %ctx.command, status, "finished");
            Ok(())
        }))
}

fn greet() -> CommandDescriptor {
    CommandDescriptor::new(
        "greet",
        Callback::new(|args| {
            let line = format!("{}, {}!", args.text("greeting")?, args.text("name")?);
            if args.boolean("shout")? {
                Ok(Value::text(line.to_uppercase()))
            } else {
                Ok(Value::text(line))
            }
        }),
    )
    .help("Greet someone")
    .param(
        ParameterDescriptor::argument("name", TypeSpec::Text)
            .required()
            .help("Who to greet"),
    )
    .param(
        ParameterDescriptor::option("greeting", TypeSpec::Text)
            .default("Hello")
            .env_var("LECTERN_GREETING")
            .help("Salutation to use"),
    )
    .param(ParameterDescriptor::option("shout", TypeSpec::Bool).help("Print in capitals"))
    .param(
        ParameterDescriptor::option("token", TypeSpec::optional(TypeSpec::Text))
            .env_var("LECTERN_TOKEN")
            .silent(),
    )
}

fn sum() -> CommandDescriptor {
    CommandDescriptor::new(
        "sum",
        Callback::from_async(|args| async move {
            let total = args
                .get("numbers")
                .and_then(Value::as_slice)
                .unwrap_or_default()
                .iter()
                .filter_map(Value::as_f64)
                .sum::<f64>();
            tokio::task::yield_now().await;
            Ok::<_, anyhow::Error>(Value::Float(total))
        }),
    )
    .help("Add numbers")
    .param(
        ParameterDescriptor::argument("numbers", TypeSpec::list(TypeSpec::Float))
            .variadic()
            .help("Numbers to add"),
    )
}

fn tag() -> CommandDescriptor {
    CommandDescriptor::new(
        "tag",
        Callback::new(|args| Ok(args.get("label").cloned().unwrap_or(Value::Null))),
    )
    .help("Collect key=value labels")
    .param(
        ParameterDescriptor::option("label", TypeSpec::map(TypeSpec::Text, TypeSpec::Integer))
            .help("Label as key=value, repeatable or comma separated"),
    )
}

fn offset() -> CommandDescriptor {
    CommandDescriptor::new(
        "offset",
        Callback::new(|args| {
            let by = args.int("by")?;
            let point = args
                .get("point")
                .and_then(Value::as_slice)
                .unwrap_or_default()
                .iter()
                .filter_map(Value::as_i64)
                .map(|c| Value::Int(c + by))
                .collect();
            Ok(Value::Tuple(point))
        }),
    )
    .help("Shift a point")
    .param(
        ParameterDescriptor::argument("point", TypeSpec::Tuple(vec![TypeSpec::Integer, TypeSpec::Integer]))
            .required()
            .help("x and y"),
    )
    .param(ParameterDescriptor::option("by", TypeSpec::Integer).default("0"))
}

fn deploy() -> CommandDescriptor {
    let target = RecordSpec::new("Target")
        .field("host", TypeSpec::Text)
        .field_with_default("port", TypeSpec::Integer, Value::Int(22));
    let stage = EnumSpec::new("Stage", ["dev", "staging", "prod"]);

    CommandDescriptor::new(
        "deploy",
        Callback::new(|args| {
            let mut record = Record::new("Deployment");
            for (name, value) in args.iter() {
                record = record.with(name, value.clone());
            }
            Ok(Value::Record(record))
        }),
    )
    .help("Plan a deployment")
    .param(
        ParameterDescriptor::payload("target", TypeSpec::Record(target))
            .required()
            .help("Target as JSON"),
    )
    .param(
        ParameterDescriptor::option("stage", TypeSpec::Enum(stage))
            .default("dev")
            .help("Release stage"),
    )
    .param(ParameterDescriptor::option("when", TypeSpec::optional(TypeSpec::Date)).help("Scheduled date"))
    .param(ParameterDescriptor::env("region", TypeSpec::Text, "LECTERN_REGION").default("local"))
    .param(ParameterDescriptor::context("invoked_as"))
    .middleware("audit")
}

fn count() -> CommandDescriptor {
    CommandDescriptor::new(
        "count",
        Callback::new(|args| {
            let by = args.int("by")?;
            let counter = args.state::<Counter>("counter")?;
            let mut counter = counter
                .lock()
                .map_err(|_| anyhow::anyhow!("counter state is poisoned"))?;
            counter.hits += by;
            Ok(Value::Int(counter.hits))
        }),
    )
    .help("Increment the process counter")
    .param(ParameterDescriptor::option("by", TypeSpec::Integer).default("1"))
    .param(ParameterDescriptor::state::<Counter>("counter"))
}

fn area() -> CommandDescriptor {
    let shape = TaggedSpec::new("Shape")
        .variant(RecordSpec::new("circle").field("radius", TypeSpec::Float))
        .variant(RecordSpec::new("square").field("side", TypeSpec::Float));

    CommandDescriptor::new(
        "area",
        Callback::new(|args| {
            let Some(Value::Variant(shape)) = args.get("shape") else {
                anyhow::bail!("shape is required");
            };
            let dimension = |field: &str| {
                shape
                    .record
                    .get(field)
                    .and_then(Value::as_f64)
                    .ok_or_else(|| anyhow::anyhow!("{} is missing {field}", shape.tag()))
            };
            let area = match shape.tag() {
                "circle" => std::f64::consts::PI * dimension("radius")?.powi(2),
                _ => dimension("side")?.powi(2),
            };
            Ok(Value::Float(area))
        }),
    )
    .help("Compute the area of a shape")
    .param(
        ParameterDescriptor::payload("shape", TypeSpec::Tagged(shape))
            .required()
            .help(r#"Shape as JSON, e.g. {"type": "circle", "radius": 1}"#),
    )
}
