//! Integration tests for command invocation.
//!
//! These tests drive the full pipeline through [`Engine`]:
//! Resolve → Coerce → Inject → Before hooks → Callback → After hooks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use lectern::core::typespec::{RecordSpec, TypeSpec};
use lectern::core::value::Value;
use lectern::engine::command::{Callback, CommandDescriptor};
use lectern::engine::middleware::{Hook, MiddlewareSet, Stage};
use lectern::engine::params::ParameterDescriptor;
use lectern::engine::runner::{exit_status, SuppliedTokens};
use lectern::engine::{Engine, InvokeError, RegistrationError};

// =============================================================================
// Test Fixtures
// =============================================================================

type Log = Arc<Mutex<Vec<String>>>;

fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn recorder(log: &Log, entry: &str) -> Hook {
    let log = Arc::clone(log);
    let entry = entry.to_string();
    Hook::new(&entry.clone(), move |_| {
        log.lock().unwrap().push(entry.clone());
        Ok(())
    })
}

fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn echo(name: &str) -> Callback {
    let name = name.to_string();
    Callback::new(move |args| Ok(args.get(&name).cloned().unwrap_or(Value::Null)))
}

// =============================================================================
// Precedence
// =============================================================================

mod precedence {
    use super::*;

    fn engine() -> Engine {
        let mut engine = Engine::new();
        engine
            .register_command(
                CommandDescriptor::new("show", echo("n")).param(
                    ParameterDescriptor::option("n", TypeSpec::Integer)
                        .default("3")
                        .env_var("N"),
                ),
            )
            .unwrap();
        engine
    }

    #[test]
    fn default_applies() {
        let outcome = engine().invoke("show", &SuppliedTokens::new(), &env(&[])).unwrap();
        assert_eq!(outcome.result, Value::Int(3));
    }

    #[test]
    fn env_beats_default() {
        let outcome = engine()
            .invoke("show", &SuppliedTokens::new(), &env(&[("N", "7")]))
            .unwrap();
        assert_eq!(outcome.result, Value::Int(7));
    }

    #[test]
    fn token_beats_env() {
        let tokens = SuppliedTokens::new().option("n", "9");
        let outcome = engine().invoke("show", &tokens, &env(&[("N", "7")])).unwrap();
        assert_eq!(outcome.result, Value::Int(9));
    }

    #[test]
    fn missing_required_is_usage_error() {
        let mut engine = Engine::new();
        engine
            .register_command(
                CommandDescriptor::new("need", echo("x"))
                    .param(ParameterDescriptor::argument("x", TypeSpec::Text).required()),
            )
            .unwrap();

        let result = engine.invoke("need", &SuppliedTokens::new(), &env(&[]));
        assert!(matches!(result, Err(InvokeError::MissingValue(_))));
        assert_eq!(exit_status(&result), 2);
    }
}

// =============================================================================
// Silent parameters
// =============================================================================

#[test]
fn silent_parameter_never_reaches_callback() {
    let seen: Log = log();
    let keys = Arc::clone(&seen);

    let mut engine = Engine::new();
    engine
        .register_command(
            CommandDescriptor::new(
                "login",
                Callback::new(move |args| {
                    keys.lock().unwrap().extend(args.keys().map(String::from));
                    Ok(Value::Null)
                }),
            )
            .param(ParameterDescriptor::argument("user", TypeSpec::Text).required())
            .param(
                ParameterDescriptor::option("token", TypeSpec::Integer)
                    .env_var("TOKEN")
                    .silent(),
            ),
        )
        .unwrap();

    let tokens = SuppliedTokens::new().positional("ada").option("token", "42");
    engine.invoke("login", &tokens, &env(&[])).unwrap();
    assert_eq!(*seen.lock().unwrap(), vec!["user".to_string()]);

    // Still validated.
    let bad = SuppliedTokens::new().positional("ada").option("token", "abc");
    let err = engine.invoke("login", &bad, &env(&[])).unwrap_err();
    assert!(matches!(err, InvokeError::Conversion { ref parameter, .. } if parameter == "token"));

    let info = engine.describe("login").unwrap();
    assert!(info.parameters.iter().all(|p| p.name != "token"));
}

// =============================================================================
// Containers
// =============================================================================

mod containers {
    use super::*;

    fn engine() -> Engine {
        let mut engine = Engine::new();
        engine
            .register_command(
                CommandDescriptor::new("point", echo("p")).param(ParameterDescriptor::argument(
                    "p",
                    TypeSpec::Tuple(vec![TypeSpec::Text, TypeSpec::Integer, TypeSpec::Float]),
                )),
            )
            .unwrap();
        engine
            .register_command(
                CommandDescriptor::new("labels", echo("m")).param(ParameterDescriptor::option(
                    "m",
                    TypeSpec::map(TypeSpec::Text, TypeSpec::Integer),
                )),
            )
            .unwrap();
        engine
    }

    #[test]
    fn heterogeneous_tuple() {
        let tokens = SuppliedTokens::new().positionals(["a", "1", "2.5"]);
        let outcome = engine().invoke("point", &tokens, &env(&[])).unwrap();
        assert_eq!(
            outcome.result,
            Value::Tuple(vec![Value::text("a"), Value::Int(1), Value::Float(2.5)])
        );
    }

    #[test]
    fn tuple_arity_mismatch() {
        let tokens = SuppliedTokens::new().positionals(["a", "1"]);
        let result = engine().invoke("point", &tokens, &env(&[]));
        assert!(matches!(result, Err(InvokeError::Conversion { .. })));
        assert_eq!(exit_status(&result), 2);
    }

    #[test]
    fn mapping() {
        let tokens = SuppliedTokens::new().option("m", vec!["k1=1", "k2=2"]);
        let outcome = engine().invoke("labels", &tokens, &env(&[])).unwrap();
        assert_eq!(
            outcome.result,
            Value::Map(vec![
                (Value::text("k2"), Value::Int(2)),
                (Value::text("k1"), Value::Int(1)),
            ])
        );
    }

    #[test]
    fn mapping_without_equals() {
        let tokens = SuppliedTokens::new().option("m", vec!["k1"]);
        let result = engine().invoke("labels", &tokens, &env(&[]));
        assert!(matches!(result, Err(InvokeError::Conversion { .. })));
    }

    #[test]
    fn extra_positionals_rejected() {
        let tokens = SuppliedTokens::new().positionals(["a", "1", "2.5", "extra"]);
        let result = engine().invoke("point", &tokens, &env(&[]));
        assert!(matches!(result, Err(InvokeError::UnexpectedArguments(ref rest)) if rest == &["extra"]));
    }
}

// =============================================================================
// Middleware
// =============================================================================

mod middleware {
    use super::*;

    fn engine(log: &Log, callback: Callback) -> Engine {
        let mut engine = Engine::new();
        engine.add_before_global(recorder(log, "A"));
        engine.add_after_global(recorder(log, "after-global"));
        engine.register_middleware(
            MiddlewareSet::new("s")
                .before(recorder(log, "B"))
                .after(recorder(log, "after-s")),
        );
        engine
            .register_command(CommandDescriptor::new("cmd", callback).middleware("s"))
            .unwrap();
        engine
    }

    fn logging_callback(log: &Log) -> Callback {
        let log = Arc::clone(log);
        Callback::new(move |_| {
            log.lock().unwrap().push("callback".into());
            Ok(Value::Null)
        })
    }

    #[test]
    fn ordering() {
        let log = log();
        let engine = engine(&log, logging_callback(&log));
        engine.invoke("cmd", &SuppliedTokens::new(), &env(&[])).unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["A", "B", "callback", "after-s", "after-global"]
        );
    }

    #[test]
    fn callback_failure_skips_after_hooks() {
        let log = log();
        let engine = engine(&log, Callback::new(|_| anyhow::bail!("boom")));
        let result = engine.invoke("cmd", &SuppliedTokens::new(), &env(&[]));

        assert!(matches!(result, Err(InvokeError::CallbackFailed { .. })));
        assert_eq!(exit_status(&result), 1);
        assert_eq!(*log.lock().unwrap(), vec!["A", "B"]);
    }

    #[test]
    fn before_hook_abort_stops_callback() {
        let log = log();
        let mut engine = engine(&log, logging_callback(&log));
        engine.register_middleware(
            MiddlewareSet::new("s").before(Hook::new("deny", |_| anyhow::bail!("not allowed"))),
        );

        let err = engine
            .invoke("cmd", &SuppliedTokens::new(), &env(&[]))
            .unwrap_err();
        assert!(matches!(err, InvokeError::MiddlewareAbort(ref abort) if abort.hook == "deny"));
        assert_eq!(err.exit_code(), 1);
        assert_eq!(*log.lock().unwrap(), vec!["A"]);
    }

    #[test]
    fn after_hook_abort_stops_later_hooks() {
        let log = log();
        let mut engine = engine(&log, logging_callback(&log));
        engine.register_middleware(
            MiddlewareSet::new("s")
                .after(Hook::new("audit", |_| anyhow::bail!("audit store offline")))
                .after(recorder(&log, "after-s")),
        );

        let result = engine.invoke("cmd", &SuppliedTokens::new(), &env(&[]));
        let Err(InvokeError::MiddlewareAbort(abort)) = &result else {
            panic!("expected a middleware abort, got {result:?}");
        };
        assert_eq!(abort.hook, "audit");
        assert_eq!(abort.stage, Stage::After);
        assert_eq!(exit_status(&result), 1);
        assert_eq!(*log.lock().unwrap(), vec!["A", "callback"]);
    }

    #[test]
    fn unknown_set_is_skipped() {
        let log = log();
        let mut engine = Engine::new();
        engine
            .register_command(
                CommandDescriptor::new("cmd", logging_callback(&log)).middleware("missing"),
            )
            .unwrap();
        engine.invoke("cmd", &SuppliedTokens::new(), &env(&[])).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["callback"]);
    }

    #[test]
    fn hooks_see_resolved_arguments() {
        let seen: Log = log();
        let captured = Arc::clone(&seen);
        let mut engine = Engine::new();
        engine
            .register_command(
                CommandDescriptor::new("cmd", echo("n"))
                    .param(ParameterDescriptor::option("n", TypeSpec::Integer).default("5"))
                    .middleware_inline(MiddlewareSet::new("inline").after(Hook::new(
                        "check",
                        move |ctx| {
                            captured.lock().unwrap().push(format!(
                                "{}:{}:{}",
                                ctx.command,
                                ctx.args.int("n")?,
                                ctx.result.as_ref().map(ToString::to_string).unwrap_or_default()
                            ));
                            Ok(())
                        },
                    ))),
            )
            .unwrap();

        engine.invoke("cmd", &SuppliedTokens::new(), &env(&[])).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["cmd:5:5"]);
    }

    #[tokio::test]
    async fn async_hooks_and_callback() {
        let log = log();
        let mut engine = Engine::new();
        let hook_log = Arc::clone(&log);
        engine.add_before_global(Hook::from_async("slow", move |_| {
            let log = Arc::clone(&hook_log);
            async move {
                tokio::task::yield_now().await;
                log.lock().unwrap().push("slow".to_string());
                Ok::<_, anyhow::Error>(())
            }
        }));
        let body_log = Arc::clone(&log);
        engine
            .register_command(CommandDescriptor::new(
                "cmd",
                Callback::from_async(move |_| {
                    let log = Arc::clone(&body_log);
                    async move {
                        log.lock().unwrap().push("body".to_string());
                        Ok::<_, anyhow::Error>(Value::Int(1))
                    }
                }),
            ))
            .unwrap();

        let outcome = engine
            .invoke_async("cmd", &SuppliedTokens::new(), &env(&[]))
            .await
            .unwrap();
        assert_eq!(outcome.result, Value::Int(1));
        assert_eq!(*log.lock().unwrap(), vec!["slow", "body"]);
    }
}

// =============================================================================
// State
// =============================================================================

mod state {
    use super::*;

    #[derive(Debug, Default)]
    struct Session {
        user: String,
    }

    #[test]
    fn shared_across_commands() {
        let mut engine = Engine::new();
        engine.register_state::<Session>();
        engine
            .register_command(
                CommandDescriptor::new(
                    "login",
                    Callback::new(|args| {
                        let session = args.state::<Session>("session")?;
                        session.lock().unwrap().user = args.text("user")?.to_string();
                        Ok(Value::Null)
                    }),
                )
                .param(ParameterDescriptor::argument("user", TypeSpec::Text).required())
                .param(ParameterDescriptor::state::<Session>("session")),
            )
            .unwrap();
        engine
            .register_command(
                CommandDescriptor::new(
                    "whoami",
                    Callback::new(|args| {
                        let session = args.state::<Session>("s")?;
                        let user = session.lock().unwrap().user.clone();
                        Ok(Value::text(user))
                    }),
                )
                .param(ParameterDescriptor::state::<Session>("s")),
            )
            .unwrap();

        engine
            .invoke("login", &SuppliedTokens::new().positional("ada"), &env(&[]))
            .unwrap();
        let outcome = engine.invoke("whoami", &SuppliedTokens::new(), &env(&[])).unwrap();
        assert_eq!(outcome.result, Value::text("ada"));
    }

    #[test]
    fn context_reaches_callback_and_hooks() {
        let seen = log();
        let captured = Arc::clone(&seen);
        let mut engine = Engine::new();
        engine
            .register_command(
                CommandDescriptor::new(
                    "report",
                    Callback::new(|args| Ok(Value::text(args.context("ctx")?.command.clone()))),
                )
                .param(ParameterDescriptor::context("ctx"))
                .middleware_inline(MiddlewareSet::new("inline").before(Hook::new(
                    "trace",
                    move |ctx| {
                        captured
                            .lock()
                            .unwrap()
                            .push(ctx.args.context("ctx")?.command_path());
                        Ok(())
                    },
                ))),
            )
            .unwrap();

        let tokens = SuppliedTokens::new().program("ops");
        let outcome = engine.invoke("report", &tokens, &env(&[])).unwrap();
        assert_eq!(outcome.result, Value::text("report"));
        assert_eq!(*seen.lock().unwrap(), vec!["ops report"]);
    }

    #[test]
    fn unregistered_class() {
        let mut engine = Engine::new();
        engine
            .register_command(
                CommandDescriptor::new("whoami", Callback::new(|_| Ok(Value::Null)))
                    .param(ParameterDescriptor::state::<Session>("s")),
            )
            .unwrap();
        let err = engine
            .invoke("whoami", &SuppliedTokens::new(), &env(&[]))
            .unwrap_err();
        assert!(matches!(err, InvokeError::UnregisteredState { class: "Session", .. }));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn fake_instance_for_tests() {
        let mut engine = Engine::new();
        engine
            .register_command(
                CommandDescriptor::new(
                    "whoami",
                    Callback::new(|args| {
                        let session = args.state::<Session>("s")?;
                        let user = session.lock().unwrap().user.clone();
                        Ok(Value::text(user))
                    }),
                )
                .param(ParameterDescriptor::state::<Session>("s")),
            )
            .unwrap();
        engine.states().replace_instance(Session {
            user: "fake".into(),
        });
        let outcome = engine.invoke("whoami", &SuppliedTokens::new(), &env(&[])).unwrap();
        assert_eq!(outcome.result, Value::text("fake"));
    }
}

// =============================================================================
// Payloads
// =============================================================================

mod payloads {
    use super::*;

    fn engine() -> Engine {
        let mut engine = Engine::new();
        engine
            .register_command(
                CommandDescriptor::new("deploy", echo("target")).param(
                    ParameterDescriptor::payload(
                        "target",
                        TypeSpec::Record(
                            RecordSpec::new("Target")
                                .field("host", TypeSpec::Text)
                                .field("tags", TypeSpec::list(TypeSpec::Text))
                                .field("note", TypeSpec::optional(TypeSpec::Text)),
                        ),
                    )
                    .required(),
                ),
            )
            .unwrap();
        engine
    }

    #[test]
    fn record_payload() {
        let tokens = SuppliedTokens::new().payload("target", r#"{"host": "db", "tags": ["a", "b"]}"#);
        let outcome = engine().invoke("deploy", &tokens, &env(&[])).unwrap();
        let record = outcome.result.as_record().unwrap();
        assert_eq!(record.get("host"), Some(&Value::text("db")));
        assert_eq!(
            record.get("tags"),
            Some(&Value::List(vec![Value::text("a"), Value::text("b")]))
        );
        assert_eq!(record.get("note"), Some(&Value::Null));
    }

    #[test]
    fn malformed_payload_is_usage_error() {
        let tokens = SuppliedTokens::new().payload("target", "{not json");
        let result = engine().invoke("deploy", &tokens, &env(&[]));
        assert!(matches!(result, Err(InvokeError::Encode { .. })));
        assert_eq!(exit_status(&result), 2);
    }

    #[test]
    fn unknown_payload_key() {
        let tokens = SuppliedTokens::new().payload("other", "{}");
        let result = engine().invoke("deploy", &tokens, &env(&[]));
        assert!(matches!(result, Err(InvokeError::UnknownOption { .. })));
    }
}

// =============================================================================
// Registration
// =============================================================================

mod registration {
    use super::*;

    #[test]
    fn duplicate_command_after_normalization() {
        let mut engine = Engine::new();
        engine
            .register_command(CommandDescriptor::new("dry_run", echo("x")))
            .unwrap();
        let err = engine
            .register_command(CommandDescriptor::new("dry-run", echo("x")))
            .unwrap_err();
        assert!(matches!(err, RegistrationError::DuplicateCommandName { .. }));
    }

    #[test]
    fn duplicate_parameter() {
        let err = Engine::new()
            .register_command(
                CommandDescriptor::new("cmd", echo("x"))
                    .param(ParameterDescriptor::option("x", TypeSpec::Text))
                    .param(ParameterDescriptor::argument("x", TypeSpec::Integer)),
            )
            .unwrap_err();
        assert!(matches!(err, RegistrationError::DuplicateParameterName { .. }));
    }

    #[test]
    fn required_with_default() {
        let err = Engine::new()
            .register_command(
                CommandDescriptor::new("cmd", echo("x"))
                    .param(ParameterDescriptor::option("x", TypeSpec::Text).default("a").required()),
            )
            .unwrap_err();
        assert!(matches!(err, RegistrationError::RequiredWithDefault { .. }));
    }

    #[test]
    fn lookup_is_normalized() {
        let mut engine = Engine::new();
        engine
            .register_command(CommandDescriptor::new("ShowAll", echo("x")))
            .unwrap();
        assert!(engine.commands().get("show-all").is_some());
        assert!(engine.commands().get("show_all").is_some());
    }
}
