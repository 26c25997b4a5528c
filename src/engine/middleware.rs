//! engine::middleware
//!
//! Named hook sets, global hooks, and the per-invocation chain.
//!
//! # Ordering
//!
//! For one invocation the effective chain is:
//!
//! ```text
//! global before -> set before (per referenced set, in listed order) -> callback
//!     -> set after (same order) -> global after
//! ```
//!
//! Hooks within a set, and global hooks, run in registration order.
//!
//! # Failure
//!
//! A failing before-hook aborts the invocation: the callback and every
//! after-hook are skipped. A failing after-hook stops the remaining
//! after-hooks. Both surface as [`MiddlewareAbort`] naming the hook.
//!
//! # Invariants
//!
//! - Hooks run one at a time; a hook starts only after its predecessor
//!   completed, whether or not either suspends
//! - Unknown set names are skipped with a warning, never an error

use std::fmt;
use std::future::{ready, Future};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use super::command::{Arguments, BoxFuture};
use crate::core::value::Value;

type HookFn = dyn Fn(HookContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync;

/// What a hook sees.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub command: String,
    pub args: Arguments,
    /// The callback's result; set for after-hooks only.
    pub result: Option<Value>,
}

/// Which side of the callback a hook runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Before,
    After,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Before => f.write_str("before"),
            Stage::After => f.write_str("after"),
        }
    }
}

/// A hook failed and the chain stopped.
#[derive(Debug, Error)]
#[error("{stage}-hook '{hook}' aborted command '{command}': {source}")]
pub struct MiddlewareAbort {
    pub hook: String,
    pub command: String,
    pub stage: Stage,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

/// A named before/after hook.
#[derive(Clone)]
pub struct Hook {
    name: String,
    run: Arc<HookFn>,
    is_async: bool,
}

impl Hook {
    /// Wrap a synchronous hook.
    pub fn new<F>(name: &str, f: F) -> Self
    where
        F: Fn(&HookContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            run: Arc::new(move |ctx: HookContext| -> BoxFuture<'static, anyhow::Result<()>> {
                Box::pin(ready(f(&ctx)))
            }),
            is_async: false,
        }
    }

    /// Wrap an asynchronous hook.
    pub fn from_async<F, Fut>(name: &str, f: F) -> Self
    where
        F: Fn(HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: name.to_string(),
            run: Arc::new(move |ctx: HookContext| -> BoxFuture<'static, anyhow::Result<()>> {
                Box::pin(f(ctx))
            }),
            is_async: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    pub fn call(&self, ctx: HookContext) -> BoxFuture<'static, anyhow::Result<()>> {
        (self.run)(ctx)
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("is_async", &self.is_async)
            .finish_non_exhaustive()
    }
}

/// A reusable group of hooks.
///
/// # Example
///
/// ```
/// use lectern::engine::middleware::{Hook, MiddlewareSet};
///
/// let audit = MiddlewareSet::new("audit")
///     .before(Hook::new("announce", |ctx| {
///         eprintln!("running {}", ctx.command);
///         Ok(())
///     }))
///     .after(Hook::new("record", |_| Ok(())));
///
/// assert_eq!(audit.before.len(), 1);
/// assert_eq!(audit.after.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MiddlewareSet {
    pub name: String,
    pub before: Vec<Hook>,
    pub after: Vec<Hook>,
}

impl MiddlewareSet {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn before(mut self, hook: Hook) -> Self {
        self.before.push(hook);
        self
    }

    pub fn after(mut self, hook: Hook) -> Self {
        self.after.push(hook);
        self
    }
}

/// A command's reference to a hook set.
#[derive(Debug, Clone)]
pub enum MiddlewareRef {
    /// A set registered by name.
    Named(String),
    /// An anonymous set owned by the command.
    Inline(MiddlewareSet),
}

/// Registered hook sets and global hooks.
#[derive(Debug, Clone, Default)]
pub struct MiddlewareRegistry {
    sets: Vec<MiddlewareSet>,
    global_before: Vec<Hook>,
    global_after: Vec<Hook>,
}

impl MiddlewareRegistry {
    /// Register a set. A set with the same name is replaced in place.
    pub fn register(&mut self, set: MiddlewareSet) {
        match self.sets.iter_mut().find(|s| s.name == set.name) {
            Some(existing) => *existing = set,
            None => self.sets.push(set),
        }
    }

    pub fn add_before_global(&mut self, hook: Hook) {
        self.global_before.push(hook);
    }

    pub fn add_after_global(&mut self, hook: Hook) {
        self.global_after.push(hook);
    }

    pub fn get(&self, name: &str) -> Option<&MiddlewareSet> {
        self.sets.iter().find(|s| s.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.sets.iter().map(|s| s.name.as_str()).collect()
    }

    /// Remove every set and global hook.
    pub fn clear(&mut self) {
        self.sets.clear();
        self.global_before.clear();
        self.global_after.clear();
    }

    /// Compute the effective chain for a command's references.
    pub fn resolve(&self, refs: &[MiddlewareRef]) -> Chain {
        let mut chain = Chain {
            before: self.global_before.clone(),
            after: Vec::new(),
        };

        for reference in refs {
            let set = match reference {
                MiddlewareRef::Named(name) => match self.get(name) {
                    Some(set) => set,
                    None => {
                        warn!(set = %name, "unknown middleware set, skipping");
                        continue;
                    }
                },
                MiddlewareRef::Inline(set) => set,
            };
            chain.before.extend(set.before.iter().cloned());
            chain.after.extend(set.after.iter().cloned());
        }

        chain.after.extend(self.global_after.iter().cloned());
        chain
    }
}

/// The ordered hooks for one invocation.
#[derive(Debug, Clone, Default)]
pub struct Chain {
    before: Vec<Hook>,
    after: Vec<Hook>,
}

impl Chain {
    pub fn before_names(&self) -> Vec<&str> {
        self.before.iter().map(Hook::name).collect()
    }

    pub fn after_names(&self) -> Vec<&str> {
        self.after.iter().map(Hook::name).collect()
    }

    pub async fn run_before(&self, command: &str, args: &Arguments) -> Result<(), MiddlewareAbort> {
        run_hooks(&self.before, Stage::Before, command, args, None).await
    }

    pub async fn run_after(
        &self,
        command: &str,
        args: &Arguments,
        result: &Value,
    ) -> Result<(), MiddlewareAbort> {
        run_hooks(&self.after, Stage::After, command, args, Some(result)).await
    }
}

async fn run_hooks(
    hooks: &[Hook],
    stage: Stage,
    command: &str,
    args: &Arguments,
    result: Option<&Value>,
) -> Result<(), MiddlewareAbort> {
    for hook in hooks {
        debug!(hook = hook.name(), %stage, command, "running hook");
        let ctx = HookContext {
            command: command.to_string(),
            args: args.clone(),
            result: result.cloned(),
        };
        if let Err(e) = hook.call(ctx).await {
            warn!(hook = hook.name(), %stage, command, error = %e, "hook failed");
            return Err(MiddlewareAbort {
                hook: hook.name().to_string(),
                command: command.to_string(),
                stage,
                source: e.into(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::sync::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Hook) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let make = {
            let log = Arc::clone(&log);
            move |name: &str| {
                let log = Arc::clone(&log);
                let label = name.to_string();
                Hook::new(name, move |_| {
                    log.lock().unwrap().push(label.clone());
                    Ok(())
                })
            }
        };
        (log, make)
    }

    mod ordering {
        use super::*;

        #[test]
        fn globals_wrap_sets() {
            let (_, hook) = recorder();
            let mut reg = MiddlewareRegistry::default();
            reg.add_before_global(hook("A"));
            reg.add_after_global(hook("after-global"));
            reg.register(MiddlewareSet::new("s").before(hook("B")).after(hook("after-s")));

            let chain = reg.resolve(&[MiddlewareRef::Named("s".into())]);
            assert_eq!(chain.before_names(), vec!["A", "B"]);
            assert_eq!(chain.after_names(), vec!["after-s", "after-global"]);
        }

        #[test]
        fn sets_in_listed_order() {
            let (_, hook) = recorder();
            let mut reg = MiddlewareRegistry::default();
            reg.register(MiddlewareSet::new("x").before(hook("x1")).before(hook("x2")));
            reg.register(MiddlewareSet::new("y").before(hook("y1")));

            let chain = reg.resolve(&[
                MiddlewareRef::Named("y".into()),
                MiddlewareRef::Inline(MiddlewareSet::new("").before(hook("inline"))),
                MiddlewareRef::Named("x".into()),
            ]);
            assert_eq!(chain.before_names(), vec!["y1", "inline", "x1", "x2"]);
        }

        #[test]
        fn unknown_set_skipped() {
            let (_, hook) = recorder();
            let mut reg = MiddlewareRegistry::default();
            reg.register(MiddlewareSet::new("known").before(hook("k")));
            let chain = reg.resolve(&[
                MiddlewareRef::Named("missing".into()),
                MiddlewareRef::Named("known".into()),
            ]);
            assert_eq!(chain.before_names(), vec!["k"]);
        }

        #[test]
        fn register_replaces_same_name() {
            let (_, hook) = recorder();
            let mut reg = MiddlewareRegistry::default();
            reg.register(MiddlewareSet::new("s").before(hook("old")));
            reg.register(MiddlewareSet::new("s").before(hook("new")));
            assert_eq!(reg.names(), vec!["s"]);
            let chain = reg.resolve(&[MiddlewareRef::Named("s".into())]);
            assert_eq!(chain.before_names(), vec!["new"]);
        }

        #[test]
        fn clear_removes_everything() {
            let (_, hook) = recorder();
            let mut reg = MiddlewareRegistry::default();
            reg.add_before_global(hook("g"));
            reg.register(MiddlewareSet::new("s"));
            reg.clear();
            assert!(reg.names().is_empty());
            assert!(reg.resolve(&[]).before_names().is_empty());
        }
    }

    mod execution {
        use super::*;

        #[tokio::test]
        async fn runs_sequentially_across_conventions() {
            let (log, hook) = recorder();
            let async_log = Arc::clone(&log);
            let mut reg = MiddlewareRegistry::default();
            reg.add_before_global(hook("sync-1"));
            reg.add_before_global(Hook::from_async("async-2", move |_| {
                let log = Arc::clone(&async_log);
                async move {
                    tokio::task::yield_now().await;
                    log.lock().unwrap().push("async-2".to_string());
                    Ok(())
                }
            }));
            reg.add_before_global(hook("sync-3"));

            reg.resolve(&[]).run_before("cmd", &Arguments::new()).await.unwrap();
            assert_eq!(*log.lock().unwrap(), vec!["sync-1", "async-2", "sync-3"]);
        }

        #[tokio::test]
        async fn failure_stops_chain() {
            let (log, hook) = recorder();
            let mut reg = MiddlewareRegistry::default();
            reg.add_before_global(hook("first"));
            reg.add_before_global(Hook::new("guard", |_| bail!("denied")));
            reg.add_before_global(hook("never"));

            let err = reg
                .resolve(&[])
                .run_before("cmd", &Arguments::new())
                .await
                .unwrap_err();
            assert_eq!(err.hook, "guard");
            assert_eq!(err.stage, Stage::Before);
            assert!(err.to_string().contains("denied"));
            assert_eq!(*log.lock().unwrap(), vec!["first"]);
        }

        #[tokio::test]
        async fn after_hooks_see_result() {
            let seen = Arc::new(Mutex::new(None));
            let sink = Arc::clone(&seen);
            let mut reg = MiddlewareRegistry::default();
            reg.add_after_global(Hook::new("capture", move |ctx| {
                *sink.lock().unwrap() = ctx.result.clone();
                Ok(())
            }));

            reg.resolve(&[])
                .run_after("cmd", &Arguments::new(), &Value::Int(7))
                .await
                .unwrap();
            assert_eq!(*seen.lock().unwrap(), Some(Value::Int(7)));
        }
    }
}
