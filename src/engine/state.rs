//! engine::state
//!
//! Process-lifetime singletons injected into command parameters.
//!
//! # Lifecycle
//!
//! ```text
//! register (class only) -> first get_instance (construct + cache) -> shared until reset
//! ```
//!
//! A parameter whose declared type is a registered state class is never
//! resolved from tokens; it receives the cached instance. Mutations through
//! that handle are visible to every later invocation in the process.
//!
//! # Invariants
//!
//! - At most one instance per class exists at a time
//! - Instantiation happens on first request, never at registration
//! - `reset` forgets both classes and instances
//!
//! # Example
//!
//! ```
//! use lectern::engine::state::StateRegistry;
//!
//! #[derive(Default)]
//! struct Counter {
//!     hits: u32,
//! }
//!
//! let states = StateRegistry::default();
//! states.register::<Counter>();
//!
//! states.instance::<Counter>().unwrap().lock().unwrap().hits += 1;
//! assert_eq!(states.instance::<Counter>().unwrap().lock().unwrap().hits, 1);
//! ```

use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::core::typespec::StateKey;
use crate::core::value::{lock_recovering, SharedState};

type Factory = Arc<dyn Fn() -> SharedState + Send + Sync>;

struct StateEntry {
    key: StateKey,
    factory: Option<Factory>,
    instance: Option<SharedState>,
}

/// Registry of state classes and their lazily created instances.
#[derive(Default)]
pub struct StateRegistry {
    entries: Mutex<Vec<StateEntry>>,
}

impl fmt::Debug for StateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateRegistry")
            .field("classes", &self.classes())
            .finish()
    }
}

impl StateRegistry {
    /// Declare `T` as a state class built from its `Default`.
    ///
    /// Returns `false` if `T` was already registered.
    pub fn register<T: Default + Send + 'static>(&self) -> bool {
        self.register_with(T::default)
    }

    /// Declare `T` as a state class built by `factory`.
    ///
    /// Returns `false` if `T` was already registered.
    pub fn register_with<T, F>(&self, factory: F) -> bool
    where
        T: Send + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let key = StateKey::of::<T>();
        let mut entries = lock_recovering(&self.entries);
        if entries.iter().any(|e| e.key == key) {
            return false;
        }
        entries.push(StateEntry {
            key,
            factory: Some(Arc::new(move || SharedState::new(factory()))),
            instance: None,
        });
        debug!(class = key.name(), "registered state class");
        true
    }

    pub fn is_registered(&self, key: &StateKey) -> bool {
        lock_recovering(&self.entries).iter().any(|e| e.key == *key)
    }

    pub fn is_instantiated(&self, key: &StateKey) -> bool {
        lock_recovering(&self.entries)
            .iter()
            .any(|e| e.key == *key && e.instance.is_some())
    }

    /// The shared instance of a registered class, created on first request.
    ///
    /// Returns `None` if the class is not registered.
    ///
    /// The factory runs without the registry lock held, so it may look up
    /// other state. If another instance was stored meanwhile, that one wins.
    pub fn get_instance(&self, key: &StateKey) -> Option<SharedState> {
        let factory = {
            let entries = lock_recovering(&self.entries);
            let entry = entries.iter().find(|e| e.key == *key)?;
            if let Some(instance) = &entry.instance {
                return Some(instance.clone());
            }
            Arc::clone(entry.factory.as_ref()?)
        };

        debug!(class = key.name(), "instantiating state");
        let built = factory();

        let mut entries = lock_recovering(&self.entries);
        let entry = entries.iter_mut().find(|e| e.key == *key)?;
        Some(entry.instance.get_or_insert(built).clone())
    }

    /// Typed access to the instance of `T`.
    pub fn instance<T: Send + 'static>(&self) -> Option<Arc<Mutex<T>>> {
        self.get_instance(&StateKey::of::<T>())?.downcast::<T>()
    }

    /// Names of the registered classes, in registration order.
    pub fn classes(&self) -> Vec<&'static str> {
        lock_recovering(&self.entries)
            .iter()
            .map(|e| e.key.name())
            .collect()
    }

    /// Substitute the instance of `T`, registering the class if needed.
    pub fn replace_instance<T: Send + 'static>(&self, value: T) {
        let key = StateKey::of::<T>();
        let shared = SharedState::new(value);
        let mut entries = lock_recovering(&self.entries);
        match entries.iter_mut().find(|e| e.key == key) {
            Some(entry) => entry.instance = Some(shared),
            None => entries.push(StateEntry {
                key,
                factory: None,
                instance: Some(shared),
            }),
        }
    }

    /// Forget every class and instance.
    pub fn reset(&self) {
        lock_recovering(&self.entries).clear();
    }
}
