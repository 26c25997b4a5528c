//! core::value
//!
//! Typed values produced by resolution.
//!
//! # Equality
//!
//! `Value` equality follows the declared shape rather than storage order:
//! sets and frozen sets compare as unordered collections, mappings compare
//! key-by-key regardless of insertion order, and state handles compare by
//! identity. Everything else compares structurally.

use std::any::Any;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use uuid::Uuid;

use super::typespec::StateKey;

/// A resolved, typed value.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Path(PathBuf),
    Uuid(Uuid),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Json(serde_json::Value),
    Enum(EnumValue),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    /// Deduplicated, in first-seen order.
    Set(Vec<Value>),
    /// Deduplicated, in first-seen order.
    FrozenSet(Vec<Value>),
    /// Unique keys, in first-insertion order.
    Map(Vec<(Value, Value)>),
    Record(Record),
    Variant(VariantValue),
    State(SharedState),
    Context(InvocationContext),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            Value::Enum(e) => Some(&e.choice),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Integers widen to floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Elements of any sequence-like container.
    pub fn as_slice(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Tuple(items) | Value::Set(items) | Value::FrozenSet(items) => {
                Some(items)
            }
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            Value::Variant(v) => Some(&v.record),
            _ => None,
        }
    }

    /// Look up a key in a mapping value.
    pub fn map_get(&self, key: &Value) -> Option<&Value> {
        match self {
            Value::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Short name of the value's kind, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Path(_) => "path",
            Value::Uuid(_) => "uuid",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::Json(_) => "json",
            Value::Enum(_) => "enum",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Set(_) => "set",
            Value::FrozenSet(_) => "frozenset",
            Value::Map(_) => "mapping",
            Value::Record(_) => "record",
            Value::Variant(_) => "variant",
            Value::State(_) => "state",
            Value::Context(_) => "context",
        }
    }
}

fn same_members(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().all(|x| b.contains(x))
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Text(a), Text(b)) => a == b,
            (Path(a), Path(b)) => a == b,
            (Uuid(a), Uuid(b)) => a == b,
            (Date(a), Date(b)) => a == b,
            (DateTime(a), DateTime(b)) => a == b,
            (Json(a), Json(b)) => a == b,
            (Enum(a), Enum(b)) => a == b,
            (List(a), List(b)) => a == b,
            (Tuple(a), Tuple(b)) => a == b,
            (Set(a), Set(b)) | (FrozenSet(a), FrozenSet(b)) => same_members(a, b),
            (Map(a), Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.iter().any(|(k2, v2)| k == k2 && v == v2))
            }
            (Record(a), Record(b)) => a == b,
            (Variant(a), Variant(b)) => a == b,
            (State(a), State(b)) => a.ptr_eq(b),
            (Context(a), Context(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => f.write_str(s),
            Value::Path(p) => write!(f, "{}", p.display()),
            Value::Uuid(u) => write!(f, "{}", u),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::DateTime(dt) if dt.nanosecond() == 0 => {
                write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S"))
            }
            Value::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.f")),
            Value::Json(j) => write!(f, "{}", j),
            Value::Enum(e) => f.write_str(&e.choice),
            Value::List(items) | Value::Set(items) | Value::FrozenSet(items) => {
                f.write_str("[")?;
                write_items(f, items)?;
                f.write_str("]")
            }
            Value::Tuple(items) => {
                f.write_str("(")?;
                write_items(f, items)?;
                f.write_str(")")
            }
            Value::Map(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                f.write_str("}")
            }
            Value::Record(r) => write!(f, "{}", r),
            Value::Variant(v) => write!(f, "{}", v.record),
            Value::State(s) => write!(f, "<state {}>", s.key().name()),
            Value::Context(ctx) => f.write_str(&ctx.command_path()),
        }
    }
}

fn write_items(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

/// The command being run, as seen from inside its callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationContext {
    /// Registered name of the command.
    pub command: String,
    /// Program name, when the invocation came through one.
    pub program: Option<String>,
}

impl InvocationContext {
    pub fn new(command: impl Into<String>, program: Option<String>) -> Self {
        Self {
            command: command.into(),
            program,
        }
    }

    /// Program and command joined by a space, e.g. `lectern greet`.
    pub fn command_path(&self) -> String {
        match &self.program {
            Some(program) => format!("{} {}", program, self.command),
            None => self.command.clone(),
        }
    }
}

/// A chosen enumeration member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValue {
    pub enum_name: String,
    pub choice: String,
}

/// A named-field aggregate value.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub type_name: String,
    pub fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Vec::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.push((name.into(), value));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{ ", self.type_name)?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", name, value)?;
        }
        f.write_str(" }")
    }
}

/// One variant of a tagged union.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantValue {
    pub union_name: String,
    pub tag_field: String,
    /// The variant payload; its `type_name` is the tag.
    pub record: Record,
}

impl VariantValue {
    pub fn tag(&self) -> &str {
        &self.record.type_name
    }
}

/// Handle to the single process-lifetime instance of a state class.
///
/// Cloning the handle shares the instance. Two handles are equal only when
/// they point at the same instance.
#[derive(Clone)]
pub struct SharedState {
    key: StateKey,
    handle: Arc<dyn Any + Send + Sync>,
}

impl SharedState {
    pub fn new<T: Send + 'static>(value: T) -> Self {
        Self {
            key: StateKey::of::<T>(),
            handle: Arc::new(Mutex::new(value)),
        }
    }

    pub fn key(&self) -> &StateKey {
        &self.key
    }

    /// Typed access to the shared instance.
    pub fn downcast<T: Send + 'static>(&self) -> Option<Arc<Mutex<T>>> {
        Arc::clone(&self.handle).downcast::<Mutex<T>>().ok()
    }

    /// Run `f` with the instance locked.
    ///
    /// Returns `None` if the handle does not hold a `T`.
    pub fn with<T: Send + 'static, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let cell = self.handle.downcast_ref::<Mutex<T>>()?;
        let mut guard = lock_recovering(cell);
        Some(f(&mut guard))
    }

    pub fn ptr_eq(&self, other: &SharedState) -> bool {
        Arc::ptr_eq(&self.handle, &other.handle)
    }
}

impl fmt::Debug for SharedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedState")
            .field("class", &self.key.name())
            .finish_non_exhaustive()
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock_recovering<T: ?Sized>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
