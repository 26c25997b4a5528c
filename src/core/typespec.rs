//! core::typespec
//!
//! Declared parameter types.
//!
//! # Overview
//!
//! A [`TypeSpec`] is the static description of what a parameter expects. It is
//! built once, when a command is registered, and drives every later step:
//! coercion of raw tokens, molding of structured payloads, state injection and
//! the shape of the generated command-line option.
//!
//! # Shapes
//!
//! - Scalars: text, integer, float, boolean, enumeration, path, UUID, date,
//!   timestamp, opaque JSON
//! - Optional and union types
//! - Containers: list, set, frozen set, fixed tuple, homogeneous tuple, mapping
//! - Structured: records (named fields) and tagged unions of records
//! - State classes (resolved by the state registry, never from tokens)
//! - The invocation context (filled in by the runner, never from tokens)

use std::any::{type_name, TypeId};
use std::fmt;

use super::value::Value;

/// A declared parameter type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeSpec {
    Text,
    Integer,
    Float,
    Bool,
    Path,
    Uuid,
    Date,
    DateTime,
    /// Opaque structured value, kept as parsed JSON.
    Json,
    Enum(EnumSpec),
    /// `T` or nothing.
    Optional(Box<TypeSpec>),
    /// First matching alternative, tried left to right.
    Union(Vec<TypeSpec>),
    List(Box<TypeSpec>),
    Set(Box<TypeSpec>),
    FrozenSet(Box<TypeSpec>),
    /// Fixed-arity heterogeneous tuple.
    Tuple(Vec<TypeSpec>),
    /// Homogeneous tuple of any length.
    VarTuple(Box<TypeSpec>),
    Map(Box<TypeSpec>, Box<TypeSpec>),
    Record(RecordSpec),
    Tagged(TaggedSpec),
    State(StateKey),
    /// The running command's name and path.
    Context,
}

impl TypeSpec {
    pub fn optional(inner: TypeSpec) -> Self {
        TypeSpec::Optional(Box::new(inner))
    }

    pub fn list(inner: TypeSpec) -> Self {
        TypeSpec::List(Box::new(inner))
    }

    pub fn set(inner: TypeSpec) -> Self {
        TypeSpec::Set(Box::new(inner))
    }

    pub fn frozen_set(inner: TypeSpec) -> Self {
        TypeSpec::FrozenSet(Box::new(inner))
    }

    pub fn var_tuple(inner: TypeSpec) -> Self {
        TypeSpec::VarTuple(Box::new(inner))
    }

    pub fn map(key: TypeSpec, value: TypeSpec) -> Self {
        TypeSpec::Map(Box::new(key), Box::new(value))
    }

    /// The declared type of a state class `T`.
    pub fn state<T: 'static>() -> Self {
        TypeSpec::State(StateKey::of::<T>())
    }

    /// Whether values of this type are built from several tokens.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            TypeSpec::List(_)
                | TypeSpec::Set(_)
                | TypeSpec::FrozenSet(_)
                | TypeSpec::Tuple(_)
                | TypeSpec::VarTuple(_)
                | TypeSpec::Map(_, _)
        )
    }

    /// Whether a named option of this type behaves as a flag.
    ///
    /// `bool` and `optional<bool>` both qualify.
    pub fn is_flag(&self) -> bool {
        match self {
            TypeSpec::Bool => true,
            TypeSpec::Optional(inner) => matches!(**inner, TypeSpec::Bool),
            _ => false,
        }
    }

    /// Whether this type is a record or tagged union, which can only be
    /// supplied as a structured payload.
    pub fn is_structured(&self) -> bool {
        match self {
            TypeSpec::Record(_) | TypeSpec::Tagged(_) => true,
            TypeSpec::Optional(inner) => inner.is_structured(),
            _ => false,
        }
    }

    /// Whether the runner supplies values of this type itself.
    pub fn is_injected(&self) -> bool {
        matches!(self, TypeSpec::State(_) | TypeSpec::Context)
    }

    /// Number of positional tokens a value of this type occupies, when fixed.
    pub fn fixed_arity(&self) -> Option<usize> {
        match self {
            TypeSpec::Tuple(items) => Some(items.len()),
            t if t.is_container() => None,
            _ => Some(1),
        }
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSpec::Text => f.write_str("text"),
            TypeSpec::Integer => f.write_str("integer"),
            TypeSpec::Float => f.write_str("float"),
            TypeSpec::Bool => f.write_str("boolean"),
            TypeSpec::Path => f.write_str("path"),
            TypeSpec::Uuid => f.write_str("uuid"),
            TypeSpec::Date => f.write_str("date"),
            TypeSpec::DateTime => f.write_str("datetime"),
            TypeSpec::Json => f.write_str("json"),
            TypeSpec::Enum(spec) => write!(f, "{}[{}]", spec.name, spec.choices.join("|")),
            TypeSpec::Optional(inner) => write!(f, "optional<{}>", inner),
            TypeSpec::Union(alts) => {
                f.write_str("union<")?;
                write_joined(f, alts)?;
                f.write_str(">")
            }
            TypeSpec::List(inner) => write!(f, "list<{}>", inner),
            TypeSpec::Set(inner) => write!(f, "set<{}>", inner),
            TypeSpec::FrozenSet(inner) => write!(f, "frozenset<{}>", inner),
            TypeSpec::Tuple(items) => {
                f.write_str("(")?;
                write_joined(f, items)?;
                f.write_str(")")
            }
            TypeSpec::VarTuple(inner) => write!(f, "tuple<{}, ...>", inner),
            TypeSpec::Map(k, v) => write!(f, "mapping<{}, {}>", k, v),
            TypeSpec::Record(spec) => f.write_str(&spec.name),
            TypeSpec::Tagged(spec) => f.write_str(&spec.name),
            TypeSpec::State(key) => write!(f, "state<{}>", key.name()),
            TypeSpec::Context => f.write_str("context"),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[TypeSpec]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

/// A closed set of accepted text values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumSpec {
    pub name: String,
    pub choices: Vec<String>,
}

impl EnumSpec {
    pub fn new<I, S>(name: impl Into<String>, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            choices: choices.into_iter().map(Into::into).collect(),
        }
    }

    pub fn accepts(&self, choice: &str) -> bool {
        self.choices.iter().any(|c| c == choice)
    }
}

/// One named field of a record.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub ty: TypeSpec,
    /// Used when a payload omits the field.
    pub default: Option<Value>,
}

/// A named-field aggregate.
///
/// # Example
///
/// ```
/// use lectern::core::typespec::{RecordSpec, TypeSpec};
/// use lectern::core::value::Value;
///
/// let target = RecordSpec::new("Target")
///     .field("host", TypeSpec::Text)
///     .field_with_default("port", TypeSpec::Integer, Value::Int(22));
///
/// assert_eq!(target.fields.len(), 2);
/// assert!(target.field_spec("port").unwrap().default.is_some());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSpec {
    pub name: String,
    pub fields: Vec<FieldSpec>,
}

impl RecordSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, ty: TypeSpec) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            ty,
            default: None,
        });
        self
    }

    pub fn field_with_default(mut self, name: impl Into<String>, ty: TypeSpec, default: Value) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            ty,
            default: Some(default),
        });
        self
    }

    pub fn field_spec(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A union of records discriminated by a tag field.
///
/// The tag value of each variant is the variant record's name.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedSpec {
    pub name: String,
    pub tag_field: String,
    pub variants: Vec<RecordSpec>,
}

impl TaggedSpec {
    /// Create a tagged union using `"type"` as the tag field.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag_field: "type".to_string(),
            variants: Vec::new(),
        }
    }

    pub fn tag_field(mut self, field: impl Into<String>) -> Self {
        self.tag_field = field.into();
        self
    }

    pub fn variant(mut self, record: RecordSpec) -> Self {
        self.variants.push(record);
        self
    }

    pub fn variant_named(&self, tag: &str) -> Option<&RecordSpec> {
        self.variants.iter().find(|v| v.name == tag)
    }
}

/// Identity of a state class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateKey {
    id: TypeId,
    name: &'static str,
}

impl StateKey {
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// Short type name, without the module path.
    pub fn name(&self) -> &'static str {
        self.name.rsplit("::").next().unwrap_or(self.name)
    }
}
