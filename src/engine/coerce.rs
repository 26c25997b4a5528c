//! engine::coerce
//!
//! Conversion of raw tokens into typed values.
//!
//! # Rules
//!
//! Applied by declared shape:
//!
//! 1. Optional and union types try each alternative left to right and keep
//!    the first success. An optional falls back to `null` when the token is
//!    one of the none sentinels (`none`, `null`, empty).
//! 2. Fixed tuples coerce token `i` against item `i`; the token count must
//!    match the arity exactly.
//! 3. Lists, sets, frozen sets and homogeneous tuples coerce every token
//!    against the element type. Sets deduplicate by value equality.
//! 4. Mappings take `key=value` tokens, split on the first `=`. A later
//!    duplicate key overwrites the earlier value.
//! 5. Scalars are converted directly.
//!
//! Container tokens come either from several command-line tokens, taken
//! verbatim, or from one bare token split on the configured delimiter (`,`
//! unless configured) with each piece trimmed.
//!
//! # Invariants
//!
//! - Coercion is pure: the same raw value and type always give the same
//!   result or the same error
//! - Records, tagged unions and state classes are never built from tokens

use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;
use uuid::Uuid;

use super::params::RawValue;
use crate::core::typespec::TypeSpec;
use crate::core::value::{EnumValue, Value};

/// Tokens accepted as boolean true (case-insensitive).
pub const TRUE_TOKENS: &[&str] = &["true", "1", "yes", "on"];

/// Tokens accepted as boolean false (case-insensitive).
pub const FALSE_TOKENS: &[&str] = &["false", "0", "no", "off"];

/// Tokens an optional type accepts as "no value" (case-insensitive).
pub const NONE_TOKENS: &[&str] = &["none", "null", ""];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
];

/// A token could not be converted to its declared type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot convert '{token}' to {target}: {reason}")]
pub struct ConversionError {
    /// The offending token (or token list, joined).
    pub token: String,
    /// Display form of the target type.
    pub target: String,
    pub reason: String,
}

impl ConversionError {
    pub fn new(token: impl Into<String>, target: &TypeSpec, reason: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            target: target.to_string(),
            reason: reason.into(),
        }
    }
}

/// Token-to-value converter.
///
/// # Example
///
/// ```
/// use lectern::core::typespec::TypeSpec;
/// use lectern::core::value::Value;
/// use lectern::engine::coerce::Coercer;
/// use lectern::engine::params::RawValue;
///
/// let coercer = Coercer::default();
/// let ty = TypeSpec::Tuple(vec![TypeSpec::Text, TypeSpec::Integer, TypeSpec::Float]);
/// let value = coercer.coerce(&RawValue::from(vec!["a", "1", "2.5"]), &ty).unwrap();
///
/// assert_eq!(
///     value,
///     Value::Tuple(vec![Value::text("a"), Value::Int(1), Value::Float(2.5)])
/// );
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coercer {
    delimiter: char,
}

impl Default for Coercer {
    fn default() -> Self {
        Self { delimiter: ',' }
    }
}

impl Coercer {
    pub fn new(delimiter: char) -> Self {
        Self { delimiter }
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    /// Convert `raw` into a value of type `ty`.
    ///
    /// A missing raw value becomes the empty value of the type: an empty
    /// container, `false` for booleans, `null` otherwise.
    pub fn coerce(&self, raw: &RawValue, ty: &TypeSpec) -> Result<Value, ConversionError> {
        if raw.is_missing() {
            return Ok(empty_value(ty));
        }

        match ty {
            TypeSpec::Optional(inner) => self.coerce_optional(raw, ty, inner),
            TypeSpec::Union(alternatives) => self.coerce_union(raw, ty, alternatives),
            TypeSpec::Tuple(items) => self.coerce_tuple(raw, ty, items),
            TypeSpec::List(inner) => Ok(Value::List(self.coerce_each(raw, inner)?)),
            TypeSpec::VarTuple(inner) => Ok(Value::Tuple(self.coerce_each(raw, inner)?)),
            TypeSpec::Set(inner) => Ok(Value::Set(dedup(self.coerce_each(raw, inner)?))),
            TypeSpec::FrozenSet(inner) => {
                Ok(Value::FrozenSet(dedup(self.coerce_each(raw, inner)?)))
            }
            TypeSpec::Map(key, value) => self.coerce_map(raw, key, value),
            TypeSpec::Record(_) | TypeSpec::Tagged(_) => Err(ConversionError::new(
                display_raw(raw),
                ty,
                "structured types must be supplied as a payload",
            )),
            TypeSpec::State(_) | TypeSpec::Context => Err(ConversionError::new(
                display_raw(raw),
                ty,
                "injected by the runner, not parsed",
            )),
            _ => {
                let token = self.single_token(raw, ty)?;
                self.scalar(&token, ty)
            }
        }
    }

    /// Split a raw value into element tokens.
    ///
    /// A bare token is split on the delimiter and each piece trimmed; an
    /// empty bare token yields no elements. A token list is taken as is.
    pub fn tokens(&self, raw: &RawValue) -> Vec<String> {
        match raw {
            RawValue::Missing => Vec::new(),
            RawValue::Flag(b) => vec![b.to_string()],
            RawValue::Single(s) => self.split(s),
            RawValue::Many(items) => items.clone(),
        }
    }

    fn split(&self, token: &str) -> Vec<String> {
        if token.is_empty() {
            return Vec::new();
        }
        token
            .split(self.delimiter)
            .map(|piece| piece.trim().to_string())
            .collect()
    }

    fn single_token(&self, raw: &RawValue, ty: &TypeSpec) -> Result<String, ConversionError> {
        match raw {
            RawValue::Single(s) => Ok(s.clone()),
            RawValue::Flag(b) => Ok(b.to_string()),
            RawValue::Many(items) if items.len() == 1 => Ok(items[0].clone()),
            RawValue::Many(items) => Err(ConversionError::new(
                items.join(" "),
                ty,
                format!("expected a single value, got {}", items.len()),
            )),
            RawValue::Missing => Ok(String::new()),
        }
    }

    fn coerce_optional(
        &self,
        raw: &RawValue,
        ty: &TypeSpec,
        inner: &TypeSpec,
    ) -> Result<Value, ConversionError> {
        match self.coerce(raw, inner) {
            Ok(value) => Ok(value),
            Err(err) => match raw {
                RawValue::Single(s) if is_none_token(s) => Ok(Value::Null),
                RawValue::Many(items) if items.is_empty() => Ok(Value::Null),
                RawValue::Many(items) if items.len() == 1 && is_none_token(&items[0]) => {
                    Ok(Value::Null)
                }
                _ => Err(ConversionError {
                    target: ty.to_string(),
                    ..err
                }),
            },
        }
    }

    fn coerce_union(
        &self,
        raw: &RawValue,
        ty: &TypeSpec,
        alternatives: &[TypeSpec],
    ) -> Result<Value, ConversionError> {
        let mut last = ConversionError::new(display_raw(raw), ty, "union has no alternatives");
        for alt in alternatives {
            match self.coerce(raw, alt) {
                Ok(value) => return Ok(value),
                Err(err) => last = err,
            }
        }
        Err(last)
    }

    fn coerce_tuple(
        &self,
        raw: &RawValue,
        ty: &TypeSpec,
        items: &[TypeSpec],
    ) -> Result<Value, ConversionError> {
        let tokens = self.tokens(raw);
        if tokens.len() != items.len() {
            return Err(ConversionError::new(
                tokens.join(" "),
                ty,
                format!("expected {} values, got {}", items.len(), tokens.len()),
            ));
        }

        tokens
            .iter()
            .zip(items)
            .map(|(token, item)| self.element(token, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Tuple)
    }

    fn coerce_each(&self, raw: &RawValue, inner: &TypeSpec) -> Result<Vec<Value>, ConversionError> {
        self.tokens(raw)
            .iter()
            .map(|token| self.element(token, inner))
            .collect()
    }

    fn coerce_map(
        &self,
        raw: &RawValue,
        key_ty: &TypeSpec,
        value_ty: &TypeSpec,
    ) -> Result<Value, ConversionError> {
        let mut entries: Vec<(Value, Value)> = Vec::new();
        for token in self.tokens(raw) {
            let Some((k, v)) = token.split_once('=') else {
                return Err(ConversionError::new(
                    token.as_str(),
                    &TypeSpec::map(key_ty.clone(), value_ty.clone()),
                    "expected key=value",
                ));
            };
            let key = self.element(k, key_ty)?;
            let value = self.element(v, value_ty)?;
            upsert(&mut entries, key, value);
        }
        Ok(Value::Map(entries))
    }

    fn element(&self, token: &str, ty: &TypeSpec) -> Result<Value, ConversionError> {
        if ty.is_container() {
            return Err(ConversionError::new(
                token,
                ty,
                "nested containers cannot be built from tokens",
            ));
        }
        self.coerce(&RawValue::Single(token.to_string()), ty)
    }

    /// Convert one token to a scalar type.
    pub fn scalar(&self, token: &str, ty: &TypeSpec) -> Result<Value, ConversionError> {
        let fail = |reason: String| ConversionError::new(token, ty, reason);

        match ty {
            TypeSpec::Text => Ok(Value::Text(token.to_string())),
            TypeSpec::Integer => token
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|e| fail(e.to_string())),
            TypeSpec::Float => token
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|e| fail(e.to_string())),
            TypeSpec::Bool => parse_bool(token)
                .map(Value::Bool)
                .ok_or_else(|| fail(format!("expected one of {}", bool_choices()))),
            TypeSpec::Path => {
                if token.is_empty() {
                    Err(fail("empty path".to_string()))
                } else {
                    Ok(Value::Path(token.into()))
                }
            }
            TypeSpec::Uuid => Uuid::parse_str(token.trim())
                .map(Value::Uuid)
                .map_err(|e| fail(e.to_string())),
            TypeSpec::Date => NaiveDate::parse_from_str(token.trim(), "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|e| fail(e.to_string())),
            TypeSpec::DateTime => parse_datetime(token.trim())
                .map(Value::DateTime)
                .ok_or_else(|| fail("expected YYYY-MM-DD[THH:MM:SS]".to_string())),
            TypeSpec::Json => serde_json::from_str(token)
                .map(Value::Json)
                .map_err(|e| fail(e.to_string())),
            TypeSpec::Enum(spec) => {
                if spec.accepts(token) {
                    Ok(Value::Enum(EnumValue {
                        enum_name: spec.name.clone(),
                        choice: token.to_string(),
                    }))
                } else {
                    Err(fail(format!("expected one of {}", spec.choices.join(", "))))
                }
            }
            other => self.coerce(&RawValue::Single(token.to_string()), other),
        }
    }
}

/// Serialize a value back into the tokens that would coerce to it.
///
/// The tokens are meant to be passed as a list ([`RawValue::Many`]), which
/// is never split. Returns `None` for values that have no token form
/// (records, state, nested containers, mapping keys containing `=`).
pub fn to_tokens(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::List(items) | Value::Tuple(items) | Value::Set(items) | Value::FrozenSet(items) => {
            items.iter().map(scalar_token).collect()
        }
        Value::Map(entries) => entries
            .iter()
            .map(|(k, v)| {
                let key = scalar_token(k).filter(|key| !key.contains('='))?;
                Some(format!("{}={}", key, scalar_token(v)?))
            })
            .collect(),
        other => scalar_token(other).map(|t| vec![t]),
    }
}

fn scalar_token(value: &Value) -> Option<String> {
    match value {
        Value::Null
        | Value::List(_)
        | Value::Tuple(_)
        | Value::Set(_)
        | Value::FrozenSet(_)
        | Value::Map(_)
        | Value::Record(_)
        | Value::Variant(_)
        | Value::State(_)
        | Value::Context(_) => None,
        other => Some(other.to_string()),
    }
}

/// The value an absent optional parameter receives.
pub fn empty_value(ty: &TypeSpec) -> Value {
    match ty {
        TypeSpec::Bool => Value::Bool(false),
        TypeSpec::List(_) => Value::List(Vec::new()),
        TypeSpec::VarTuple(_) => Value::Tuple(Vec::new()),
        TypeSpec::Set(_) => Value::Set(Vec::new()),
        TypeSpec::FrozenSet(_) => Value::FrozenSet(Vec::new()),
        TypeSpec::Map(_, _) => Value::Map(Vec::new()),
        _ => Value::Null,
    }
}

/// Insert into mapping entries, replacing the value of an equal key.
pub(crate) fn upsert(entries: &mut Vec<(Value, Value)>, key: Value, value: Value) {
    match entries.iter_mut().find(|(existing, _)| *existing == key) {
        Some(slot) => slot.1 = value,
        None => entries.push((key, value)),
    }
}

pub(crate) fn dedup(values: Vec<Value>) -> Vec<Value> {
    let mut unique: Vec<Value> = Vec::with_capacity(values.len());
    for value in values {
        if !unique.contains(&value) {
            unique.push(value);
        }
    }
    unique
}

fn parse_bool(token: &str) -> Option<bool> {
    let lowered = token.trim().to_ascii_lowercase();
    if TRUE_TOKENS.contains(&lowered.as_str()) {
        Some(true)
    } else if FALSE_TOKENS.contains(&lowered.as_str()) {
        Some(false)
    } else {
        None
    }
}

fn bool_choices() -> String {
    TRUE_TOKENS
        .iter()
        .chain(FALSE_TOKENS)
        .copied()
        .collect::<Vec<_>>()
        .join(", ")
}

fn is_none_token(token: &str) -> bool {
    NONE_TOKENS.contains(&token.trim().to_ascii_lowercase().as_str())
}

fn parse_datetime(token: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(token, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(token, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn display_raw(raw: &RawValue) -> String {
    match raw {
        RawValue::Missing => String::new(),
        RawValue::Flag(b) => b.to_string(),
        RawValue::Single(s) => s.clone(),
        RawValue::Many(items) => items.join(" "),
    }
}
