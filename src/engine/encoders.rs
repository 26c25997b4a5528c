//! engine::encoders
//!
//! Capability-matched encoders for structured payloads.
//!
//! # Architecture
//!
//! A structured payload is JSON text supplied as a single argument. Decoding
//! parses it into a generic tree, then scans the registered [`Encoder`]s in
//! order and hands the tree to the first one whose
//! [`Encoder::is_type_structure`] accepts the declared type. Encoding scans
//! with [`Encoder::is_type`] against the value instead.
//!
//! Encoders recurse through the registry for nested fields, so a user encoder
//! for one record shape is picked up wherever that shape appears. Scalar
//! leaves are converted by the [`Coercer`].
//!
//! # Ordering
//!
//! ```text
//! [user entries, in registration order] [record] [tagged] [path] [datetime] [container] [scalar]
//! ```
//!
//! User entries always come before the built-ins, so registering an encoder
//! overrides built-in matching for whatever it claims.
//!
//! # Example
//!
//! ```
//! use lectern::core::typespec::{RecordSpec, TypeSpec};
//! use lectern::core::value::Value;
//! use lectern::engine::encoders::EncoderRegistry;
//!
//! let registry = EncoderRegistry::new();
//! let ty = TypeSpec::Record(
//!     RecordSpec::new("Target")
//!         .field("host", TypeSpec::Text)
//!         .field_with_default("port", TypeSpec::Integer, Value::Int(22)),
//! );
//!
//! let value = registry.decode(r#"{"host": "db1"}"#, &ty).unwrap();
//! let record = value.as_record().unwrap();
//! assert_eq!(record.get("port"), Some(&Value::Int(22)));
//! ```

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value as Json};
use thiserror::Error;
use tracing::debug;

use super::coerce::{dedup, upsert, Coercer, ConversionError};
use crate::core::typespec::{RecordSpec, TaggedSpec, TypeSpec};
use crate::core::value::{Record, Value, VariantValue};

/// Errors from payload encoding and decoding.
#[derive(Debug, Error, PartialEq)]
pub enum EncodeError {
    #[error("no encoder matches {subject}")]
    NoMatchingEncoder { subject: String },

    #[error("invalid structured payload: {reason}")]
    InvalidPayload { reason: String },

    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

/// A serialize/mold pair selected by capability.
///
/// `is_type` and `is_type_structure` must be cheap and side-effect free;
/// they are called for every lookup.
pub trait Encoder: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Whether this encoder can serialize `value`.
    fn is_type(&self, value: &Value) -> bool;

    /// Whether this encoder can mold payloads into `ty`.
    fn is_type_structure(&self, ty: &TypeSpec) -> bool;

    fn serialize(&self, value: &Value, registry: &EncoderRegistry) -> Result<Json, EncodeError>;

    fn mold(&self, ty: &TypeSpec, payload: &Json, registry: &EncoderRegistry)
        -> Result<Value, EncodeError>;
}

/// Ordered encoder table.
#[derive(Clone)]
pub struct EncoderRegistry {
    entries: Vec<Arc<dyn Encoder>>,
    user_count: usize,
    coercer: Coercer,
}

impl Default for EncoderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EncoderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncoderRegistry")
            .field("entries", &self.names())
            .field("user_count", &self.user_count)
            .finish()
    }
}

impl EncoderRegistry {
    /// A registry holding only the built-in encoders.
    pub fn new() -> Self {
        Self::with_coercer(Coercer::default())
    }

    pub fn with_coercer(coercer: Coercer) -> Self {
        Self {
            entries: vec![
                Arc::new(RecordEncoder),
                Arc::new(TaggedEncoder),
                Arc::new(PathEncoder),
                Arc::new(DateTimeEncoder),
                Arc::new(ContainerEncoder),
                Arc::new(ScalarEncoder),
            ],
            user_count: 0,
            coercer,
        }
    }

    pub fn coercer(&self) -> &Coercer {
        &self.coercer
    }

    pub fn set_coercer(&mut self, coercer: Coercer) {
        self.coercer = coercer;
    }

    /// Add a user encoder after earlier user encoders and before the
    /// built-ins.
    pub fn register<E: Encoder + 'static>(&mut self, encoder: E) {
        self.entries.insert(self.user_count, Arc::new(encoder));
        self.user_count += 1;
    }

    /// Add a user encoder ahead of every other entry.
    pub fn register_first<E: Encoder + 'static>(&mut self, encoder: E) {
        self.entries.insert(0, Arc::new(encoder));
        self.user_count += 1;
    }

    /// Encoder names in lookup order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name()).collect()
    }

    fn for_structure(&self, ty: &TypeSpec) -> Option<&dyn Encoder> {
        self.entries
            .iter()
            .find(|e| e.is_type_structure(ty))
            .map(|e| &**e)
    }

    fn for_value(&self, value: &Value) -> Option<&dyn Encoder> {
        self.entries
            .iter()
            .find(|e| e.is_type(value))
            .map(|e| &**e)
    }

    /// Parse payload text and mold it into `ty`.
    pub fn decode(&self, text: &str, ty: &TypeSpec) -> Result<Value, EncodeError> {
        let tree: Json = serde_json::from_str(text).map_err(|e| EncodeError::InvalidPayload {
            reason: e.to_string(),
        })?;
        self.mold(ty, &tree)
    }

    /// Mold a parsed payload tree into `ty`.
    pub fn mold(&self, ty: &TypeSpec, payload: &Json) -> Result<Value, EncodeError> {
        let encoder = self
            .for_structure(ty)
            .ok_or_else(|| EncodeError::NoMatchingEncoder {
                subject: ty.to_string(),
            })?;
        debug!(encoder = encoder.name(), target = %ty, "molding payload");
        encoder.mold(ty, payload, self)
    }

    /// Serialize a value to a payload tree.
    pub fn encode(&self, value: &Value) -> Result<Json, EncodeError> {
        let encoder = self
            .for_value(value)
            .ok_or_else(|| EncodeError::NoMatchingEncoder {
                subject: value.kind().to_string(),
            })?;
        encoder.serialize(value, self)
    }
}

fn mismatch(payload: &Json, ty: &TypeSpec, expected: &str) -> EncodeError {
    EncodeError::Conversion(ConversionError::new(
        payload.to_string(),
        ty,
        format!("expected {}", expected),
    ))
}

fn mold_fields(
    spec: &RecordSpec,
    ty: &TypeSpec,
    object: &Map<String, Json>,
    skip: Option<&str>,
    registry: &EncoderRegistry,
) -> Result<Record, EncodeError> {
    if let Some(unknown) = object
        .keys()
        .find(|k| Some(k.as_str()) != skip && spec.field_spec(k).is_none())
    {
        return Err(EncodeError::Conversion(ConversionError::new(
            unknown.as_str(),
            ty,
            format!("unknown field '{}'", unknown),
        )));
    }

    let mut record = Record::new(spec.name.clone());
    for field in &spec.fields {
        let value = match object.get(&field.name) {
            Some(payload) => registry.mold(&field.ty, payload)?,
            None => match (&field.default, &field.ty) {
                (Some(default), _) => default.clone(),
                (None, TypeSpec::Optional(_)) => Value::Null,
                (None, _) => {
                    return Err(EncodeError::Conversion(ConversionError::new(
                        "",
                        ty,
                        format!("missing field '{}'", field.name),
                    )))
                }
            },
        };
        record.fields.push((field.name.clone(), value));
    }
    Ok(record)
}

fn serialize_fields(record: &Record, registry: &EncoderRegistry) -> Result<Map<String, Json>, EncodeError> {
    let mut object = Map::new();
    for (name, value) in &record.fields {
        object.insert(name.clone(), registry.encode(value)?);
    }
    Ok(object)
}

// =============================================================================
// Built-in encoders
// =============================================================================

/// Named-field records.
struct RecordEncoder;

impl Encoder for RecordEncoder {
    fn name(&self) -> &str {
        "record"
    }

    fn is_type(&self, value: &Value) -> bool {
        matches!(value, Value::Record(_))
    }

    fn is_type_structure(&self, ty: &TypeSpec) -> bool {
        matches!(ty, TypeSpec::Record(_))
    }

    fn serialize(&self, value: &Value, registry: &EncoderRegistry) -> Result<Json, EncodeError> {
        match value {
            Value::Record(record) => Ok(Json::Object(serialize_fields(record, registry)?)),
            other => Err(EncodeError::NoMatchingEncoder {
                subject: other.kind().to_string(),
            }),
        }
    }

    fn mold(&self, ty: &TypeSpec, payload: &Json, registry: &EncoderRegistry) -> Result<Value, EncodeError> {
        let TypeSpec::Record(spec) = ty else {
            return Err(EncodeError::NoMatchingEncoder {
                subject: ty.to_string(),
            });
        };
        let object = payload.as_object().ok_or_else(|| mismatch(payload, ty, "an object"))?;
        Ok(Value::Record(mold_fields(spec, ty, object, None, registry)?))
    }
}

/// Tagged unions of records.
struct TaggedEncoder;

impl TaggedEncoder {
    fn variant<'a>(spec: &'a TaggedSpec, ty: &TypeSpec, object: &Map<String, Json>) -> Result<&'a RecordSpec, EncodeError> {
        let tag = object
            .get(&spec.tag_field)
            .and_then(Json::as_str)
            .ok_or_else(|| {
                EncodeError::Conversion(ConversionError::new(
                    "",
                    ty,
                    format!("missing tag field '{}'", spec.tag_field),
                ))
            })?;
        spec.variant_named(tag).ok_or_else(|| {
            let known: Vec<&str> = spec.variants.iter().map(|v| v.name.as_str()).collect();
            EncodeError::Conversion(ConversionError::new(
                tag,
                ty,
                format!("unknown variant; expected one of {}", known.join(", ")),
            ))
        })
    }
}

impl Encoder for TaggedEncoder {
    fn name(&self) -> &str {
        "tagged"
    }

    fn is_type(&self, value: &Value) -> bool {
        matches!(value, Value::Variant(_))
    }

    fn is_type_structure(&self, ty: &TypeSpec) -> bool {
        matches!(ty, TypeSpec::Tagged(_))
    }

    fn serialize(&self, value: &Value, registry: &EncoderRegistry) -> Result<Json, EncodeError> {
        match value {
            Value::Variant(variant) => {
                let mut object = serialize_fields(&variant.record, registry)?;
                object.insert(variant.tag_field.clone(), Json::String(variant.tag().to_string()));
                Ok(Json::Object(object))
            }
            other => Err(EncodeError::NoMatchingEncoder {
                subject: other.kind().to_string(),
            }),
        }
    }

    fn mold(&self, ty: &TypeSpec, payload: &Json, registry: &EncoderRegistry) -> Result<Value, EncodeError> {
        let TypeSpec::Tagged(spec) = ty else {
            return Err(EncodeError::NoMatchingEncoder {
                subject: ty.to_string(),
            });
        };
        let object = payload.as_object().ok_or_else(|| mismatch(payload, ty, "an object"))?;
        let variant = Self::variant(spec, ty, object)?;
        let record = mold_fields(variant, ty, object, Some(spec.tag_field.as_str()), registry)?;
        Ok(Value::Variant(VariantValue {
            union_name: spec.name.clone(),
            tag_field: spec.tag_field.clone(),
            record,
        }))
    }
}

/// Filesystem paths, as strings.
struct PathEncoder;

impl Encoder for PathEncoder {
    fn name(&self) -> &str {
        "path"
    }

    fn is_type(&self, value: &Value) -> bool {
        matches!(value, Value::Path(_))
    }

    fn is_type_structure(&self, ty: &TypeSpec) -> bool {
        matches!(ty, TypeSpec::Path)
    }

    fn serialize(&self, value: &Value, _registry: &EncoderRegistry) -> Result<Json, EncodeError> {
        Ok(Json::String(value.to_string()))
    }

    fn mold(&self, ty: &TypeSpec, payload: &Json, registry: &EncoderRegistry) -> Result<Value, EncodeError> {
        let text = payload.as_str().ok_or_else(|| mismatch(payload, ty, "a string"))?;
        Ok(registry.coercer().scalar(text, ty)?)
    }
}

/// Dates and timestamps, as ISO-8601 strings.
struct DateTimeEncoder;

impl Encoder for DateTimeEncoder {
    fn name(&self) -> &str {
        "datetime"
    }

    fn is_type(&self, value: &Value) -> bool {
        matches!(value, Value::Date(_) | Value::DateTime(_))
    }

    fn is_type_structure(&self, ty: &TypeSpec) -> bool {
        matches!(ty, TypeSpec::Date | TypeSpec::DateTime)
    }

    fn serialize(&self, value: &Value, _registry: &EncoderRegistry) -> Result<Json, EncodeError> {
        Ok(Json::String(value.to_string()))
    }

    fn mold(&self, ty: &TypeSpec, payload: &Json, registry: &EncoderRegistry) -> Result<Value, EncodeError> {
        let text = payload.as_str().ok_or_else(|| mismatch(payload, ty, "a date string"))?;
        Ok(registry.coercer().scalar(text, ty)?)
    }
}

/// Sequences, sets, tuples, mappings, optionals and unions.
struct ContainerEncoder;

impl Encoder for ContainerEncoder {
    fn name(&self) -> &str {
        "container"
    }

    fn is_type(&self, value: &Value) -> bool {
        matches!(
            value,
            Value::List(_) | Value::Tuple(_) | Value::Set(_) | Value::FrozenSet(_) | Value::Map(_)
        )
    }

    fn is_type_structure(&self, ty: &TypeSpec) -> bool {
        ty.is_container() || matches!(ty, TypeSpec::Optional(_) | TypeSpec::Union(_))
    }

    fn serialize(&self, value: &Value, registry: &EncoderRegistry) -> Result<Json, EncodeError> {
        match value {
            Value::Map(entries) => {
                if entries.iter().all(|(k, _)| matches!(k, Value::Text(_) | Value::Enum(_))) {
                    let mut object = Map::new();
                    for (k, v) in entries {
                        object.insert(k.to_string(), registry.encode(v)?);
                    }
                    Ok(Json::Object(object))
                } else {
                    entries
                        .iter()
                        .map(|(k, v)| -> Result<Json, EncodeError> {
                            Ok(Json::Array(vec![registry.encode(k)?, registry.encode(v)?]))
                        })
                        .collect::<Result<Vec<_>, EncodeError>>()
                        .map(Json::Array)
                }
            }
            other => other
                .as_slice()
                .unwrap_or_default()
                .iter()
                .map(|item| registry.encode(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Json::Array),
        }
    }

    fn mold(&self, ty: &TypeSpec, payload: &Json, registry: &EncoderRegistry) -> Result<Value, EncodeError> {
        let items = |inner: &TypeSpec| -> Result<Vec<Value>, EncodeError> {
            payload
                .as_array()
                .ok_or_else(|| mismatch(payload, ty, "an array"))?
                .iter()
                .map(|item| registry.mold(inner, item))
                .collect()
        };

        match ty {
            TypeSpec::Optional(inner) => match payload {
                Json::Null => Ok(Value::Null),
                other => registry.mold(inner, other),
            },
            TypeSpec::Union(alternatives) => {
                let mut last = EncodeError::NoMatchingEncoder {
                    subject: ty.to_string(),
                };
                for alt in alternatives {
                    match registry.mold(alt, payload) {
                        Ok(value) => return Ok(value),
                        Err(err) => last = err,
                    }
                }
                Err(last)
            }
            TypeSpec::List(inner) => Ok(Value::List(items(inner)?)),
            TypeSpec::VarTuple(inner) => Ok(Value::Tuple(items(inner)?)),
            TypeSpec::Set(inner) => Ok(Value::Set(dedup(items(inner)?))),
            TypeSpec::FrozenSet(inner) => Ok(Value::FrozenSet(dedup(items(inner)?))),
            TypeSpec::Tuple(types) => {
                let array = payload.as_array().ok_or_else(|| mismatch(payload, ty, "an array"))?;
                if array.len() != types.len() {
                    return Err(mismatch(payload, ty, &format!("{} items", types.len())));
                }
                array
                    .iter()
                    .zip(types)
                    .map(|(item, t)| registry.mold(t, item))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Tuple)
            }
            TypeSpec::Map(key_ty, value_ty) => {
                let mut entries = Vec::new();
                match payload {
                    Json::Object(object) => {
                        for (k, v) in object {
                            let key = registry.coercer().scalar(k, key_ty)?;
                            upsert(&mut entries, key, registry.mold(value_ty, v)?);
                        }
                    }
                    // `[[key, value], ...]`, as serialized for non-text keys
                    Json::Array(pairs) => {
                        for pair in pairs {
                            let [k, v] = pair.as_array().map(Vec::as_slice).unwrap_or_default() else {
                                return Err(mismatch(pair, ty, "a [key, value] pair"));
                            };
                            upsert(&mut entries, registry.mold(key_ty, k)?, registry.mold(value_ty, v)?);
                        }
                    }
                    other => return Err(mismatch(other, ty, "an object or [key, value] pairs")),
                }
                Ok(Value::Map(entries))
            }
            other => Err(EncodeError::NoMatchingEncoder {
                subject: other.to_string(),
            }),
        }
    }
}

/// Leaf values. JSON scalars are rendered to tokens and coerced.
struct ScalarEncoder;

impl Encoder for ScalarEncoder {
    fn name(&self) -> &str {
        "scalar"
    }

    fn is_type(&self, value: &Value) -> bool {
        matches!(
            value,
            Value::Null
                | Value::Bool(_)
                | Value::Int(_)
                | Value::Float(_)
                | Value::Text(_)
                | Value::Uuid(_)
                | Value::Json(_)
                | Value::Enum(_)
                | Value::Context(_)
        )
    }

    fn is_type_structure(&self, ty: &TypeSpec) -> bool {
        matches!(
            ty,
            TypeSpec::Text
                | TypeSpec::Integer
                | TypeSpec::Float
                | TypeSpec::Bool
                | TypeSpec::Uuid
                | TypeSpec::Json
                | TypeSpec::Enum(_)
        )
    }

    fn serialize(&self, value: &Value, _registry: &EncoderRegistry) -> Result<Json, EncodeError> {
        Ok(match value {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::from(*i),
            Value::Float(f) => Json::from(*f),
            Value::Json(j) => j.clone(),
            other => Json::String(other.to_string()),
        })
    }

    fn mold(&self, ty: &TypeSpec, payload: &Json, registry: &EncoderRegistry) -> Result<Value, EncodeError> {
        if matches!(ty, TypeSpec::Json) {
            return Ok(Value::Json(payload.clone()));
        }
        let token = match payload {
            Json::String(s) => s.clone(),
            Json::Number(n) => n.to_string(),
            Json::Bool(b) => b.to_string(),
            other => return Err(mismatch(other, ty, "a scalar")),
        };
        Ok(registry.coercer().scalar(&token, ty)?)
    }
}
