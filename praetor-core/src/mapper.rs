//! Structural mapping of request data onto typed models.
//!
//! The injector never fills structured parameters itself. It serializes a
//! default instance of the model, hands both shapes to a
//! [`StructuralMapper`], and deserializes the result. [`JsonMapper`] is the
//! built-in implementation.

use crate::error::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};
use std::fmt;

/// Built-in value kinds a parameter can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Bool,
    Int,
    Float,
    String,
    List,
    Map,
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarKind::Bool => "bool",
            ScalarKind::Int => "int",
            ScalarKind::Float => "float",
            ScalarKind::String => "string",
            ScalarKind::List => "list",
            ScalarKind::Map => "map",
        };
        f.write_str(name)
    }
}

/// Convert `value` to `kind`, accepting the string forms request data
/// usually arrives in. `None` when no sensible conversion exists.
pub fn coerce_scalar(kind: ScalarKind, value: Value) -> Option<Value> {
    match (kind, value) {
        (ScalarKind::Bool, Value::Bool(b)) => Some(Value::Bool(b)),
        (ScalarKind::Bool, Value::Number(n)) => match n.as_i64() {
            Some(0) => Some(Value::Bool(false)),
            Some(1) => Some(Value::Bool(true)),
            _ => None,
        },
        (ScalarKind::Bool, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(Value::Bool(true)),
            "false" | "0" | "no" | "off" | "" => Some(Value::Bool(false)),
            _ => None,
        },

        (ScalarKind::Int, Value::Number(n)) => {
            if n.is_i64() || n.is_u64() {
                Some(Value::Number(n))
            } else {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
                    .map(|f| Value::Number(Number::from(f as i64)))
            }
        }
        (ScalarKind::Int, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),

        (ScalarKind::Float, Value::Number(n)) => Some(Value::Number(n)),
        (ScalarKind::Float, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),

        (ScalarKind::String, Value::String(s)) => Some(Value::String(s)),
        (ScalarKind::String, Value::Number(n)) => Some(Value::String(n.to_string())),
        (ScalarKind::String, Value::Bool(b)) => Some(Value::String(b.to_string())),

        (ScalarKind::List, Value::Array(items)) => Some(Value::Array(items)),
        (ScalarKind::List, Value::String(s)) => match serde_json::from_str(&s) {
            Ok(Value::Array(items)) => Some(Value::Array(items)),
            _ => None,
        },

        (ScalarKind::Map, Value::Object(map)) => Some(Value::Object(map)),
        (ScalarKind::Map, Value::String(s)) => match serde_json::from_str(&s) {
            Ok(Value::Object(map)) => Some(Value::Object(map)),
            _ => None,
        },

        _ => None,
    }
}

/// Per-call mapping options
#[derive(Debug, Clone)]
pub struct MapOptions {
    /// Fail on missing required fields, shape mismatches and empty sources
    pub error_on_mismatch: bool,
    /// Top-level fields that may be absent and keep their default
    pub optional: &'static [&'static str],
    /// Used in error messages
    pub type_name: &'static str,
}

impl MapOptions {
    pub fn strict(type_name: &'static str) -> Self {
        Self {
            error_on_mismatch: true,
            optional: &[],
            type_name,
        }
    }

    pub fn lenient(type_name: &'static str) -> Self {
        Self {
            error_on_mismatch: false,
            ..Self::strict(type_name)
        }
    }
}

/// Populates a destination shape from a source value.
///
/// Implementations receive the destination as the JSON form of a default
/// instance, and return the populated JSON form.
pub trait StructuralMapper: Send + Sync {
    fn map(&self, source: &Value, destination: Value, options: &MapOptions) -> Result<Value>;
}

/// A type the injector can build from request data
pub trait Model: Default + Serialize + DeserializeOwned + Send + 'static {
    /// Whether missing required fields fail the mapping
    fn error_on_mismatch() -> bool {
        true
    }

    /// Fields that keep their default when absent from the source
    fn optional_fields() -> &'static [&'static str] {
        &[]
    }

    /// Runs right after mapping
    fn init(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Map `source` onto a default `T`, then run its init hook
pub fn map_model<T: Model>(mapper: &dyn StructuralMapper, source: &Value) -> Result<T> {
    let type_name = std::any::type_name::<T>();
    let destination = serde_json::to_value(T::default())
        .map_err(|e| Error::Internal(format!("Failed to serialize {}: {}", type_name, e)))?;

    let options = MapOptions {
        error_on_mismatch: T::error_on_mismatch(),
        optional: T::optional_fields(),
        type_name,
    };
    let mapped = mapper.map(source, destination, &options)?;

    let mut model: T = serde_json::from_value(mapped)
        .map_err(|e| Error::InvalidValue(format!("Error mapping model [{}]: {}", type_name, e)))?;
    model.init()?;
    Ok(model)
}

/// Default [`StructuralMapper`] walking the destination's JSON shape.
///
/// Rules, per destination field:
/// - a `null` default marks the field nullable: absent input leaves it null;
/// - any other default marks it required unless listed as optional;
/// - objects recurse, lists take the source list as is;
/// - scalars are coerced from their string forms (`"42"` into a number);
/// - a string arriving where a list or object is expected is JSON-decoded.
///
/// Source keys with no destination field are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMapper;

impl JsonMapper {
    pub fn new() -> Self {
        Self
    }

    fn map_object(
        &self,
        source: &Map<String, Value>,
        mut destination: Map<String, Value>,
        options: &MapOptions,
        path: &str,
        top_level: bool,
    ) -> Result<Map<String, Value>> {
        for (key, slot) in destination.iter_mut() {
            let field = join(path, key);
            let incoming = source.get(key).filter(|v| !v.is_null());

            let Some(incoming) = incoming else {
                let optional = top_level && options.optional.contains(&key.as_str());
                if !slot.is_null() && !optional && options.error_on_mismatch {
                    return Err(Error::MappingMismatch(format!(
                        "Error mapping model [{}]: Source property [{}] has null value!",
                        options.type_name, field
                    )));
                }
                continue;
            };

            let current = slot.take();
            *slot = self.map_field(incoming.clone(), current, options, &field)?;
        }
        Ok(destination)
    }

    fn map_field(
        &self,
        incoming: Value,
        current: Value,
        options: &MapOptions,
        field: &str,
    ) -> Result<Value> {
        let incoming = match (&current, incoming) {
            (Value::Object(_) | Value::Array(_), Value::String(s)) if !s.is_empty() => {
                serde_json::from_str(&s).unwrap_or(Value::String(s))
            }
            (_, incoming) => incoming,
        };

        match current {
            // Unknown type: take the value as is
            Value::Null => Ok(incoming),
            Value::Object(nested) => match incoming {
                Value::Object(source) => self
                    .map_object(&source, nested, options, field, false)
                    .map(Value::Object),
                other => self.mismatch(options, field, "object", &other, Value::Object(nested)),
            },
            Value::Array(default) => match incoming {
                Value::Array(items) => Ok(Value::Array(items)),
                other => self.mismatch(options, field, "list", &other, Value::Array(default)),
            },
            Value::Bool(_) => self.coerce(ScalarKind::Bool, incoming, options, field),
            Value::Number(n) => {
                let kind = if n.is_f64() {
                    ScalarKind::Float
                } else {
                    ScalarKind::Int
                };
                self.coerce(kind, incoming, options, field)
            }
            Value::String(_) => self.coerce(ScalarKind::String, incoming, options, field),
        }
    }

    fn coerce(
        &self,
        kind: ScalarKind,
        incoming: Value,
        options: &MapOptions,
        field: &str,
    ) -> Result<Value> {
        let shown = incoming.to_string();
        coerce_scalar(kind, incoming).ok_or_else(|| {
            Error::InvalidValue(format!(
                "Error mapping model [{}]: Property [{}] expects {}, got {}",
                options.type_name, field, kind, shown
            ))
        })
    }

    fn mismatch(
        &self,
        options: &MapOptions,
        field: &str,
        expected: &str,
        got: &Value,
        fallback: Value,
    ) -> Result<Value> {
        if options.error_on_mismatch {
            return Err(Error::MappingMismatch(format!(
                "Error mapping model [{}]: Property type mismatch [{}]! Expected [{}] got [{}].",
                options.type_name,
                field,
                expected,
                kind_of(got)
            )));
        }
        Ok(fallback)
    }
}

impl StructuralMapper for JsonMapper {
    fn map(&self, source: &Value, destination: Value, options: &MapOptions) -> Result<Value> {
        let empty = match source {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            Value::Array(items) => items.is_empty(),
            _ => false,
        };
        if empty {
            if options.error_on_mismatch {
                return Err(Error::MappingMismatch(format!(
                    "Error mapping model [{}]: Empty source!",
                    options.type_name
                )));
            }
            return Ok(destination);
        }

        match (source, destination) {
            (Value::Object(source), Value::Object(destination)) => self
                .map_object(source, destination, options, "", true)
                .map(Value::Object),
            (source, destination) => {
                self.map_field(source.clone(), destination, options, options.type_name)
            }
        }
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
