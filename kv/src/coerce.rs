//! Input coercion and size validation.
//!
//! Callers hand the store loosely typed input as `serde_json::Value` (what an
//! HTTP body or a command line argument decodes to). Each setter coerces that
//! input into its target [`Shape`] on a best-effort basis, then [`Limits`]
//! checks the trimmed key and the canonical value length.

use serde_json::Value as Json;

use crate::error::Rejection;
use crate::value::{Shape, Value};

/// Maximum key and value lengths, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_key_len: usize,
    pub max_value_len: usize,
}

impl Limits {
    pub fn new(max_key_len: usize, max_value_len: usize) -> Self {
        Self {
            max_key_len,
            max_value_len,
        }
    }

    /// Trims `key` and checks it together with `value` against the limits.
    /// Returns the trimmed key on success.
    pub fn check<'k>(&self, key: &'k str, value: &Value) -> Result<&'k str, Rejection> {
        let key = self.check_key(key)?;
        self.check_value(value)?;
        Ok(key)
    }

    pub fn check_key<'k>(&self, key: &'k str) -> Result<&'k str, Rejection> {
        let key = key.trim();
        if key.is_empty() {
            return Err(Rejection::EmptyKey);
        }
        let len = key.chars().count();
        if len > self.max_key_len {
            return Err(Rejection::KeyTooLong {
                len,
                max: self.max_key_len,
            });
        }
        Ok(key)
    }

    pub fn check_value(&self, value: &Value) -> Result<(), Rejection> {
        let len = value.canonical_len();
        if len > self.max_value_len {
            return Err(Rejection::ValueTooLong {
                len,
                max: self.max_value_len,
            });
        }
        Ok(())
    }
}

/// Picks the setter shape for an untyped input.
///
/// Booleans count as integers. `null` and objects have no stored shape.
pub fn shape_of(input: &Json) -> Result<Shape, Rejection> {
    match input {
        Json::String(_) => Ok(Shape::String),
        Json::Bool(_) => Ok(Shape::Int),
        Json::Number(n) if n.is_i64() || n.is_u64() => Ok(Shape::Int),
        Json::Number(_) => Ok(Shape::Float),
        Json::Array(_) => Ok(Shape::List),
        other => Err(Rejection::Unsupported(kind(other))),
    }
}

/// Coerces `input` into a value of the given shape.
pub fn coerce(shape: Shape, input: &Json) -> Result<Value, Rejection> {
    match shape {
        Shape::String => Ok(Value::String(to_string(input))),
        Shape::Int => to_int(input).map(Value::Int),
        Shape::Float => to_float(input).map(Value::Float),
        Shape::List => to_list(input).map(Value::List),
    }
}

/// Strings pass through, anything else becomes its JSON text. Always trimmed.
pub fn to_string(input: &Json) -> String {
    match input {
        Json::String(s) => s.trim().to_string(),
        other => other.to_string().trim().to_string(),
    }
}

pub fn to_int(input: &Json) -> Result<i64, Rejection> {
    let fail = || Rejection::Coercion {
        target: Shape::Int,
        found: kind(input),
    };
    match input {
        Json::Bool(b) => Ok(i64::from(*b)),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(i);
            }
            if n.is_u64() {
                return Err(fail());
            }
            match n.as_f64() {
                // Truncate toward zero, rejecting anything outside i64.
                Some(f) if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                    Ok(f.trunc() as i64)
                }
                _ => Err(fail()),
            }
        }
        Json::String(s) => s.trim().parse::<i64>().map_err(|_| fail()),
        _ => Err(fail()),
    }
}

pub fn to_float(input: &Json) -> Result<f64, Rejection> {
    let fail = || Rejection::Coercion {
        target: Shape::Float,
        found: kind(input),
    };
    let f = match input {
        Json::Bool(b) => f64::from(u8::from(*b)),
        Json::Number(n) => n.as_f64().ok_or_else(fail)?,
        Json::String(s) => s.trim().parse::<f64>().map_err(|_| fail())?,
        _ => return Err(fail()),
    };
    if !f.is_finite() {
        return Err(fail());
    }
    Ok(f)
}

/// Arrays are taken as-is, strings split into characters, objects yield
/// their keys. Scalars have nothing to iterate and are rejected.
pub fn to_list(input: &Json) -> Result<Vec<Json>, Rejection> {
    match input {
        Json::Array(items) => {
            items.iter().try_for_each(check_element)?;
            Ok(items.clone())
        }
        Json::String(s) => Ok(s.chars().map(|c| Json::String(c.to_string())).collect()),
        Json::Object(map) => Ok(map.keys().cloned().map(Json::String).collect()),
        other => Err(Rejection::Coercion {
            target: Shape::List,
            found: kind(other),
        }),
    }
}

/// List elements are flat: strings, numbers or booleans.
pub fn check_element(element: &Json) -> Result<(), Rejection> {
    match element {
        Json::String(_) | Json::Number(_) | Json::Bool(_) => Ok(()),
        other => Err(Rejection::Element(kind(other))),
    }
}

fn kind(input: &Json) -> &'static str {
    match input {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}
