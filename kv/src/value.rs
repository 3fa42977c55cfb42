//! Stored value types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A value held in the store.
///
/// Serializes untagged, so the snapshot file stays a plain JSON object:
/// strings, numbers and arrays. `Int` is listed before `Float` so that
/// integral JSON numbers load back as integers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<serde_json::Value>),
}

/// The tag of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    String,
    Int,
    Float,
    List,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Shape::String => "string",
            Shape::Int => "integer",
            Shape::Float => "float",
            Shape::List => "list",
        };
        f.write_str(name)
    }
}

impl Value {
    /// Returns the shape tag.
    pub fn shape(&self) -> Shape {
        match self {
            Value::String(_) => Shape::String,
            Value::Int(_) => Shape::Int,
            Value::Float(_) => Shape::Float,
            Value::List(_) => Shape::List,
        }
    }

    /// Returns the string payload, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the list payload, if this is a list value.
    pub fn as_list(&self) -> Option<&[serde_json::Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// The representation the value length limit is measured against.
    ///
    /// Strings are their own text; every other shape is its compact JSON.
    pub fn canonical(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(|n| n.to_string())
                .unwrap_or_else(|| f.to_string()),
            Value::List(items) => {
                serde_json::to_string(items).unwrap_or_else(|_| String::from("[]"))
            }
        }
    }

    /// Length of [`Value::canonical`] in characters.
    pub fn canonical_len(&self) -> usize {
        match self {
            Value::String(s) => s.chars().count(),
            other => other.canonical().chars().count(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => serde_json::Value::String(s),
            Value::Int(n) => serde_json::Value::from(n),
            Value::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::List(items) => serde_json::Value::Array(items),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<Vec<serde_json::Value>> for Value {
    fn from(items: Vec<serde_json::Value>) -> Self {
        Value::List(items)
    }
}
