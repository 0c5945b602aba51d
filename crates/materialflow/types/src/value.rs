//! Primitive values and instance attributes

use serde::{Deserialize, Serialize};
use std::fmt;

/// A primitive value produced by expression evaluation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Number(f64),
    String(String),
}

impl Value {
    /// Name of the value's type, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "\"{}\"", s),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
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

/// The content of one instance attribute
///
/// An attribute is either a primitive, the name of another instance
/// (dereferenced when it appears in the middle of an attribute path), or a
/// stored attribute path that is resolved when read.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Attribute {
    Primitive(Value),
    Instance(String),
    Path(Vec<String>),
}

impl Attribute {
    pub fn primitive(value: impl Into<Value>) -> Self {
        Attribute::Primitive(value.into())
    }

    pub fn instance(name: impl Into<String>) -> Self {
        Attribute::Instance(name.into())
    }

    /// Name of the instance this attribute points at, if it can be dereferenced
    ///
    /// A plain string primitive is accepted as an instance name as well,
    /// since front-ends commonly store nested instances by name.
    pub fn instance_name(&self) -> Option<&str> {
        match self {
            Attribute::Instance(name) => Some(name),
            Attribute::Primitive(Value::String(name)) => Some(name),
            _ => None,
        }
    }

    /// Convert an externally supplied JSON value into an attribute
    ///
    /// Arrays of strings become attribute paths. Objects and nulls have no
    /// attribute representation and yield `None`.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(Attribute::Primitive(Value::Bool(*b))),
            serde_json::Value::Number(n) => n.as_f64().map(|n| Attribute::Primitive(Value::Number(n))),
            serde_json::Value::String(s) => Some(Attribute::Primitive(Value::String(s.clone()))),
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .map(Attribute::Path),
            serde_json::Value::Object(_) | serde_json::Value::Null => None,
        }
    }
}
