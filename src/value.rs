use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::data_type::DataType;

/// Represents a single data value stored in the database.
///
/// This enum wraps all supported Rust types into a single type that can be
/// passed around the engine. It includes support for SQL `NULL` values.
///
/// Values are hashable so they can key secondary indexes; floats hash and
/// compare by bit pattern for that purpose.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// represents an empty or missing value.
    Null,
    /// A 64-bit signed integer value.
    Int(i64),
    /// A 64-bit floating-point value.
    Float(f64),
    /// A UTF-8 string value, wrapped in an [Arc] for efficient,
    /// thread-safe sharing and cheap cloning.
    Text(Arc<str>),
    /// A boolean value.
    Bool(bool),
}

impl Value {
    /// Returns `true` if the value is [Value::Null].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the inner integer value if this is a [Value::Int].
    /// Otherwise, returns `None`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the inner float value if this is a [Value::Float].
    /// Otherwise, returns `None`.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns a reference to the inner string slice if this is a [Value::Text].
    /// Otherwise, returns `None`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the inner boolean value if this is a [Value::Bool].
    /// Otherwise, returns `None`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Casts this value to the representation a column of `target` type stores.
    ///
    /// Casting an already-conforming value is the identity. `Null` passes
    /// through every cast unchanged: nullability is tracked per row, not per
    /// type. Returns `None` when the value cannot represent the target type
    /// (e.g. `"abc"` as INTEGER).
    ///
    /// # Example
    /// ```
    /// # use auditdb::{DataType, Value};
    /// assert_eq!(Value::Text("1".into()).cast(DataType::Integer), Some(Value::Int(1)));
    /// assert_eq!(Value::Int(1).cast(DataType::Integer), Some(Value::Int(1)));
    /// assert_eq!(Value::Text("abc".into()).cast(DataType::Integer), None);
    /// ```
    pub fn cast(&self, target: DataType) -> Option<Value> {
        if self.is_null() {
            return Some(Value::Null);
        }

        match target {
            DataType::Integer => match self {
                Self::Int(i) => Some(Self::Int(*i)),
                Self::Float(f) => Some(Self::Int(*f as i64)),
                Self::Text(s) => s.trim().parse::<i64>().ok().map(Self::Int),
                Self::Bool(b) => Some(Self::Int(i64::from(*b))),
                Self::Null => Some(Self::Null),
            },
            DataType::Float => match self {
                Self::Float(f) => Some(Self::Float(*f)),
                Self::Int(i) => Some(Self::Float(*i as f64)),
                Self::Text(s) => s.trim().parse::<f64>().ok().map(Self::Float),
                Self::Bool(b) => Some(Self::Float(if *b { 1.0 } else { 0.0 })),
                Self::Null => Some(Self::Null),
            },
            DataType::Boolean => match self {
                Self::Bool(b) => Some(Self::Bool(*b)),
                Self::Int(i) => Some(Self::Bool(*i != 0)),
                Self::Float(f) => Some(Self::Bool(*f != 0.0)),
                Self::Text(s) => {
                    let truthy = matches!(s.to_lowercase().as_str(), "true" | "1" | "yes" | "y");
                    Some(Self::Bool(truthy))
                }
                Self::Null => Some(Self::Null),
            },
            // DATETIME is opaque text; both render any value to its string form.
            DataType::Text | DataType::DateTime => match self {
                Self::Text(s) => Some(Self::Text(Arc::clone(s))),
                other => Some(Self::Text(other.to_string().into())),
            },
        }
    }

    /// Equality with the relaxed coercion used when filtering joined rows,
    /// where no single schema is available to cast the probe value against.
    /// Numbers compare across Int/Float; everything else falls back to
    /// comparing rendered text. `Null` matches nothing.
    pub fn loosely_eq(&self, other: &Value) -> bool {
        if self.is_null() || other.is_null() {
            return false;
        }
        if self == other {
            return true;
        }
        match (self, other) {
            (Self::Int(i), Self::Float(f)) | (Self::Float(f), Self::Int(i)) => *i as f64 == *f,
            _ => self.to_string() == other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Int(i) => i.hash(state),
            Self::Float(f) => f.to_bits().hash(state),
            Self::Text(s) => s.hash(state),
            Self::Bool(b) => b.hash(state),
        }
    }
}
