use std::fmt;

use serde::{Deserialize, Serialize};

/// Represents the supported data types in the database schema.
/// These types define the structure of columns and the expected format of values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataType {
    /// A 64-bit signed integer.
    Integer,
    /// A variable-length UTF-8 character string.
    Text,
    /// A 64-bit floating-point number.
    Float,
    /// A boolean value (true or false).
    Boolean,
    /// A point in time stored as opaque text; no calendar validation is applied.
    DateTime,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Integer => "INTEGER",
            Self::Text => "TEXT",
            Self::Float => "FLOAT",
            Self::Boolean => "BOOLEAN",
            Self::DateTime => "DATETIME",
        })
    }
}
