use std::fmt;

use thiserror::Error;

use crate::data_type::DataType;
use crate::value::Value;

/// Unified result type for engine operations.
pub type Result<T, E = EngineError> = std::result::Result<T, E>;

/// Everything that can go wrong inside the engine.
///
/// All variants are caught at the [crate::database::Database] /
/// [crate::ledger::LedgerTable] boundary and folded into an error
/// [crate::database::ExecutionResult]; nothing escapes `execute` as a fault.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid table definition: duplicate column, or a key column that is
    /// not part of the schema.
    #[error("schema error: {0}")]
    Schema(String),

    /// A statement referenced a column the table does not declare.
    #[error("column '{column}' does not exist in table '{table}'")]
    UnknownColumn { table: String, column: String },

    /// A supplied value could not be converted to its column's type.
    #[error("cannot cast {value} to {target} for column '{column}'")]
    TypeCast {
        column: String,
        value: Value,
        target: DataType,
    },

    /// A write would duplicate a primary or unique key value.
    #[error("{kind} violation on '{column}': {value} already exists")]
    Constraint {
        kind: ConstraintKind,
        column: String,
        value: Value,
    },

    #[error("table '{0}' not found")]
    TableNotFound(String),

    /// The statement text did not match the dialect.
    #[error("parse error: {0}")]
    Parse(String),

    /// A table or ledger with that name already exists.
    #[error("table '{0}' already exists")]
    AlreadyExists(String),

    /// The persistence collaborator failed. The in-memory mutation that
    /// triggered the save is kept; callers must treat this as a
    /// disaster-recovery signal, not a rollback.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Which uniqueness rule a write violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    PrimaryKey,
    Unique,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PrimaryKey => "primary key",
            Self::Unique => "unique key",
        })
    }
}

impl From<std::io::Error> for EngineError {
    fn from(error: std::io::Error) -> Self {
        Self::Storage(error.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(error: serde_json::Error) -> Self {
        Self::Storage(error.to_string())
    }
}
