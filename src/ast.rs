use crate::row::Row;
use crate::table::{ColumnDef, JoinKind};
use crate::value::Value;

/// A parsed statement: one variant per command the dialect understands.
/// Malformed input never reaches this type; the parser reports it as a
/// parse error instead.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateTable(CreateTable),
    Insert(Insert),
    Select(Select),
    Update(Update),
    Delete(Delete),
    DropTable { name: String },
    ShowTables,
    LedgerCreate { table: String },
    LedgerAppend(LedgerAppend),
    LedgerVerify { table: String },
    LedgerAudit { table: String, aggregate_id: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTable {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Option<String>,
    pub unique_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub table: String,
    pub values: Row,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub table: String,
    /// `None` means `*`.
    pub columns: Option<Vec<String>>,
    pub conditions: Vec<(String, Value)>,
    pub join: Option<JoinClause>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub table: String,
    pub kind: JoinKind,
    pub left_key: String,
    pub right_key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub table: String,
    pub assignments: Vec<(String, Value)>,
    pub conditions: Vec<(String, Value)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub table: String,
    pub conditions: Vec<(String, Value)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerAppend {
    pub table: String,
    pub event_type: String,
    /// Raw JSON payload text; validated when the statement executes.
    pub data: String,
    pub aggregate_id: Option<String>,
}
