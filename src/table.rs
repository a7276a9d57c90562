use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data_type::DataType;
use crate::error::{ConstraintKind, EngineError, Result};
use crate::index::Index;
use crate::row::{Row, RowId};
use crate::value::Value;

/// Column definition in the schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
}

/// An immutable table schema: the declared columns in definition order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    pub columns: Vec<ColumnDef>,
}

impl Schema {
    /// The declared type of `column`, if it exists.
    pub fn data_type(&self, column: &str) -> Option<DataType> {
        self.columns
            .iter()
            .find(|c| c.name == column)
            .map(|c| c.data_type)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c.name == column)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// Join flavors supported by [Table::join].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
}

/// Read-only snapshot of a table's shape, serializable for host applications.
#[derive(Debug, Clone, Serialize)]
pub struct TableDescription {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Option<String>,
    pub unique_keys: Vec<String>,
    pub row_count: usize,
    pub indexed_columns: Vec<String>,
}

/// A single table: schema, key constraints, rows and their secondary indexes.
///
/// Rows are stored under stable [RowId]s (monotonically increasing, never
/// reused) and indexes reference those ids, so index validity is independent
/// of deletion order. Iteration over the row map is insertion order.
pub struct Table {
    pub name: String,
    pub schema: Schema,
    pub primary_key: Option<String>,
    pub unique_keys: Vec<String>,
    rows: BTreeMap<RowId, Row>,
    indexes: HashMap<String, Index>,
    next_row_id: RowId,
}

impl Table {
    /// Creates a new, empty table.
    ///
    /// Primary key and unique key columns are indexed immediately.
    ///
    /// # Errors
    /// Returns [EngineError::Schema] if the schema declares duplicate
    /// columns, or if `primary_key` or any of `unique_keys` is not a declared
    /// column.
    pub fn create(
        name: impl Into<String>,
        schema: Schema,
        primary_key: Option<String>,
        unique_keys: Vec<String>,
    ) -> Result<Self> {
        let name = name.into();

        let mut seen = HashSet::new();
        for column in &schema.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(EngineError::Schema(format!(
                    "duplicate column '{}' in table '{name}'",
                    column.name
                )));
            }
        }

        if let Some(pk) = &primary_key {
            if !schema.contains(pk) {
                return Err(EngineError::Schema(format!(
                    "primary key '{pk}' not in columns"
                )));
            }
        }
        for key in &unique_keys {
            if !schema.contains(key) {
                return Err(EngineError::Schema(format!(
                    "unique key '{key}' not in columns"
                )));
            }
        }

        let mut table = Self {
            name,
            schema,
            primary_key,
            unique_keys,
            rows: BTreeMap::new(),
            indexes: HashMap::new(),
            next_row_id: RowId(0),
        };

        if let Some(pk) = table.primary_key.clone() {
            table.build_index(&pk);
        }
        for key in table.unique_keys.clone() {
            table.build_index(&key);
        }

        Ok(table)
    }

    /// Creates a secondary index on `column`, built from the existing rows.
    ///
    /// Key columns are always indexed; this adds optional extra lookup
    /// columns that [Table::select] will use for single-condition queries.
    pub fn create_index(&mut self, column: &str) -> Result<()> {
        if !self.schema.contains(column) {
            return Err(EngineError::UnknownColumn {
                table: self.name.clone(),
                column: column.to_string(),
            });
        }
        self.build_index(column);
        Ok(())
    }

    fn build_index(&mut self, column: &str) {
        let mut index = Index::new();
        for (id, row) in &self.rows {
            if let Some(value) = row.get(column) {
                if !value.is_null() {
                    index.insert(value.clone(), *id);
                }
            }
        }
        self.indexes.insert(column.to_string(), index);
    }

    /// Casts `value` to the declared type of `column`; values for columns the
    /// schema does not know pass through unchanged (they are rejected
    /// elsewhere, or belong to condition probes that will simply not match).
    fn cast_value(&self, column: &str, value: &Value) -> Result<Value> {
        let Some(target) = self.schema.data_type(column) else {
            return Ok(value.clone());
        };
        value
            .cast(target)
            .ok_or_else(|| EngineError::TypeCast {
                column: column.to_string(),
                value: value.clone(),
                target,
            })
    }

    /// Inserts a row, returning its assigned [RowId].
    ///
    /// Values are cast to their column types before storage; primary and
    /// unique key constraints are checked against the current index state;
    /// every existing index is updated with the new row.
    ///
    /// # Errors
    /// [EngineError::UnknownColumn] for columns outside the schema,
    /// [EngineError::TypeCast] for inconvertible values, and
    /// [EngineError::Constraint] for key collisions.
    pub fn insert(&mut self, row: Row) -> Result<RowId> {
        for column in row.keys() {
            if !self.schema.contains(column) {
                return Err(EngineError::UnknownColumn {
                    table: self.name.clone(),
                    column: column.clone(),
                });
            }
        }

        let mut cast_row = Row::new();
        for (column, value) in &row {
            cast_row.insert(column.clone(), self.cast_value(column, value)?);
        }

        self.check_constraints(&cast_row, None)?;

        let id = self.next_row_id;
        self.next_row_id = id.next();

        for (column, index) in &mut self.indexes {
            if let Some(value) = cast_row.get(column) {
                if !value.is_null() {
                    index.insert(value.clone(), id);
                }
            }
        }
        self.rows.insert(id, cast_row);

        debug!(table = %self.name, row = %id, "row inserted");
        Ok(id)
    }

    /// Checks primary and unique key uniqueness for the values in `row`.
    /// With `exclude` set, that row's own entries do not count as conflicts
    /// (the update case). `NULL` and absent values are never constrained.
    fn check_constraints(&self, row: &Row, exclude: Option<RowId>) -> Result<()> {
        for (kind, column) in self.key_columns() {
            let Some(value) = row.get(&column) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            let Some(index) = self.indexes.get(&column) else {
                continue;
            };
            let conflict = match exclude {
                Some(id) => index.conflicts_with(value, id),
                None => index.contains(value),
            };
            if conflict {
                return Err(EngineError::Constraint {
                    kind,
                    column,
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }

    fn key_columns(&self) -> Vec<(ConstraintKind, String)> {
        self.primary_key
            .iter()
            .map(|pk| (ConstraintKind::PrimaryKey, pk.clone()))
            .chain(
                self.unique_keys
                    .iter()
                    .map(|key| (ConstraintKind::Unique, key.clone())),
            )
            .collect()
    }

    /// Whether `row` satisfies every `column = value` condition.
    ///
    /// Each probe value is opportunistically cast to the column's type; a
    /// value that cannot be cast is compared as the raw literal, so
    /// `id = '1'` and `id = 1` both match an INTEGER `id` of 1.
    fn matches(&self, row: &Row, conditions: &[(String, Value)]) -> bool {
        conditions.iter().all(|(column, expected)| {
            let Some(actual) = row.get(column) else {
                return false;
            };
            let probe = self
                .cast_value(column, expected)
                .unwrap_or_else(|_| expected.clone());
            *actual == probe
        })
    }

    fn matching_ids(&self, conditions: &[(String, Value)]) -> Vec<RowId> {
        let mut ids = Vec::new();
        for (id, row) in &self.rows {
            if self.matches(row, conditions) {
                ids.push(*id);
            }
        }
        ids
    }

    fn project(&self, row: &Row, columns: Option<&[String]>) -> Row {
        match columns {
            None => row.clone(),
            Some(cols) => cols
                .iter()
                .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
                .collect(),
        }
    }

    /// Returns copies of the rows matching every condition (AND semantics),
    /// optionally projected to `columns` and capped at `limit`.
    ///
    /// A single equality condition on an indexed column is answered from the
    /// index instead of a scan; every candidate is still re-checked against
    /// the full condition set before it is returned.
    pub fn select(
        &self,
        conditions: &[(String, Value)],
        columns: Option<&[String]>,
        limit: Option<usize>,
    ) -> Vec<Row> {
        let cap = limit.unwrap_or(usize::MAX);
        let mut results = Vec::new();

        if let [(column, value)] = conditions {
            if let Some(index) = self.indexes.get(column.as_str()) {
                let probe = self
                    .cast_value(column, value)
                    .unwrap_or_else(|_| value.clone());
                for id in index.get(&probe) {
                    if results.len() >= cap {
                        break;
                    }
                    let Some(row) = self.rows.get(id) else {
                        continue;
                    };
                    if self.matches(row, conditions) {
                        results.push(self.project(row, columns));
                    }
                }
                return results;
            }
        }

        for row in self.rows.values() {
            if results.len() >= cap {
                break;
            }
            if self.matches(row, conditions) {
                results.push(self.project(row, columns));
            }
        }
        results
    }

    /// Number of rows matching `conditions`.
    pub fn count(&self, conditions: &[(String, Value)]) -> usize {
        self.select(conditions, None, None).len()
    }

    /// Updates every row matching `conditions`, returning how many changed.
    ///
    /// Each row is validated in full (casts, key uniqueness against the other
    /// rows) before any of its columns or index entries are touched. A
    /// violation aborts the call at that row; rows updated earlier in the
    /// same call keep their changes.
    pub fn update(
        &mut self,
        assignments: &[(String, Value)],
        conditions: &[(String, Value)],
    ) -> Result<usize> {
        for (column, _) in assignments {
            if !self.schema.contains(column) {
                return Err(EngineError::UnknownColumn {
                    table: self.name.clone(),
                    column: column.clone(),
                });
            }
        }

        let mut cast_assignments = Row::new();
        for (column, value) in assignments {
            cast_assignments.insert(column.clone(), self.cast_value(column, value)?);
        }

        let matching = self.matching_ids(conditions);
        let mut updated = 0;

        for id in matching {
            self.check_constraints(&cast_assignments, Some(id))?;

            let mut index_updates = Vec::with_capacity(cast_assignments.len());
            {
                let Some(row) = self.rows.get_mut(&id) else {
                    continue;
                };
                for (column, new_value) in &cast_assignments {
                    let old_value = row.insert(column.clone(), new_value.clone());
                    index_updates.push((column.clone(), old_value, new_value.clone()));
                }
            }

            for (column, old_value, new_value) in index_updates {
                if let Some(index) = self.indexes.get_mut(&column) {
                    if let Some(old_value) = old_value {
                        if !old_value.is_null() {
                            index.remove(&old_value, id);
                        }
                    }
                    if !new_value.is_null() {
                        index.insert(new_value, id);
                    }
                }
            }
            updated += 1;
        }

        if updated > 0 {
            debug!(table = %self.name, rows = updated, "rows updated");
        }
        Ok(updated)
    }

    /// Deletes every row matching `conditions`, returning how many were
    /// removed. Index entries are removed by row id, so removal order does
    /// not matter.
    pub fn delete(&mut self, conditions: &[(String, Value)]) -> usize {
        let matching = self.matching_ids(conditions);

        for id in &matching {
            if let Some(row) = self.rows.remove(id) {
                for (column, index) in &mut self.indexes {
                    if let Some(value) = row.get(column) {
                        if !value.is_null() {
                            index.remove(value, *id);
                        }
                    }
                }
            }
        }

        if !matching.is_empty() {
            debug!(table = %self.name, rows = matching.len(), "rows deleted");
        }
        matching.len()
    }

    /// Joins `self` (left side) against `other` (right side) on equality of
    /// `left_on` / `right_on`, probing a hash index built over the join key.
    ///
    /// Right-side columns are namespaced as `{right_table}_{column}` to avoid
    /// collisions; left columns keep their bare names. `Left` and `Right`
    /// joins emit unmatched rows once, with the other side's schema columns
    /// set to [Value::Null]. Absent or `NULL` join keys never match.
    pub fn join(&self, other: &Table, left_on: &str, right_on: &str, kind: JoinKind) -> Vec<Row> {
        let mut results = Vec::new();

        match kind {
            JoinKind::Inner | JoinKind::Left => {
                let right_index = Self::key_index(&other.rows, right_on);
                for left_row in self.rows.values() {
                    let key = left_row.get(left_on).filter(|v| !v.is_null());
                    match key.and_then(|k| right_index.get(k)) {
                        Some(ids) => {
                            for id in ids {
                                if let Some(right_row) = other.rows.get(id) {
                                    results.push(Self::merge(left_row, right_row, &other.name));
                                }
                            }
                        }
                        None if kind == JoinKind::Left => {
                            let mut merged = left_row.clone();
                            for column in other.schema.column_names() {
                                merged
                                    .insert(format!("{}_{column}", other.name), Value::Null);
                            }
                            results.push(merged);
                        }
                        None => {}
                    }
                }
            }
            JoinKind::Right => {
                let left_index = Self::key_index(&self.rows, left_on);
                for right_row in other.rows.values() {
                    let key = right_row.get(right_on).filter(|v| !v.is_null());
                    match key.and_then(|k| left_index.get(k)) {
                        Some(ids) => {
                            for id in ids {
                                if let Some(left_row) = self.rows.get(id) {
                                    results.push(Self::merge(left_row, right_row, &other.name));
                                }
                            }
                        }
                        None => {
                            let mut merged: Row = self
                                .schema
                                .column_names()
                                .map(|c| (c.to_string(), Value::Null))
                                .collect();
                            for (column, value) in right_row {
                                merged.insert(
                                    format!("{}_{column}", other.name),
                                    value.clone(),
                                );
                            }
                            results.push(merged);
                        }
                    }
                }
            }
        }

        results
    }

    fn key_index(rows: &BTreeMap<RowId, Row>, column: &str) -> HashMap<Value, Vec<RowId>> {
        let mut index: HashMap<Value, Vec<RowId>> = HashMap::new();
        for (id, row) in rows {
            if let Some(value) = row.get(column) {
                if !value.is_null() {
                    index.entry(value.clone()).or_default().push(*id);
                }
            }
        }
        index
    }

    fn merge(left: &Row, right: &Row, right_name: &str) -> Row {
        let mut merged = left.clone();
        for (column, value) in right {
            merged.insert(format!("{right_name}_{column}"), value.clone());
        }
        merged
    }

    /// Read-only snapshot of the table's shape.
    pub fn describe(&self) -> TableDescription {
        let mut indexed: Vec<String> = self.indexes.keys().cloned().collect();
        indexed.sort();
        TableDescription {
            name: self.name.clone(),
            columns: self.schema.columns.clone(),
            primary_key: self.primary_key.clone(),
            unique_keys: self.unique_keys.clone(),
            row_count: self.rows.len(),
            indexed_columns: indexed,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &BTreeMap<RowId, Row> {
        &self.rows
    }

    pub fn indexes(&self) -> &HashMap<String, Index> {
        &self.indexes
    }

    /// Replaces the row set with rows loaded from storage and rebuilds every
    /// index from them. Loaded index data is never trusted.
    pub(crate) fn restore_rows(&mut self, rows: Vec<(RowId, Row)>) {
        self.next_row_id = rows
            .iter()
            .map(|(id, _)| id.next())
            .max()
            .unwrap_or(RowId(0));
        self.rows = rows.into_iter().collect();

        let columns: Vec<String> = self.indexes.keys().cloned().collect();
        for column in columns {
            self.build_index(&column);
        }
    }
}
