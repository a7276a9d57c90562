use std::collections::HashMap;

use serde::Serialize;
use tracing::{info, warn};

use crate::ast::{LedgerAppend, Select, Statement};
use crate::error::{EngineError, Result};
use crate::ledger::{ChainVerification, LedgerEvent, LedgerRegistry};
use crate::parser;
use crate::row::Row;
use crate::storage::{DatabaseMetadata, MemoryStorage, Storage, TableMetadata};
use crate::table::{JoinKind, Schema, Table};
use crate::value::Value;

/// Outcome status of an executed statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Error,
}

/// Payload carried by a successful statement, one variant per result kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResultData {
    Rows(Vec<Row>),
    Tables(Vec<String>),
    Events(Vec<LedgerEvent>),
    Verification(ChainVerification),
    Appended {
        sequence_id: u64,
        current_hash: String,
    },
}

/// The uniform shape every statement execution reports back, whatever the
/// statement kind and whether it succeeded.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub status: ResultStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ResultData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl ExecutionResult {
    fn success(message: impl Into<String>) -> Self {
        Self {
            status: ResultStatus::Success,
            message: message.into(),
            data: None,
            count: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResultStatus::Error,
            message: message.into(),
            data: None,
            count: None,
        }
    }

    fn with_data(mut self, data: ResultData) -> Self {
        self.data = Some(data);
        self
    }

    fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }

    /// The returned rows, when the statement produced any.
    pub fn rows(&self) -> Option<&[Row]> {
        match &self.data {
            Some(ResultData::Rows(rows)) => Some(rows),
            _ => None,
        }
    }
}

impl From<EngineError> for ExecutionResult {
    fn from(error: EngineError) -> Self {
        Self::error(error.to_string())
    }
}

/// The main entry point of the engine.
///
/// Owns the named tables, the ledger registry and the persistence
/// collaborator, parses statement text, dispatches to the matching table or
/// ledger operation, and normalizes every outcome into an [ExecutionResult].
pub struct Database {
    name: String,
    tables: HashMap<String, Table>,
    ledger: LedgerRegistry,
    storage: Box<dyn Storage>,
}

impl Database {
    /// Opens a database backed by `storage`, hydrating any tables the
    /// collaborator already knows about. Indexes are rebuilt from the loaded
    /// rows, never read from disk.
    pub fn open(name: impl Into<String>, storage: Box<dyn Storage>) -> Result<Self> {
        let mut db = Self {
            name: name.into(),
            tables: HashMap::new(),
            ledger: LedgerRegistry::new(),
            storage,
        };

        if let Some(metadata) = db.storage.load_metadata()? {
            for (table_name, meta) in metadata.tables {
                let mut table = Table::create(
                    table_name.clone(),
                    Schema {
                        columns: meta.columns,
                    },
                    meta.primary_key,
                    meta.unique_keys,
                )?;
                table.restore_rows(db.storage.load_table_data(&table_name)?);
                db.tables.insert(table_name, table);
            }
            info!(database = %db.name, tables = db.tables.len(), "database hydrated");
        }

        Ok(db)
    }

    /// In-memory database for tests and demos; nothing touches disk.
    pub fn in_memory() -> Self {
        Self {
            name: "default".into(),
            tables: HashMap::new(),
            ledger: LedgerRegistry::new(),
            storage: Box::new(MemoryStorage::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Retrieves a table by name.
    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Retrieves a mutable table by name.
    pub fn get_table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.get_mut(name)
    }

    /// All table names, sorted.
    pub fn list_tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }

    /// The ledger registry owned by this database.
    pub fn ledger(&self) -> &LedgerRegistry {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut LedgerRegistry {
        &mut self.ledger
    }

    /// Creates a table and persists the new catalog.
    ///
    /// # Errors
    /// [EngineError::AlreadyExists] when the name is taken, schema errors
    /// from [Table::create], or a storage error (the in-memory table is kept
    /// in that case).
    pub fn create_table(
        &mut self,
        name: impl Into<String>,
        schema: Schema,
        primary_key: Option<String>,
        unique_keys: Vec<String>,
    ) -> Result<()> {
        let name = name.into();
        if self.tables.contains_key(&name) {
            return Err(EngineError::AlreadyExists(name));
        }
        let table = Table::create(name.clone(), schema, primary_key, unique_keys)?;
        self.tables.insert(name.clone(), table);
        info!(table = %name, "table created");
        self.persist_table(&name)
    }

    /// Drops a table, removing its persisted data as well.
    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        if self.tables.remove(name).is_none() {
            return Err(EngineError::TableNotFound(name.to_string()));
        }
        info!(table = %name, "table dropped");
        self.storage.delete_table(name)?;
        self.save_metadata()
    }

    /// Cross-table join entry point; validates both tables exist before
    /// delegating to [Table::join].
    pub fn join_tables(
        &self,
        left: &str,
        right: &str,
        left_key: &str,
        right_key: &str,
        kind: JoinKind,
    ) -> Result<Vec<Row>> {
        let left_table = self
            .tables
            .get(left)
            .ok_or_else(|| EngineError::TableNotFound(left.to_string()))?;
        let right_table = self
            .tables
            .get(right)
            .ok_or_else(|| EngineError::TableNotFound(right.to_string()))?;
        Ok(left_table.join(right_table, left_key, right_key, kind))
    }

    /// Flushes every table and the database metadata to the collaborator.
    pub fn save(&self) -> Result<()> {
        for (name, table) in &self.tables {
            self.storage.save_table(name, table.rows(), table.indexes())?;
        }
        self.save_metadata()
    }

    /// Parses and executes one statement.
    ///
    /// Every outcome, including parse errors, constraint violations and
    /// storage failures, is folded into the returned [ExecutionResult];
    /// this method never panics or returns `Err`.
    ///
    /// # Example
    /// ```
    /// # use auditdb::Database;
    /// let mut db = Database::in_memory();
    /// let result = db.execute("CREATE TABLE users (id INTEGER, PRIMARY KEY (id))");
    /// assert!(result.is_success());
    /// ```
    pub fn execute(&mut self, sql: &str) -> ExecutionResult {
        match parser::parse_statement(sql) {
            Ok(statement) => self
                .dispatch(statement)
                .unwrap_or_else(ExecutionResult::from),
            Err(error) => ExecutionResult::from(error),
        }
    }

    fn dispatch(&mut self, statement: Statement) -> Result<ExecutionResult> {
        match statement {
            Statement::CreateTable(create) => {
                let name = create.name.clone();
                self.create_table(
                    create.name,
                    Schema {
                        columns: create.columns,
                    },
                    create.primary_key,
                    create.unique_keys,
                )?;
                Ok(ExecutionResult::success(format!("Table '{name}' created")))
            }
            Statement::Insert(insert) => {
                let table = self
                    .tables
                    .get_mut(&insert.table)
                    .ok_or_else(|| EngineError::TableNotFound(insert.table.clone()))?;
                table.insert(insert.values)?;
                self.persist_table(&insert.table)?;
                Ok(
                    ExecutionResult::success(format!("Record inserted into '{}'", insert.table))
                        .with_count(1),
                )
            }
            Statement::Select(select) => self.execute_select(select),
            Statement::Update(update) => {
                let table = self
                    .tables
                    .get_mut(&update.table)
                    .ok_or_else(|| EngineError::TableNotFound(update.table.clone()))?;
                let count = table.update(&update.assignments, &update.conditions)?;
                self.persist_table(&update.table)?;
                Ok(ExecutionResult::success(format!("{count} row(s) updated")).with_count(count))
            }
            Statement::Delete(delete) => {
                let table = self
                    .tables
                    .get_mut(&delete.table)
                    .ok_or_else(|| EngineError::TableNotFound(delete.table.clone()))?;
                let count = table.delete(&delete.conditions);
                self.persist_table(&delete.table)?;
                Ok(ExecutionResult::success(format!("{count} row(s) deleted")).with_count(count))
            }
            Statement::DropTable { name } => {
                self.drop_table(&name)?;
                Ok(ExecutionResult::success(format!("Table '{name}' dropped")))
            }
            Statement::ShowTables => {
                let tables = self.list_tables();
                let count = tables.len();
                Ok(
                    ExecutionResult::success(format!("Found {count} table(s)"))
                        .with_data(ResultData::Tables(tables))
                        .with_count(count),
                )
            }
            Statement::LedgerCreate { table } => {
                self.ledger.create_table(&table)?;
                Ok(ExecutionResult::success(format!("Ledger '{table}' created")))
            }
            Statement::LedgerAppend(append) => self.execute_ledger_append(append),
            Statement::LedgerVerify { table } => {
                let ledger = self
                    .ledger
                    .get_table(&table)
                    .ok_or_else(|| EngineError::TableNotFound(table.clone()))?;
                let verification = ledger.verify_chain();
                let message = if verification.valid {
                    format!(
                        "Chain '{table}' is valid ({} event(s))",
                        verification.total_events
                    )
                } else {
                    format!(
                        "Chain '{table}' is broken: {} invalid event(s)",
                        verification.invalid_events.len()
                    )
                };
                let count = verification.total_events;
                Ok(ExecutionResult::success(message)
                    .with_data(ResultData::Verification(verification))
                    .with_count(count))
            }
            Statement::LedgerAudit {
                table,
                aggregate_id,
            } => {
                let ledger = self
                    .ledger
                    .get_table(&table)
                    .ok_or_else(|| EngineError::TableNotFound(table.clone()))?;
                let events = ledger.get_events(aggregate_id.as_deref());
                let count = events.len();
                Ok(ExecutionResult::success(format!("Found {count} event(s)"))
                    .with_data(ResultData::Events(events))
                    .with_count(count))
            }
        }
    }

    fn execute_select(&self, select: Select) -> Result<ExecutionResult> {
        let rows = match &select.join {
            Some(join) => {
                let mut rows = self.join_tables(
                    &select.table,
                    &join.table,
                    &join.left_key,
                    &join.right_key,
                    join.kind,
                )?;
                // joined rows carry no single schema, so conditions compare
                // loosely against the namespaced column names
                if !select.conditions.is_empty() {
                    rows.retain(|row| {
                        select.conditions.iter().all(|(column, expected)| {
                            row.get(column)
                                .is_some_and(|actual| actual.loosely_eq(expected))
                        })
                    });
                }
                if let Some(columns) = &select.columns {
                    rows = rows.iter().map(|row| project_row(row, columns)).collect();
                }
                if let Some(limit) = select.limit {
                    rows.truncate(limit);
                }
                rows
            }
            None => {
                let table = self
                    .tables
                    .get(&select.table)
                    .ok_or_else(|| EngineError::TableNotFound(select.table.clone()))?;
                table.select(&select.conditions, select.columns.as_deref(), select.limit)
            }
        };

        let count = rows.len();
        Ok(ExecutionResult::success("Query executed successfully")
            .with_data(ResultData::Rows(rows))
            .with_count(count))
    }

    fn execute_ledger_append(&mut self, append: LedgerAppend) -> Result<ExecutionResult> {
        let data: serde_json::Value = serde_json::from_str(&append.data)
            .map_err(|error| EngineError::Parse(format!("invalid JSON in DATA: {error}")))?;
        let ledger = self
            .ledger
            .get_table_mut(&append.table)
            .ok_or_else(|| EngineError::TableNotFound(append.table.clone()))?;
        let (sequence_id, current_hash) =
            ledger.append_event(&append.event_type, &data, append.aggregate_id.as_deref());
        Ok(ExecutionResult::success(format!(
            "Event {sequence_id} appended to '{}'",
            append.table
        ))
        .with_data(ResultData::Appended {
            sequence_id,
            current_hash,
        }))
    }

    /// Persists one table plus the catalog after a successful mutation. The
    /// in-memory mutation is kept even when the collaborator fails; the
    /// error surfaces in the execution result instead (no rollback).
    fn persist_table(&self, name: &str) -> Result<()> {
        let result = (|| {
            if let Some(table) = self.tables.get(name) {
                self.storage.save_table(name, table.rows(), table.indexes())?;
            }
            self.save_metadata()
        })();

        if let Err(error) = &result {
            warn!(table = %name, %error, "in-memory mutation kept but persistence failed");
        }
        result
    }

    fn save_metadata(&self) -> Result<()> {
        let metadata = DatabaseMetadata {
            name: self.name.clone(),
            tables: self
                .tables
                .iter()
                .map(|(name, table)| {
                    (
                        name.clone(),
                        TableMetadata {
                            columns: table.schema.columns.clone(),
                            primary_key: table.primary_key.clone(),
                            unique_keys: table.unique_keys.clone(),
                            row_count: table.row_count(),
                        },
                    )
                })
                .collect(),
        };
        self.storage.save_metadata(&metadata)
    }
}

fn project_row(row: &Row, columns: &[String]) -> Row {
    columns
        .iter()
        .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::ReplayDispatch;
    use crate::ledger::adjust_balance;
    use crate::storage::JsonStorage;

    fn db_with_users() -> Database {
        let mut db = Database::in_memory();
        let result = db.execute(
            "CREATE TABLE users (id INTEGER, name TEXT, PRIMARY KEY (id))",
        );
        assert!(result.is_success(), "{}", result.message);
        db
    }

    #[test]
    fn test_create_insert_select_delete_scenario() {
        let mut db = db_with_users();

        let result = db.execute("INSERT INTO users (id, name) VALUES (1, 'John')");
        assert!(result.is_success());
        assert_eq!(result.count, Some(1));

        let result = db.execute("SELECT * FROM users WHERE id = 1");
        assert!(result.is_success());
        let rows = result.rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("id"), Some(&Value::Int(1)));
        assert_eq!(rows[0].get("name"), Some(&Value::Text("John".into())));

        // duplicate primary key is an error result, not a fault
        let result = db.execute("INSERT INTO users (id, name) VALUES (1, 'Jane')");
        assert_eq!(result.status, ResultStatus::Error);
        assert!(result.message.contains("primary key"));

        let result = db.execute("DELETE FROM users WHERE id = 1");
        assert!(result.is_success());
        assert_eq!(result.count, Some(1));

        let result = db.execute("SELECT * FROM users WHERE id = 1");
        assert_eq!(result.rows().unwrap().len(), 0);
    }

    #[test]
    fn test_where_cast_equivalence_through_sql() {
        let mut db = db_with_users();
        db.execute("INSERT INTO users (id, name) VALUES (1, 'John')");

        let by_int = db.execute("SELECT * FROM users WHERE id = 1");
        let by_text = db.execute("SELECT * FROM users WHERE id = '1'");
        assert_eq!(by_int.rows(), by_text.rows());
        assert_eq!(by_int.count, Some(1));
    }

    #[test]
    fn test_update_statement() {
        let mut db = db_with_users();
        db.execute("INSERT INTO users (id, name) VALUES (1, 'John')");
        db.execute("INSERT INTO users (id, name) VALUES (2, 'Jane')");

        let result = db.execute("UPDATE users SET name = 'Johnny' WHERE id = 1");
        assert!(result.is_success());
        assert_eq!(result.count, Some(1));

        let rows = db.execute("SELECT name FROM users WHERE id = 1");
        assert_eq!(
            rows.rows().unwrap()[0].get("name"),
            Some(&Value::Text("Johnny".into()))
        );
    }

    #[test]
    fn test_show_and_drop_tables() {
        let mut db = db_with_users();
        db.execute("CREATE TABLE posts (id INTEGER)");

        let result = db.execute("SHOW TABLES");
        assert_eq!(
            result.data,
            Some(ResultData::Tables(vec![
                "posts".to_string(),
                "users".to_string()
            ]))
        );

        let result = db.execute("DROP TABLE posts");
        assert!(result.is_success());
        assert_eq!(db.list_tables(), vec!["users"]);

        let result = db.execute("DROP TABLE posts");
        assert_eq!(result.status, ResultStatus::Error);
        assert!(result.message.contains("not found"));
    }

    #[test]
    fn test_duplicate_table_is_error_result() {
        let mut db = db_with_users();
        let result = db.execute("CREATE TABLE users (id INTEGER)");
        assert_eq!(result.status, ResultStatus::Error);
        assert!(result.message.contains("already exists"));
    }

    #[test]
    fn test_parse_error_becomes_error_result() {
        let mut db = Database::in_memory();
        let result = db.execute("FROBNICATE EVERYTHING");
        assert_eq!(result.status, ResultStatus::Error);
        assert!(result.message.contains("parse error"));
    }

    #[test]
    fn test_select_join_statement() {
        let mut db = db_with_users();
        db.execute("CREATE TABLE orders (order_id INTEGER, user_id INTEGER, PRIMARY KEY (order_id))");
        db.execute("INSERT INTO users (id, name) VALUES (1, 'Ada')");
        db.execute("INSERT INTO users (id, name) VALUES (2, 'Grace')");
        db.execute("INSERT INTO orders (order_id, user_id) VALUES (10, 1)");
        db.execute("INSERT INTO orders (order_id, user_id) VALUES (11, 1)");

        let result =
            db.execute("SELECT * FROM users INNER JOIN orders ON users.id = orders.user_id");
        assert!(result.is_success());
        assert_eq!(result.count, Some(2));
        let rows = result.rows().unwrap();
        assert_eq!(rows[0].get("orders_order_id"), Some(&Value::Int(10)));

        let result =
            db.execute("SELECT * FROM users LEFT JOIN orders ON users.id = orders.user_id");
        assert_eq!(result.count, Some(3)); // two matches + unmatched Grace

        // WHERE filters the joined rows
        let result = db.execute(
            "SELECT * FROM users INNER JOIN orders ON users.id = orders.user_id \
             WHERE orders_order_id = 11",
        );
        assert_eq!(result.count, Some(1));
    }

    #[test]
    fn test_join_missing_table_names_the_missing_one() {
        let db = db_with_users();
        let result = db.join_tables("users", "ghost", "id", "user_id", JoinKind::Inner);
        match result {
            Err(EngineError::TableNotFound(name)) => assert_eq!(name, "ghost"),
            other => panic!("expected TableNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_ledger_statements_end_to_end() {
        let mut db = Database::in_memory();

        assert!(db.execute("LEDGER CREATE payments").is_success());

        let result = db.execute(
            "LEDGER APPEND payments TYPE='PAYMENT_RECEIVED' DATA='{\"amount\": 100}' \
             AGGREGATE='acct-1'",
        );
        assert!(result.is_success());
        match &result.data {
            Some(ResultData::Appended {
                sequence_id,
                current_hash,
            }) => {
                assert_eq!(*sequence_id, 0);
                assert_eq!(current_hash.len(), 64);
            }
            other => panic!("expected Appended, got {other:?}"),
        }

        db.execute(
            "LEDGER APPEND payments TYPE='PAYMENT_SENT' DATA='{\"amount\": 30}' \
             AGGREGATE='acct-1'",
        );

        let result = db.execute("LEDGER VERIFY payments");
        assert!(result.is_success());
        match &result.data {
            Some(ResultData::Verification(verification)) => {
                assert!(verification.valid);
                assert_eq!(verification.total_events, 2);
            }
            other => panic!("expected Verification, got {other:?}"),
        }

        let result = db.execute("LEDGER AUDIT payments AGGREGATE='acct-1'");
        assert_eq!(result.count, Some(2));

        let ledger = db.ledger().get_table("payments").unwrap();
        let state = ledger.replay_events("acct-1", &ReplayDispatch::payments());
        assert_eq!(
            state.get("balance").and_then(serde_json::Value::as_f64),
            Some(70.0)
        );
    }

    #[test]
    fn test_ledger_append_rejects_invalid_json() {
        let mut db = Database::in_memory();
        db.execute("LEDGER CREATE payments");

        let result = db.execute("LEDGER APPEND payments TYPE='X' DATA='not json'");
        assert_eq!(result.status, ResultStatus::Error);
        assert!(result.message.contains("invalid JSON"));
        assert!(db.ledger().get_table("payments").unwrap().is_empty());
    }

    #[test]
    fn test_ledger_duplicate_create_is_error_result() {
        let mut db = Database::in_memory();
        db.execute("LEDGER CREATE payments");
        let result = db.execute("LEDGER CREATE payments");
        assert_eq!(result.status, ResultStatus::Error);
    }

    #[test]
    fn test_replay_with_custom_dispatch() {
        let mut db = Database::in_memory();
        db.execute("LEDGER CREATE t");
        db.execute("LEDGER APPEND t TYPE='DEPOSIT' DATA='{\"amount\": 100}' AGGREGATE='acct-1'");
        db.execute("LEDGER APPEND t TYPE='WITHDRAW' DATA='{\"amount\": 30}' AGGREGATE='acct-1'");

        let dispatch = ReplayDispatch::new()
            .on("DEPOSIT", |state, data| adjust_balance(state, data, 1.0))
            .on("WITHDRAW", |state, data| adjust_balance(state, data, -1.0));

        let state = db
            .ledger()
            .get_table("t")
            .unwrap()
            .replay_events("acct-1", &dispatch);
        assert_eq!(
            state.get("balance").and_then(serde_json::Value::as_f64),
            Some(70.0)
        );
    }

    #[test]
    fn test_persistence_round_trip_through_json_storage() {
        let dir = tempfile::tempdir().unwrap();

        {
            let storage = JsonStorage::new(dir.path(), "appdb").unwrap();
            let mut db = Database::open("appdb", Box::new(storage)).unwrap();
            db.execute("CREATE TABLE users (id INTEGER, name TEXT, PRIMARY KEY (id))");
            db.execute("INSERT INTO users (id, name) VALUES (1, 'Ada')");
            db.execute("INSERT INTO users (id, name) VALUES (2, 'Grace')");
            db.execute("DELETE FROM users WHERE id = 2");
        }

        // a fresh handle over the same directory sees the persisted state
        let storage = JsonStorage::new(dir.path(), "appdb").unwrap();
        let mut db = Database::open("appdb", Box::new(storage)).unwrap();

        assert_eq!(db.list_tables(), vec!["users"]);
        let result = db.execute("SELECT * FROM users");
        assert_eq!(result.count, Some(1));
        assert_eq!(
            result.rows().unwrap()[0].get("name"),
            Some(&Value::Text("Ada".into()))
        );

        // hydrated indexes still enforce constraints
        let result = db.execute("INSERT INTO users (id, name) VALUES (1, 'Imposter')");
        assert_eq!(result.status, ResultStatus::Error);

        // and new row ids do not collide with restored ones
        let result = db.execute("INSERT INTO users (id, name) VALUES (3, 'Brian')");
        assert!(result.is_success());
        assert_eq!(db.get_table("users").unwrap().row_count(), 2);
    }

    #[test]
    fn test_save_flushes_all_tables() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path(), "appdb").unwrap();
        let mut db = Database::open("appdb", Box::new(storage)).unwrap();

        db.execute("CREATE TABLE a (id INTEGER)");
        db.execute("CREATE TABLE b (id INTEGER)");
        db.save().unwrap();

        let storage = JsonStorage::new(dir.path(), "appdb").unwrap();
        let reopened = Database::open("appdb", Box::new(storage)).unwrap();
        assert_eq!(reopened.list_tables(), vec!["a", "b"]);
    }
}
