use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::index::Index;
use crate::row::{Row, RowId};
use crate::table::ColumnDef;

/// Database-wide metadata: the table list with schemas and key columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseMetadata {
    pub name: String,
    pub tables: BTreeMap<String, TableMetadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMetadata {
    pub columns: Vec<ColumnDef>,
    pub primary_key: Option<String>,
    pub unique_keys: Vec<String>,
    pub row_count: usize,
}

/// The persistence collaborator contract.
///
/// The engine calls these after each mutation and at open time; it never
/// assumes anything about the bytes behind them. Implementations are free to
/// store rows however they like as long as `load_table_data` returns what
/// `save_table` was last given.
pub trait Storage {
    fn save_metadata(&self, metadata: &DatabaseMetadata) -> Result<()>;
    fn load_metadata(&self) -> Result<Option<DatabaseMetadata>>;
    fn save_table(
        &self,
        name: &str,
        rows: &BTreeMap<RowId, Row>,
        indexes: &HashMap<String, Index>,
    ) -> Result<()>;
    fn load_table_data(&self, name: &str) -> Result<Vec<(RowId, Row)>>;
    fn delete_table(&self, name: &str) -> Result<()>;
}

/// On-disk form of one table: rows plus a snapshot of its indexes. The index
/// snapshot is written for inspection; the engine rebuilds indexes from rows
/// on load and never trusts the stored copy.
#[derive(Serialize, Deserialize)]
struct TableFile {
    rows: Vec<TableRow>,
    indexes: BTreeMap<String, Index>,
}

#[derive(Serialize, Deserialize)]
struct TableRow {
    id: RowId,
    values: Row,
}

/// Stock collaborator: one pretty-printed JSON file per table plus
/// `metadata.json`, all under `<root>/<database>/`.
pub struct JsonStorage {
    data_dir: PathBuf,
}

impl JsonStorage {
    /// # Errors
    /// Fails if the data directory cannot be created.
    pub fn new(root: impl AsRef<Path>, database: &str) -> Result<Self> {
        let data_dir = root.as_ref().join(database);
        fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    fn table_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{name}.json"))
    }

    fn metadata_path(&self) -> PathBuf {
        self.data_dir.join("metadata.json")
    }
}

impl Storage for JsonStorage {
    fn save_metadata(&self, metadata: &DatabaseMetadata) -> Result<()> {
        let json = serde_json::to_string_pretty(metadata)?;
        fs::write(self.metadata_path(), json)?;
        Ok(())
    }

    fn load_metadata(&self) -> Result<Option<DatabaseMetadata>> {
        let path = self.metadata_path();
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn save_table(
        &self,
        name: &str,
        rows: &BTreeMap<RowId, Row>,
        indexes: &HashMap<String, Index>,
    ) -> Result<()> {
        let file = TableFile {
            rows: rows
                .iter()
                .map(|(id, values)| TableRow {
                    id: *id,
                    values: values.clone(),
                })
                .collect(),
            indexes: indexes
                .iter()
                .map(|(column, index)| (column.clone(), index.clone()))
                .collect(),
        };
        fs::write(self.table_path(name), serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }

    fn load_table_data(&self, name: &str) -> Result<Vec<(RowId, Row)>> {
        let path = self.table_path(name);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file: TableFile = serde_json::from_str(&fs::read_to_string(path)?)?;
        Ok(file.rows.into_iter().map(|row| (row.id, row.values)).collect())
    }

    fn delete_table(&self, name: &str) -> Result<()> {
        let path = self.table_path(name);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// In-process collaborator for tests and demos; the engine is single
/// threaded (callers serialize access), so a [RefCell] is all the interior
/// mutability needed.
#[derive(Default)]
pub struct MemoryStorage {
    metadata: RefCell<Option<DatabaseMetadata>>,
    tables: RefCell<HashMap<String, Vec<(RowId, Row)>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn save_metadata(&self, metadata: &DatabaseMetadata) -> Result<()> {
        *self.metadata.borrow_mut() = Some(metadata.clone());
        Ok(())
    }

    fn load_metadata(&self) -> Result<Option<DatabaseMetadata>> {
        Ok(self.metadata.borrow().clone())
    }

    fn save_table(
        &self,
        name: &str,
        rows: &BTreeMap<RowId, Row>,
        _indexes: &HashMap<String, Index>,
    ) -> Result<()> {
        self.tables.borrow_mut().insert(
            name.to_string(),
            rows.iter().map(|(id, row)| (*id, row.clone())).collect(),
        );
        Ok(())
    }

    fn load_table_data(&self, name: &str) -> Result<Vec<(RowId, Row)>> {
        Ok(self.tables.borrow().get(name).cloned().unwrap_or_default())
    }

    fn delete_table(&self, name: &str) -> Result<()> {
        self.tables.borrow_mut().remove(name);
        Ok(())
    }
}
