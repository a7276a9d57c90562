use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Stable, immutable identifier for a stored row.
///
/// Ids are handed out by the owning table from a monotonically increasing
/// counter and are never reused, so secondary indexes can reference rows
/// without caring about physical layout or deletion order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct RowId(pub u64);

impl RowId {
    /// The id that follows this one.
    pub fn next(self) -> RowId {
        RowId(self.0 + 1)
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single stored row: an ordered mapping from column name to typed value.
/// Only the columns supplied at insert time are present.
pub type Row = BTreeMap<String, Value>;

/// Builds a [Row] from `(column, value)` pairs.
pub fn row<K, I>(pairs: I) -> Row
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Value)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
