use std::collections::HashMap;

use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};

use crate::row::RowId;
use crate::value::Value;

/// Single-column secondary index: maps each indexed value to the ordered
/// list of rows currently holding it.
///
/// The owning table keeps every entry exact on insert, update and delete;
/// `NULL` values are never indexed.
#[derive(Debug, Clone, Default)]
pub struct Index {
    entries: HashMap<Value, Vec<RowId>>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `id` holds `value`.
    pub fn insert(&mut self, value: Value, id: RowId) {
        self.entries.entry(value).or_default().push(id);
    }

    /// Forgets that `id` holds `value`, dropping the entry once empty.
    pub fn remove(&mut self, value: &Value, id: RowId) {
        if let Some(ids) = self.entries.get_mut(value) {
            ids.retain(|existing| *existing != id);
            if ids.is_empty() {
                self.entries.remove(value);
            }
        }
    }

    /// The rows currently holding `value`, in insertion order.
    pub fn get(&self, value: &Value) -> &[RowId] {
        self.entries.get(value).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether any row holds `value`.
    pub fn contains(&self, value: &Value) -> bool {
        !self.get(value).is_empty()
    }

    /// Whether a row other than `id` holds `value`. Used by uniqueness
    /// checks so an update can keep a row's own value.
    pub fn conflicts_with(&self, value: &Value, id: RowId) -> bool {
        self.get(value).iter().any(|existing| *existing != id)
    }

    /// Number of distinct indexed values.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &[RowId])> {
        self.entries.iter().map(|(value, ids)| (value, ids.as_slice()))
    }
}

// JSON object keys must be strings, so an index serializes as a list of
// (value, rows) pairs, sorted by rendered value for stable output.
impl Serialize for Index {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut pairs: Vec<(&Value, &Vec<RowId>)> = self.entries.iter().collect();
        pairs.sort_by_key(|(value, _)| value.to_string());
        serializer.collect_seq(pairs)
    }
}

impl<'de> Deserialize<'de> for Index {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let pairs = Vec::<(Value, Vec<RowId>)>::deserialize(deserializer)?;
        Ok(Self {
            entries: pairs.into_iter().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut index = Index::new();
        index.insert(Value::Int(1), RowId(0));
        index.insert(Value::Int(1), RowId(2));
        index.insert(Value::Int(2), RowId(1));

        assert_eq!(index.get(&Value::Int(1)), &[RowId(0), RowId(2)]);
        assert_eq!(index.get(&Value::Int(2)), &[RowId(1)]);
        assert_eq!(index.get(&Value::Int(99)), &[] as &[RowId]);
    }

    #[test]
    fn test_remove_drops_empty_entries() {
        let mut index = Index::new();
        index.insert(Value::Text("a".into()), RowId(0));
        index.remove(&Value::Text("a".into()), RowId(0));

        assert!(!index.contains(&Value::Text("a".into())));
        assert!(index.is_empty());
    }

    #[test]
    fn test_conflicts_with_excludes_self() {
        let mut index = Index::new();
        index.insert(Value::Int(5), RowId(3));

        assert!(!index.conflicts_with(&Value::Int(5), RowId(3)));
        assert!(index.conflicts_with(&Value::Int(5), RowId(4)));
    }

    #[test]
    fn test_serde_round_trip() {
        let mut index = Index::new();
        index.insert(Value::Int(1), RowId(0));
        index.insert(Value::Text("x".into()), RowId(1));

        let json = serde_json::to_string(&index).unwrap();
        let back: Index = serde_json::from_str(&json).unwrap();

        assert_eq!(back.get(&Value::Int(1)), &[RowId(0)]);
        assert_eq!(back.get(&Value::Text("x".into())), &[RowId(1)]);
    }
}
