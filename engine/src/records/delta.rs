//! Delta reconciliation — apply an editing surface's patch over a base collection.
//!
//! A delta is always relative to one base snapshot. Application order is
//! fixed: field edits, then deletions by *original* index, then appends.
//! The operation is pure and total: malformed input degrades, it never fails.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use super::types::RowMap;

/// Edit patch produced by an editing surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    /// Base index (string form) → partial mapping of changed fields.
    #[serde(default)]
    pub edited_rows: BTreeMap<String, Value>,
    /// Base indices to remove, interpreted against the pre-edit ordering.
    #[serde(default)]
    pub deleted_rows: BTreeSet<usize>,
    /// Whole new rows appended after deletions.
    #[serde(default)]
    pub added_rows: Vec<Value>,
}

impl Delta {
    /// An empty delta: reconciling with it copies the base unchanged.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn edit(mut self, index: usize, changes: Value) -> Self {
        self.edited_rows.insert(index.to_string(), changes);
        self
    }

    pub fn delete(mut self, index: usize) -> Self {
        self.deleted_rows.insert(index);
        self
    }

    pub fn add(mut self, row: Value) -> Self {
        self.added_rows.push(row);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.edited_rows.is_empty() && self.deleted_rows.is_empty() && self.added_rows.is_empty()
    }

    /// Decode a delta leniently from arbitrary JSON.
    ///
    /// Missing or ill-typed parts become empty; deleted indices that are not
    /// non-negative integers are ignored. Never fails.
    pub fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::default();
        };

        let edited_rows = obj
            .get("edited_rows")
            .and_then(Value::as_object)
            .map(|edits| {
                edits
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();

        let deleted_rows = obj
            .get("deleted_rows")
            .and_then(Value::as_array)
            .map(|indices| {
                indices
                    .iter()
                    .filter_map(Value::as_u64)
                    .filter_map(|i| usize::try_from(i).ok())
                    .collect()
            })
            .unwrap_or_default();

        let added_rows = obj
            .get("added_rows")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Self {
            edited_rows,
            deleted_rows,
            added_rows,
        }
    }
}

/// Apply `delta` over `base`.
///
/// 1. A base that is not an array of objects yields only the delta's added rows.
/// 2. Edits overwrite fields on a copy of the row at the matching index.
/// 3. Rows whose original index is in `deleted_rows` are dropped.
/// 4. Object entries of `added_rows` are appended; anything else is dropped.
pub fn reconcile(base: &Value, delta: &Delta) -> Vec<RowMap> {
    let Some(base_rows) = as_rows(base) else {
        tracing::debug!("base collection is not a list of rows; keeping added rows only");
        return added_rows(delta);
    };

    let mut result: Vec<RowMap> = base_rows
        .into_iter()
        .enumerate()
        .filter(|(index, _)| !delta.deleted_rows.contains(index))
        .map(|(index, row)| {
            let mut row = row.clone();
            if let Some(Value::Object(changes)) = delta.edited_rows.get(&index.to_string()) {
                for (field, value) in changes {
                    row.insert(field.clone(), value.clone());
                }
            }
            row
        })
        .collect();

    result.extend(added_rows(delta));
    result
}

fn as_rows(base: &Value) -> Option<Vec<&RowMap>> {
    base.as_array()?.iter().map(Value::as_object).collect()
}

fn added_rows(delta: &Delta) -> Vec<RowMap> {
    delta
        .added_rows
        .iter()
        .filter_map(Value::as_object)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Value {
        json!([
            {"id": "A", "description": "first"},
            {"id": "B", "description": "second"},
            {"id": "C", "description": "third"}
        ])
    }

    fn ids(rows: &[RowMap]) -> Vec<&str> {
        rows.iter()
            .map(|r| r.get("id").and_then(Value::as_str).unwrap_or(""))
            .collect()
    }

    #[test]
    fn deletion_uses_pre_edit_indices() {
        let delta = Delta::new()
            .edit(1, json!({"description": "X"}))
            .delete(0)
            .add(json!({"id": "N"}));

        let result = reconcile(&base(), &delta);
        assert_eq!(ids(&result), vec!["B", "C", "N"]);
        assert_eq!(result[0]["description"], json!("X"));
        assert_eq!(result[1]["description"], json!("third"));
    }

    #[test]
    fn inputs_are_not_mutated() {
        let base = base();
        let delta = Delta::new()
            .edit(0, json!({"description": "changed"}))
            .delete(2)
            .add(json!({"id": "N"}));
        let base_before = base.clone();
        let delta_before = delta.clone();

        let mut result = reconcile(&base, &delta);
        result[0].insert("id".into(), json!("mutated"));

        assert_eq!(base, base_before);
        assert_eq!(delta, delta_before);
    }

    #[test]
    fn edit_and_delete_on_same_row_drops_it() {
        let delta = Delta::new().edit(0, json!({"description": "X"})).delete(0);
        let result = reconcile(&base(), &delta);
        assert_eq!(ids(&result), vec!["B", "C"]);
    }

    #[test]
    fn malformed_base_keeps_only_added_rows() {
        let delta = Delta::new()
            .delete(0)
            .add(json!({"id": "N"}))
            .add(json!("not a row"));
        assert_eq!(ids(&reconcile(&json!({"rows": []}), &delta)), vec!["N"]);
        assert_eq!(ids(&reconcile(&json!([1, 2]), &delta)), vec!["N"]);
        assert!(reconcile(&Value::Null, &Delta::new()).is_empty());
    }

    #[test]
    fn non_object_edits_and_out_of_range_indices_are_ignored() {
        let delta = Delta::new().edit(0, json!("bogus")).edit(9, json!({"id": "Z"})).delete(42);
        let result = reconcile(&base(), &delta);
        assert_eq!(ids(&result), vec!["A", "B", "C"]);
        assert_eq!(result[0]["description"], json!("first"));
    }

    #[test]
    fn lenient_decoding_drops_ill_typed_parts() {
        let delta = Delta::from_value(&json!({
            "edited_rows": {"1": {"description": "X"}},
            "deleted_rows": [0, -1, "2", 2.5],
            "added_rows": "nope"
        }));
        assert_eq!(delta.deleted_rows, BTreeSet::from([0]));
        assert!(delta.added_rows.is_empty());
        assert_eq!(delta.edited_rows.len(), 1);

        assert!(Delta::from_value(&json!([1, 2, 3])).is_empty());
    }
}
