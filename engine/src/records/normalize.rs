//! Record normalization — edited rows back into the canonical schema.
//!
//! Inverse of [`super::editable_view`]: `_edit` strings are split on newlines,
//! trimmed, and blank lines dropped. When a row has no `_edit` field the
//! canonical sequence is read instead, so normalizing already-normalized
//! records is a no-op.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

use super::types::{
    value_to_text, Record, TestType, EDIT_SUFFIX, PRECONDITIONS, PRECONDITIONS_EDIT, STEPS,
    STEPS_EDIT,
};

/// Prefix for ids synthesized when a row has none.
pub const AUTOGEN_ID_PREFIX: &str = "TC_AutoGen_ID_";

const DEFAULT_TEXT: &str = "N/A";

const CONSUMED_FIELDS: &[&str] = &["id", "description", "test_type", "expected_outcome"];

/// Normalize free-form rows into records.
///
/// Non-object elements are skipped; output order follows input order. An
/// empty result means there is nothing to generate from, which callers must
/// report rather than treat as an error.
pub fn normalize(raw: &[Value]) -> Vec<Record> {
    let mut records = Vec::with_capacity(raw.len());
    for row in raw.iter().filter_map(Value::as_object) {
        let position = records.len() + 1;

        let id = row
            .get("id")
            .and_then(value_to_text)
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("{AUTOGEN_ID_PREFIX}{position}"));

        let text_or_default = |field: &str, default: &str| {
            row.get(field)
                .and_then(value_to_text)
                .unwrap_or_else(|| default.to_string())
        };

        let extra: BTreeMap<String, Value> = row
            .iter()
            .filter(|(key, _)| {
                !CONSUMED_FIELDS.contains(&key.as_str())
                    && !key.ends_with(EDIT_SUFFIX)
                    && key.as_str() != PRECONDITIONS
                    && key.as_str() != STEPS
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        records.push(Record {
            id,
            description: text_or_default("description", DEFAULT_TEXT),
            preconditions: sequence_field(row, PRECONDITIONS_EDIT, PRECONDITIONS),
            test_type: TestType::from(text_or_default("test_type", TestType::Functional.as_str())),
            steps: sequence_field(row, STEPS_EDIT, STEPS),
            expected_outcome: text_or_default("expected_outcome", DEFAULT_TEXT),
            extra,
        });
    }
    records
}

fn sequence_field(row: &serde_json::Map<String, Value>, edit_key: &str, key: &str) -> Vec<String> {
    match row.get(edit_key) {
        Some(edited) => value_to_text(edited)
            .map(|text| split_lines(&text))
            .unwrap_or_default(),
        None => match row.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(value_to_text)
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect(),
            Some(Value::String(text)) => split_lines(text),
            _ => Vec::new(),
        },
    }
}

fn split_lines(text: &str) -> Vec<String> {
    text.split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

/// A problem that makes a normalized collection unfit for script generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CollectionIssue {
    DuplicateId { id: String },
    NoSteps { id: String },
}

impl std::fmt::Display for CollectionIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateId { id } => write!(f, "duplicate test case id `{id}`"),
            Self::NoSteps { id } => write!(f, "test case `{id}` has no steps"),
        }
    }
}

/// Check the collection invariants: unique ids and non-empty steps.
pub fn validate_collection(records: &[Record]) -> Vec<CollectionIssue> {
    let mut seen = HashSet::new();
    let mut issues = Vec::new();
    for record in records {
        if !seen.insert(record.id.as_str()) {
            issues.push(CollectionIssue::DuplicateId {
                id: record.id.clone(),
            });
        }
        if record.steps.is_empty() {
            issues.push(CollectionIssue::NoSteps {
                id: record.id.clone(),
            });
        }
    }
    issues
}
