//! Record model and the editable view.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One row as seen by an editing surface: an unconstrained JSON object.
pub type RowMap = serde_json::Map<String, Value>;

/// Field names of the canonical sequence fields.
pub const PRECONDITIONS: &str = "preconditions";
pub const STEPS: &str = "steps";

/// Suffix carried by flattened, newline-joined edit fields.
pub const EDIT_SUFFIX: &str = "_edit";
pub const PRECONDITIONS_EDIT: &str = "preconditions_edit";
pub const STEPS_EDIT: &str = "steps_edit";

/// Category of a test case.
///
/// The fixed option set offered to editors. Labels outside the set are kept
/// verbatim in [`TestType::Custom`] so a model's own vocabulary survives a
/// round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TestType {
    Functional,
    Ui,
    Negative,
    Security,
    Performance,
    Usability,
    Accessibility,
    EdgeCase,
    Boundary,
    Other,
    Custom(String),
}

impl TestType {
    /// Labels offered by editing surfaces, in display order.
    pub const OPTIONS: [&'static str; 10] = [
        "Functional",
        "UI",
        "Negative",
        "Security",
        "Performance",
        "Usability",
        "Accessibility",
        "Edge Case",
        "Boundary",
        "Other",
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Self::Functional => "Functional",
            Self::Ui => "UI",
            Self::Negative => "Negative",
            Self::Security => "Security",
            Self::Performance => "Performance",
            Self::Usability => "Usability",
            Self::Accessibility => "Accessibility",
            Self::EdgeCase => "Edge Case",
            Self::Boundary => "Boundary",
            Self::Other => "Other",
            Self::Custom(label) => label,
        }
    }

    /// Whether this label is one of [`TestType::OPTIONS`].
    pub fn is_standard(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }
}

impl Default for TestType {
    fn default() -> Self {
        Self::Functional
    }
}

impl From<String> for TestType {
    fn from(label: String) -> Self {
        match label.as_str() {
            "Functional" => Self::Functional,
            "UI" => Self::Ui,
            "Negative" => Self::Negative,
            "Security" => Self::Security,
            "Performance" => Self::Performance,
            "Usability" => Self::Usability,
            "Accessibility" => Self::Accessibility,
            "Edge Case" => Self::EdgeCase,
            "Boundary" => Self::Boundary,
            "Other" => Self::Other,
            _ => Self::Custom(label),
        }
    }
}

impl From<&str> for TestType {
    fn from(label: &str) -> Self {
        Self::from(label.to_string())
    }
}

impl From<TestType> for String {
    fn from(test_type: TestType) -> Self {
        match test_type {
            TestType::Custom(label) => label,
            other => other.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for TestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A canonical test case consumed by script generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub preconditions: Vec<String>,
    #[serde(default)]
    pub test_type: TestType,
    #[serde(default)]
    pub steps: Vec<String>,
    pub expected_outcome: String,
    /// Keys the schema does not know about, carried through untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Record {
    /// A record is usable downstream only when it has an id and at least one step.
    pub fn is_usable(&self) -> bool {
        !self.id.trim().is_empty() && !self.steps.is_empty()
    }

    /// The record as a plain JSON object.
    pub fn to_row(&self) -> RowMap {
        let mut row = RowMap::new();
        row.insert("id".into(), Value::String(self.id.clone()));
        row.insert(
            "description".into(),
            Value::String(self.description.clone()),
        );
        row.insert(PRECONDITIONS.into(), strings_to_value(&self.preconditions));
        row.insert(
            "test_type".into(),
            Value::String(self.test_type.as_str().to_string()),
        );
        row.insert(STEPS.into(), strings_to_value(&self.steps));
        row.insert(
            "expected_outcome".into(),
            Value::String(self.expected_outcome.clone()),
        );
        for (key, value) in &self.extra {
            row.entry(key.clone()).or_insert_with(|| value.clone());
        }
        row
    }
}

fn strings_to_value(items: &[String]) -> Value {
    Value::Array(items.iter().cloned().map(Value::String).collect())
}

/// Flatten generated test cases into rows suitable for inline editing.
///
/// Each object is copied; `preconditions` and `steps` are joined with `\n`
/// into `preconditions_edit` / `steps_edit` and removed from the row.
/// Elements that are not objects are skipped.
pub fn editable_view(raw: &[Value]) -> Vec<RowMap> {
    raw.iter()
        .filter_map(Value::as_object)
        .map(|case| {
            let mut row = case.clone();
            let preconditions = row.remove(PRECONDITIONS);
            let steps = row.remove(STEPS);
            row.insert(
                PRECONDITIONS_EDIT.into(),
                Value::String(join_lines(preconditions.as_ref())),
            );
            row.insert(STEPS_EDIT.into(), Value::String(join_lines(steps.as_ref())));
            row
        })
        .collect()
}

fn join_lines(value: Option<&Value>) -> String {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(value_to_text)
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

/// Render a scalar JSON value as text. `null` has no text.
pub(crate) fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// A base collection of editable rows tagged with a monotonic version.
///
/// Deltas are only meaningful against the snapshot they were computed from;
/// the version lets a session reject a delta aimed at an older collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u64,
    pub rows: Vec<RowMap>,
}

impl Snapshot {
    pub fn new(version: u64, rows: Vec<RowMap>) -> Self {
        Self { version, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The rows as a JSON array, the shape [`crate::reconcile`] expects.
    pub fn to_value(&self) -> Value {
        Value::Array(self.rows.iter().cloned().map(Value::Object).collect())
    }
}
