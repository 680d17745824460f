//! Payload repair — recover structured data from free-form model output.
//!
//! Each pass has a narrow scope and is tested on its own. They always run in
//! the order of [`RepairPass::PIPELINE`]:
//!
//! ```text
//! StripFences → LocateArray → TrailingCommas → IndexPrefixes → serde_json
//! ```
//!
//! The passes are textual. `TrailingCommas` and `IndexPrefixes` can touch
//! string contents that happen to look like the artifacts they remove; the
//! test-case payloads they target do not contain such text in practice.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use thiserror::Error;

static TRAILING_COMMA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",\s*([}\]])").unwrap());

static INDEX_PREFIX_AFTER_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\s*\d+\s*:\s*").unwrap());

static INDEX_PREFIX_AFTER_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*\d+\s*:\s*").unwrap());

static PYTHON_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)```python\s*(.*?)\s*```").unwrap());

static ANY_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z0-9_+\-]*\s*(.*?)\s*```").unwrap());

/// Why a payload could not be recovered.
#[derive(Debug, Error)]
pub enum RepairError {
    #[error("no JSON payload found in response")]
    NoPayload,

    #[error("invalid JSON after repair: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
        /// The text that was handed to the JSON parser.
        repaired: String,
    },

    #[error("expected a JSON array, found {found}")]
    NotAnArray { found: &'static str },
}

/// One independent repair step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairPass {
    /// Drop enclosing ``` fences, with or without a language tag.
    StripFences,
    /// Cut the text down to the outermost `[...]`, or wrap the outermost `{...}`.
    LocateArray,
    /// Remove commas that directly precede `]` or `}`.
    TrailingCommas,
    /// Remove `N:` prefixes injected before array elements.
    IndexPrefixes,
}

impl RepairPass {
    /// Fixed order used by [`parse_json_array`].
    pub const PIPELINE: [RepairPass; 4] = [
        Self::StripFences,
        Self::LocateArray,
        Self::TrailingCommas,
        Self::IndexPrefixes,
    ];

    pub fn apply(self, input: &str) -> Result<String, RepairError> {
        match self {
            Self::StripFences => Ok(strip_code_fences(input).to_string()),
            Self::LocateArray => locate_array(input).ok_or(RepairError::NoPayload),
            Self::TrailingCommas => Ok(remove_trailing_commas(input)),
            Self::IndexPrefixes => Ok(remove_index_prefixes(input)),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::StripFences => "strip_fences",
            Self::LocateArray => "locate_array",
            Self::TrailingCommas => "trailing_commas",
            Self::IndexPrefixes => "index_prefixes",
        }
    }
}

/// Strip one enclosing code fence. Text without a leading fence is only trimmed.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let tag_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '-')))
        .unwrap_or(rest.len());
    let body = &rest[tag_len..];
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// The outermost `[...]`; failing that, the outermost `{...}` wrapped as `[{...}]`.
///
/// An envelope such as `{"test_cases": [...]}` therefore yields the inner array.
pub fn locate_array(text: &str) -> Option<String> {
    match (text.find('['), text.rfind(']')) {
        (Some(start), Some(end)) if start < end => return Some(text[start..=end].to_string()),
        _ => {}
    }
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => Some(format!("[{}]", &text[start..=end])),
        _ => None,
    }
}

pub fn remove_trailing_commas(text: &str) -> String {
    TRAILING_COMMA.replace_all(text, "$1").into_owned()
}

pub fn remove_index_prefixes(text: &str) -> String {
    let text = INDEX_PREFIX_AFTER_OPEN.replace_all(text, "[");
    INDEX_PREFIX_AFTER_COMMA.replace_all(&text, ",").into_owned()
}

/// Run every repair pass and parse the result as a JSON array.
pub fn parse_json_array(raw: &str) -> Result<Vec<Value>, RepairError> {
    let mut text = raw.to_string();
    for pass in RepairPass::PIPELINE {
        text = pass.apply(&text)?;
        tracing::trace!(pass = pass.name(), len = text.len(), "repair pass applied");
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(other) => Err(RepairError::NotAnArray {
            found: json_kind(&other),
        }),
        Err(source) => Err(RepairError::InvalidJson {
            source,
            repaired: text,
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Extract a script from a model response.
///
/// Prefers a ```python fence, then any fence, then a bare response that
/// already starts like Python source. Returns `None` when nothing usable is found.
pub fn extract_script_block(raw: &str) -> Option<String> {
    let fenced = PYTHON_FENCE
        .captures(raw)
        .or_else(|| ANY_FENCE.captures(raw))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string());

    if let Some(code) = fenced {
        return (!code.is_empty()).then_some(code);
    }

    let bare = raw.trim();
    if bare.starts_with("import ") || bare.starts_with("from ") || bare.starts_with("#!") {
        tracing::warn!("response has no code fence but looks like source; using it whole");
        return Some(bare.to_string());
    }
    None
}
