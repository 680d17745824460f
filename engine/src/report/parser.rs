//! Outcome parsing from captured stdout.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static OUTCOME_RECORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)TEST_RESULT_START\s*ID:[ \t]*([^\n]*?)\s*DESCRIPTION:[ \t]*([^\n]*?)\s*STATUS:[ \t]*([^\n]*?)\s*MESSAGE:\s*(.*?)\s*TEST_RESULT_END",
    )
    .unwrap()
});

static SUMMARY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"EXECUTION SUMMARY: Passed: (\d+), Failed: (\d+), Errored: (\d+)").unwrap()
});

/// Status of one parsed outcome, uppercased on the way in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TestStatus {
    Pass,
    Fail,
    Error,
    Other(String),
}

impl TestStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Error => "ERROR",
            Self::Other(label) => label,
        }
    }

    /// Colour used in the rendered results table.
    pub fn colour(&self) -> &'static str {
        match self {
            Self::Fail => "red",
            Self::Error => "orange",
            _ => "green",
        }
    }

    pub fn is_problem(&self) -> bool {
        matches!(self, Self::Fail | Self::Error)
    }
}

impl From<String> for TestStatus {
    fn from(label: String) -> Self {
        let label = label.trim().to_uppercase();
        match label.as_str() {
            "PASS" => Self::Pass,
            "FAIL" => Self::Fail,
            "ERROR" => Self::Error,
            _ => Self::Other(label),
        }
    }
}

impl From<&str> for TestStatus {
    fn from(label: &str) -> Self {
        Self::from(label.to_string())
    }
}

impl From<TestStatus> for String {
    fn from(status: TestStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One test unit reported by the script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub id: String,
    pub description: String,
    pub status: TestStatus,
    pub message: String,
}

/// Extract every outcome record, in order of appearance.
///
/// A span missing one of its markers does not match and is skipped. ID,
/// description and status are single-line; the message may span several lines.
pub fn parse_outcomes(stdout: &str) -> Vec<TestOutcome> {
    OUTCOME_RECORD
        .captures_iter(stdout)
        .map(|caps| {
            let field = |i: usize| {
                caps.get(i)
                    .map(|m| m.as_str().trim().to_string())
                    .unwrap_or_default()
            };
            TestOutcome {
                id: field(1),
                description: field(2),
                status: TestStatus::from(field(3)),
                message: field(4),
            }
        })
        .collect()
}

/// Totals from the script's own `EXECUTION SUMMARY` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub passed: u64,
    pub failed: u64,
    pub errored: u64,
}

impl ExecutionSummary {
    /// The first summary line in `stdout`, if any.
    pub fn parse(stdout: &str) -> Option<Self> {
        let caps = SUMMARY_LINE.captures(stdout)?;
        let count = |i: usize| caps.get(i)?.as_str().parse::<u64>().ok();
        Some(Self {
            passed: count(1)?,
            failed: count(2)?,
            errored: count(3)?,
        })
    }
}
