//! Result parsing and the execution report.
//!
//! [`ExecutionReport::build`] is pure: it looks only at the captured streams
//! and the exit code, so a report can be rebuilt from a saved result at any
//! time.

mod parser;
mod render;

pub use parser::{parse_outcomes, ExecutionSummary, TestOutcome, TestStatus};
pub use render::escape_html;

use serde::{Deserialize, Serialize};

use crate::runner::{ExecutionResult, TIMEOUT_EXIT_CODE};

/// Exit codes that mean the run was stopped from outside.
pub const TERMINATION_EXIT_CODES: [i32; 3] = [TIMEOUT_EXIT_CODE, -9, -15];

/// Overall classification of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Completed,
    CompletedWithFailures,
    TerminatedOrTimedOut,
    FailedOrErrored,
}

impl OverallStatus {
    /// Classify by exit code first; only a non-zero, non-termination exit
    /// looks at the parsed outcomes.
    pub fn classify(exit_code: i32, outcomes: &[TestOutcome], has_summary: bool) -> Self {
        if exit_code == 0 {
            Self::Completed
        } else if TERMINATION_EXIT_CODES.contains(&exit_code) {
            Self::TerminatedOrTimedOut
        } else if has_summary || outcomes.iter().any(|o| o.status == TestStatus::Fail) {
            Self::CompletedWithFailures
        } else {
            Self::FailedOrErrored
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Completed => "Execution Completed",
            Self::CompletedWithFailures => "Execution Completed with Failures",
            Self::TerminatedOrTimedOut => "Execution Terminated or Timed Out",
            Self::FailedOrErrored => "Execution Failed or Errored",
        }
    }

    pub fn colour(self) -> &'static str {
        match self {
            Self::Completed => "green",
            Self::CompletedWithFailures => "orange",
            Self::TerminatedOrTimedOut | Self::FailedOrErrored => "red",
        }
    }
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Guidance line shown under "Analysis Notes".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisNote {
    ProblemsReported,
    NonZeroExit,
    NoStructuredResults,
    NoOutput,
    AllPassed,
    Inconclusive,
}

impl AnalysisNote {
    fn choose(exit_code: i32, outcomes: &[TestOutcome], stdout: &str, stderr: &str) -> Self {
        let has_output = !stdout.is_empty() || !stderr.is_empty();
        if outcomes.iter().any(|o| o.status.is_problem()) {
            Self::ProblemsReported
        } else if exit_code != 0 {
            Self::NonZeroExit
        } else if outcomes.is_empty() && has_output {
            Self::NoStructuredResults
        } else if outcomes.is_empty() {
            Self::NoOutput
        } else if outcomes.iter().all(|o| o.status == TestStatus::Pass) {
            Self::AllPassed
        } else {
            Self::Inconclusive
        }
    }
}

/// Everything the report shows, in serializable form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub exit_code: i32,
    pub status: OverallStatus,
    pub outcomes: Vec<TestOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<ExecutionSummary>,
    pub note: AnalysisNote,
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionReport {
    pub fn build(stdout: &str, stderr: &str, exit_code: i32) -> Self {
        let outcomes = parse_outcomes(stdout);
        let summary = ExecutionSummary::parse(stdout);
        let status = OverallStatus::classify(exit_code, &outcomes, summary.is_some());
        let note = AnalysisNote::choose(exit_code, &outcomes, stdout, stderr);
        tracing::debug!(
            exit_code,
            status = %status,
            outcomes = outcomes.len(),
            "execution report built"
        );
        Self {
            exit_code,
            status,
            outcomes,
            summary,
            note,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    pub fn from_result(result: &ExecutionResult) -> Self {
        Self::build(&result.stdout, &result.stderr, result.exit_code)
    }

    /// Count of outcomes with the given status.
    pub fn count(&self, status: &TestStatus) -> usize {
        self.outcomes.iter().filter(|o| &o.status == status).count()
    }

    pub fn render_markdown(&self) -> String {
        render::markdown(self)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
