//! Autotest Engine
//!
//! Deterministic core of the autotest pipeline. Nothing in this crate talks to
//! a model or the network; the LLM-facing stages live in `autotest-agents`.
//!
//! # Components
//!
//! - [`records`]: the test-case record model, the editable view, the delta
//!   reconciler and the normalizer that turns edited rows back into records.
//! - [`repair`]: independent repair passes that recover structured payloads
//!   from free-form model output.
//! - [`runner`]: executes a generated script as an isolated subprocess with a
//!   wall-clock budget and escalating termination.
//! - [`report`]: parses structured outcome records out of captured stdout and
//!   renders the execution report.
//!
//! # Flow
//!
//! ```text
//! editable rows ──reconcile(delta)──▶ rows ──normalize──▶ records
//! script ──ProcessRunner::run──▶ ExecutionResult ──ExecutionReport::build──▶ document
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod records;
pub mod repair;
pub mod report;
pub mod runner;

// Re-export record types
pub use records::{
    editable_view, normalize, reconcile, validate_collection, CollectionIssue, Delta, Record,
    RowMap, Snapshot, TestType,
};

// Re-export repair types
pub use repair::{extract_script_block, parse_json_array, RepairError, RepairPass};

// Re-export runner types
pub use runner::{
    ExecutionOptions, ExecutionResult, ProcessRunner, RunState, RunnerConfig,
    INTERNAL_ERROR_EXIT_CODE, LAUNCH_FAILED_EXIT_CODE, TIMEOUT_EXIT_CODE,
};

// Re-export report types
pub use report::{parse_outcomes, ExecutionReport, ExecutionSummary, OverallStatus, TestOutcome, TestStatus};
