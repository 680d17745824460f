//! Markdown rendering of an [`ExecutionReport`].
//!
//! The document mixes Markdown with inline HTML (coloured spans, collapsible
//! blocks), so every piece of script output is HTML-escaped before it is
//! placed in the page.

use super::{AnalysisNote, ExecutionReport};

const NO_STDOUT: &str = "No standard output captured.";
const NO_STDERR: &str = "No standard error output captured.";

/// Escape `&`, `<`, `>`, `"` and `'`.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            other => escaped.push(other),
        }
    }
    escaped
}

pub(super) fn markdown(report: &ExecutionReport) -> String {
    let mut doc = String::new();

    doc.push_str("## Test Execution Report\n\n");
    doc.push_str(&format!("**Overall Exit Code:** `{}`\n\n", report.exit_code));
    doc.push_str(&format!(
        "**Overall Status:** <span style='color:{}; font-weight:bold;'>{}</span>{}\n\n",
        report.status.colour(),
        report.status.label(),
        status_suffix(report)
    ));
    doc.push_str("---\n\n");

    if report.outcomes.is_empty() {
        doc.push_str(
            "No structured test results found in standard output. The script might not have \
             run correctly or produced output in the expected format.\n\n",
        );
    } else {
        doc.push_str("### Individual Test Case Results\n\n");
        doc.push_str("| Test ID | Description | Status | Message |\n|---|---|---|---|\n");
        for outcome in &report.outcomes {
            doc.push_str(&format!(
                "| {} | {} | <span style='color:{}; font-weight:bold;'>{}</span> | {} |\n",
                table_cell(&outcome.id),
                table_cell(&outcome.description),
                outcome.status.colour(),
                escape_html(outcome.status.as_str()),
                table_cell(&outcome.message),
            ));
        }
        doc.push('\n');
    }

    if let Some(summary) = report.summary {
        doc.push_str("### Script Execution Summary\n\n");
        doc.push_str(&format!("- **Total Passed:** {}\n", summary.passed));
        doc.push_str(&format!("- **Total Failed:** {}\n", summary.failed));
        doc.push_str(&format!("- **Total Errored:** {}\n\n", summary.errored));
    }
    doc.push_str("---\n\n");

    doc.push_str(&collapsible(
        "Full Standard Output (`stdout`)",
        &report.stdout,
        NO_STDOUT,
    ));
    doc.push_str(&collapsible(
        "Full Standard Error (`stderr`)",
        &report.stderr,
        NO_STDERR,
    ));

    doc.push_str("---\n\n**Analysis Notes:**\n\n");
    doc.push_str(&analysis_line(report));
    doc.push('\n');
    doc
}

fn status_suffix(report: &ExecutionReport) -> String {
    use super::OverallStatus::*;
    match report.status {
        Completed => " (Individual test statuses below)".to_string(),
        CompletedWithFailures => " (See details below)".to_string(),
        TerminatedOrTimedOut => String::new(),
        FailedOrErrored => format!(" (Exit Code: {})", report.exit_code),
    }
}

/// Escaped cell text; newlines become `<br>` and pipes are escaped so the
/// row stays one row.
fn table_cell(text: &str) -> String {
    escape_html(text)
        .replace('|', "\\|")
        .replace("\r\n", "<br>")
        .replace('\n', "<br>")
}

fn collapsible(title: &str, body: &str, placeholder: &str) -> String {
    let body = if body.is_empty() { placeholder } else { body };
    format!(
        "<details>\n <summary><strong>{title}</strong> - Click to expand</summary>\n\
         <pre><code style='white-space: pre-wrap; word-wrap: break-word;'>{}</code></pre>\n\
         </details>\n\n",
        escape_html(body)
    )
}

fn analysis_line(report: &ExecutionReport) -> String {
    match report.note {
        AnalysisNote::ProblemsReported => "<span style='color:red;'>One or more tests failed or \
             encountered errors. Review the results table and `stderr` log.</span>"
            .to_string(),
        AnalysisNote::NonZeroExit => format!(
            "<span style='color:red;'>Script exited with a non-zero code ({}). Review `stderr` \
             for critical errors.</span>",
            report.exit_code
        ),
        AnalysisNote::NoStructuredResults => "<span style='color:orange;'>Script ran, but no \
             structured test results were parsed. Check `stdout` for output format compliance \
             or `stderr` for errors during test execution.</span>"
            .to_string(),
        AnalysisNote::NoOutput => "<span style='color:orange;'>Script executed with exit code 0 \
             but produced no output to stdout or stderr. Verify script logging and \
             assertions.</span>"
            .to_string(),
        AnalysisNote::AllPassed => "<span style='color:green;'>All parsed tests passed and \
             script exited successfully.</span>"
            .to_string(),
        AnalysisNote::Inconclusive => {
            "Review logs and exit code to determine execution status.".to_string()
        }
    }
}
