//! Pipeline State Machine — one phase per session and a guard per user action.
//!
//! ```text
//! GenerateTestCases: any phase       → Generated      (failure → Idle)
//! ApplyEdits:        Generated..     → Edited         (drops script and result)
//! GenerateScript:    Generated..     → ScriptReady    (failure → Generated | Edited)
//! EditScript:        ScriptReady..   → ScriptReady    (drops result)
//! ExecuteScript:     ScriptReady..   → Executed
//! ```
//!
//! Actions are checked with [`PipelineMachine::check`] before any work is
//! done and recorded with [`PipelineMachine::complete`] once the outcome is
//! known, so a rejected action never touches session state.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    /// Nothing generated yet, or the last test-case generation failed.
    Idle,
    /// A fresh test-case collection exists.
    Generated,
    /// The collection has been edited at least once.
    Edited,
    /// A script exists and has not been run since it last changed.
    ScriptReady,
    /// The current script has been run and a result is available.
    Executed,
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Generated => write!(f, "Generated"),
            Self::Edited => write!(f, "Edited"),
            Self::ScriptReady => write!(f, "ScriptReady"),
            Self::Executed => write!(f, "Executed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    GenerateTestCases,
    ApplyEdits,
    GenerateScript,
    EditScript,
    ExecuteScript,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GenerateTestCases => write!(f, "GenerateTestCases"),
            Self::ApplyEdits => write!(f, "ApplyEdits"),
            Self::GenerateScript => write!(f, "GenerateScript"),
            Self::EditScript => write!(f, "EditScript"),
            Self::ExecuteScript => write!(f, "ExecuteScript"),
        }
    }
}

fn is_permitted(phase: PipelinePhase, action: Action) -> bool {
    use Action::*;
    use PipelinePhase::*;

    match action {
        GenerateTestCases => true,
        ApplyEdits | GenerateScript => phase != Idle,
        EditScript | ExecuteScript => matches!(phase, ScriptReady | Executed),
    }
}

/// A single recorded transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub action: Action,
    pub from: PipelinePhase,
    pub to: PipelinePhase,
    pub succeeded: bool,
    /// Milliseconds since the machine was created.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// An action attempted in a phase that does not allow it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllegalAction {
    pub phase: PipelinePhase,
    pub action: Action,
}

impl fmt::Display for IllegalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} is not allowed in phase {}", self.action, self.phase)
    }
}

impl std::error::Error for IllegalAction {}

pub struct PipelineMachine {
    current: PipelinePhase,
    /// Whether the live collection has been edited since it was generated.
    edited: bool,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl PipelineMachine {
    pub fn new() -> Self {
        Self {
            current: PipelinePhase::Idle,
            edited: false,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> PipelinePhase {
        self.current
    }

    pub fn check(&self, action: Action) -> Result<(), IllegalAction> {
        if is_permitted(self.current, action) {
            Ok(())
        } else {
            Err(IllegalAction {
                phase: self.current,
                action,
            })
        }
    }

    /// The phase `action` leads to from the current phase.
    fn target(&self, action: Action, succeeded: bool) -> PipelinePhase {
        use Action::*;
        use PipelinePhase::*;

        let records_phase = if self.edited { Edited } else { Generated };
        match (action, succeeded) {
            (GenerateTestCases, true) => Generated,
            (GenerateTestCases, false) => Idle,
            (ApplyEdits, _) => Edited,
            (GenerateScript, true) => ScriptReady,
            (GenerateScript, false) => records_phase,
            (EditScript, _) => ScriptReady,
            (ExecuteScript, true) => Executed,
            (ExecuteScript, false) => self.current,
        }
    }

    /// Record the outcome of a permitted action and move to its target phase.
    pub fn complete(
        &mut self,
        action: Action,
        succeeded: bool,
        reason: Option<&str>,
    ) -> Result<PipelinePhase, IllegalAction> {
        self.check(action)?;
        let to = self.target(action, succeeded);

        match action {
            Action::GenerateTestCases => self.edited = false,
            Action::ApplyEdits => self.edited = true,
            _ => {}
        }

        tracing::debug!(
            action = %action,
            from = %self.current,
            to = %to,
            succeeded,
            "pipeline transition"
        );

        self.transitions.push(TransitionRecord {
            action,
            from: self.current,
            to,
            succeeded,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        });
        self.current = to;
        Ok(to)
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    pub fn summary(&self) -> String {
        let phases: Vec<String> = self.transitions.iter().map(|t| t.to.to_string()).collect();
        let mut summary = format!(
            "{} → {} ({} transitions)",
            PipelinePhase::Idle,
            self.current,
            self.transitions.len()
        );
        if !phases.is_empty() {
            summary.push_str(&format!(" [{}]", phases.join(" → ")));
        }
        summary
    }
}

impl Default for PipelineMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_phase_only_allows_generation() {
        let sm = PipelineMachine::new();
        assert_eq!(sm.current(), PipelinePhase::Idle);
        assert!(sm.check(Action::GenerateTestCases).is_ok());
        for action in [
            Action::ApplyEdits,
            Action::GenerateScript,
            Action::EditScript,
            Action::ExecuteScript,
        ] {
            let err = sm.check(action).unwrap_err();
            assert_eq!(err.phase, PipelinePhase::Idle);
            assert_eq!(err.action, action);
        }
    }

    #[test]
    fn test_happy_path() {
        let mut sm = PipelineMachine::new();
        sm.complete(Action::GenerateTestCases, true, None).unwrap();
        sm.complete(Action::ApplyEdits, true, Some("description changed"))
            .unwrap();
        sm.complete(Action::GenerateScript, true, None).unwrap();
        sm.complete(Action::EditScript, true, None).unwrap();
        sm.complete(Action::ExecuteScript, true, None).unwrap();

        assert_eq!(sm.current(), PipelinePhase::Executed);
        assert_eq!(sm.transitions().len(), 5);
        assert_eq!(
            sm.transitions()[1].reason.as_deref(),
            Some("description changed")
        );
    }

    #[test]
    fn test_failed_generation_falls_back() {
        let mut sm = PipelineMachine::new();
        assert_eq!(
            sm.complete(Action::GenerateTestCases, false, Some("blocked")),
            Ok(PipelinePhase::Idle)
        );

        sm.complete(Action::GenerateTestCases, true, None).unwrap();
        assert_eq!(
            sm.complete(Action::GenerateScript, false, None),
            Ok(PipelinePhase::Generated)
        );

        sm.complete(Action::ApplyEdits, true, None).unwrap();
        assert_eq!(
            sm.complete(Action::GenerateScript, false, None),
            Ok(PipelinePhase::Edited)
        );
    }

    #[test]
    fn test_regeneration_resets_edit_tracking() {
        let mut sm = PipelineMachine::new();
        sm.complete(Action::GenerateTestCases, true, None).unwrap();
        sm.complete(Action::ApplyEdits, true, None).unwrap();
        sm.complete(Action::GenerateScript, true, None).unwrap();
        sm.complete(Action::ExecuteScript, true, None).unwrap();

        sm.complete(Action::GenerateTestCases, true, None).unwrap();
        assert_eq!(
            sm.complete(Action::GenerateScript, false, None),
            Ok(PipelinePhase::Generated)
        );
    }

    #[test]
    fn test_editing_records_after_script_invalidates_it() {
        let mut sm = PipelineMachine::new();
        sm.complete(Action::GenerateTestCases, true, None).unwrap();
        sm.complete(Action::GenerateScript, true, None).unwrap();
        sm.complete(Action::ApplyEdits, true, None).unwrap();
        assert_eq!(sm.current(), PipelinePhase::Edited);
        assert!(sm.check(Action::ExecuteScript).is_err());
    }

    #[test]
    fn test_rejected_action_is_not_recorded() {
        let mut sm = PipelineMachine::new();
        assert!(sm.complete(Action::ExecuteScript, true, None).is_err());
        assert!(sm.transitions().is_empty());
        assert_eq!(sm.current(), PipelinePhase::Idle);
    }

    #[test]
    fn test_transition_record_serde_roundtrip() {
        let record = TransitionRecord {
            action: Action::GenerateScript,
            from: PipelinePhase::Edited,
            to: PipelinePhase::ScriptReady,
            succeeded: true,
            elapsed_ms: 42,
            reason: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"generate_script\""));
        let restored: TransitionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.to, PipelinePhase::ScriptReady);
        assert!(restored.reason.is_none());
    }

    #[test]
    fn test_summary() {
        let mut sm = PipelineMachine::new();
        sm.complete(Action::GenerateTestCases, true, None).unwrap();
        sm.complete(Action::GenerateScript, true, None).unwrap();
        let summary = sm.summary();
        assert!(summary.contains("ScriptReady"));
        assert!(summary.contains("2 transitions"));
    }
}
