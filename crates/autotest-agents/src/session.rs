//! Session — the single owner of pipeline state.
//!
//! Every public operation is one user action: it is checked against the
//! current phase first, then either fully replaces the state it owns or
//! leaves everything untouched except what the failed stage had already
//! cleared. Results are handed out as shared references or clones, never as
//! mutable access.

use std::sync::Arc;
use std::time::Duration;

use autotest_engine::{
    editable_view, normalize, reconcile, validate_collection, Delta, ExecutionOptions,
    ExecutionReport, ExecutionResult, ProcessRunner, Record, Snapshot,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::AutotestConfig;
use crate::generation::script::ScriptInputs;
use crate::generation::{self, GenerationError, RigGenerator, TextGenerator};
use crate::page::{self, HttpPageFetcher, PageError, PageFetcher};
use crate::state_machine::{Action, IllegalAction, PipelineMachine, PipelinePhase};

/// Which generation stage failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    TestCases,
    Script,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TestCases => write!(f, "test case generation"),
            Self::Script => write!(f, "script generation"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    IllegalAction(#[from] IllegalAction),

    #[error("edits were made against collection version {found}, current version is {expected}")]
    StaleDelta { expected: u64, found: u64 },

    #[error("no test cases have been generated")]
    NoTestCases,

    #[error("no valid test cases available to generate a script")]
    NothingToGenerate,

    #[error("failed to fetch the target page")]
    PageUnavailable(#[source] PageError),

    #[error("{stage} failed")]
    Generation {
        stage: Stage,
        #[source]
        source: GenerationError,
    },

    #[error("cannot run an empty script")]
    EmptyScript,

    #[error("no execution result available")]
    NoResult,
}

/// A generated script, possibly edited by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub code: String,
    pub generated_at: DateTime<Utc>,
    pub edited: bool,
}

/// Per-session knobs taken from [`AutotestConfig`].
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub test_case_model: String,
    pub script_model: String,
    pub temperature: f64,
    pub html_excerpt_max: usize,
    pub execution_timeout: Duration,
}

impl From<&AutotestConfig> for SessionSettings {
    fn from(config: &AutotestConfig) -> Self {
        Self {
            test_case_model: config.test_case_model.clone(),
            script_model: config.script_model.clone(),
            temperature: config.temperature,
            html_excerpt_max: config.html_excerpt_max,
            execution_timeout: config.execution_timeout(),
        }
    }
}

pub struct Session {
    generator: Arc<dyn TextGenerator>,
    fetcher: Arc<dyn PageFetcher>,
    runner: ProcessRunner,
    settings: SessionSettings,
    machine: PipelineMachine,
    requirement: Option<String>,
    url: Option<String>,
    raw_cases: Vec<Value>,
    snapshot: Option<Snapshot>,
    next_version: u64,
    records: Vec<Record>,
    artifact: Option<Artifact>,
    last_result: Option<ExecutionResult>,
}

impl Session {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        fetcher: Arc<dyn PageFetcher>,
        runner: ProcessRunner,
        settings: SessionSettings,
    ) -> Self {
        Self {
            generator,
            fetcher,
            runner,
            settings,
            machine: PipelineMachine::new(),
            requirement: None,
            url: None,
            raw_cases: Vec::new(),
            snapshot: None,
            next_version: 1,
            records: Vec::new(),
            artifact: None,
            last_result: None,
        }
    }

    /// A session wired to the configured model endpoint and plain HTTP page fetching.
    pub fn from_config(config: &AutotestConfig) -> anyhow::Result<Self> {
        let generator = RigGenerator::from_config(config)?;
        let fetcher = HttpPageFetcher::new(config.request_timeout())?;
        Ok(Self::new(
            Arc::new(generator),
            Arc::new(fetcher),
            ProcessRunner::new(config.runner.clone()),
            SessionSettings::from(config),
        ))
    }

    pub fn phase(&self) -> PipelinePhase {
        self.machine.current()
    }

    pub fn machine(&self) -> &PipelineMachine {
        &self.machine
    }

    pub fn requirement(&self) -> Option<&str> {
        self.requirement.as_deref()
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// The test cases exactly as the model produced them.
    pub fn raw_test_cases(&self) -> &[Value] {
        &self.raw_cases
    }

    /// The current editable collection.
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    /// The records the current script was generated from.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        self.artifact.as_ref()
    }

    pub fn last_result(&self) -> Option<&ExecutionResult> {
        self.last_result.as_ref()
    }

    /// Stage A. Replaces every piece of session state.
    pub async fn generate_test_cases(&mut self, requirement: &str) -> Result<&Snapshot, SessionError> {
        self.machine.check(Action::GenerateTestCases)?;
        self.reset();
        self.requirement = Some(requirement.to_string());

        tracing::info!(requirement_chars = requirement.len(), "generating test cases");
        let generated = generation::generate_test_cases(
            self.generator.as_ref(),
            &self.settings.test_case_model,
            self.settings.temperature,
            requirement,
        )
        .await;

        match generated {
            Ok(cases) => self.install_cases(cases, Action::GenerateTestCases, None),
            Err(source) => {
                self.machine
                    .complete(Action::GenerateTestCases, false, Some(&source.to_string()))?;
                tracing::warn!(error = %source, "test case generation failed");
                Err(SessionError::Generation {
                    stage: Stage::TestCases,
                    source,
                })
            }
        }
    }

    /// Start from an existing collection instead of asking the model.
    pub fn import_test_cases(&mut self, cases: Vec<Value>) -> Result<&Snapshot, SessionError> {
        self.machine.check(Action::GenerateTestCases)?;
        self.reset();
        self.install_cases(cases, Action::GenerateTestCases, Some("imported"))
    }

    fn install_cases(
        &mut self,
        cases: Vec<Value>,
        action: Action,
        reason: Option<&str>,
    ) -> Result<&Snapshot, SessionError> {
        let snapshot = Snapshot::new(self.next_version, editable_view(&cases));
        self.next_version += 1;
        tracing::info!(
            version = snapshot.version,
            rows = snapshot.len(),
            "test case collection ready"
        );
        self.raw_cases = cases;
        self.machine.complete(action, true, reason)?;
        Ok(&*self.snapshot.insert(snapshot))
    }

    /// Apply `delta`, computed against snapshot `base_version`, and publish
    /// the result as a new snapshot. Drops any script and result.
    pub fn apply_edits(&mut self, base_version: u64, delta: &Delta) -> Result<&Snapshot, SessionError> {
        self.machine.check(Action::ApplyEdits)?;
        let current = self.snapshot.as_ref().ok_or(SessionError::NoTestCases)?;
        if current.version != base_version {
            tracing::warn!(
                expected = current.version,
                found = base_version,
                "rejecting stale delta"
            );
            return Err(SessionError::StaleDelta {
                expected: current.version,
                found: base_version,
            });
        }

        let rows = reconcile(&current.to_value(), delta);
        let snapshot = Snapshot::new(self.next_version, rows);
        self.next_version += 1;
        tracing::info!(
            from = base_version,
            to = snapshot.version,
            edited = delta.edited_rows.len(),
            deleted = delta.deleted_rows.len(),
            added = delta.added_rows.len(),
            "edits applied"
        );

        self.artifact = None;
        self.last_result = None;
        self.machine.complete(Action::ApplyEdits, true, None)?;
        Ok(&*self.snapshot.insert(snapshot))
    }

    /// Stage B: normalize the current collection, fetch the page and
    /// generate a script. Any previous script, its records and result are
    /// dropped first; the new records are kept only once a script exists.
    pub async fn generate_script(&mut self, url: &str) -> Result<&Artifact, SessionError> {
        self.machine.check(Action::GenerateScript)?;
        self.artifact = None;
        self.last_result = None;
        self.records.clear();
        self.url = Some(url.to_string());

        let rows: Vec<Value> = self
            .snapshot
            .as_ref()
            .map(|s| s.rows.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default();
        let records = normalize(&rows);
        if records.is_empty() {
            self.machine
                .complete(Action::GenerateScript, false, Some("no usable test cases"))?;
            return Err(SessionError::NothingToGenerate);
        }
        for issue in validate_collection(&records) {
            tracing::warn!(issue = %issue, "test case collection issue");
        }

        let excerpt = match page::fetch_excerpt(
            self.fetcher.as_ref(),
            url,
            self.settings.html_excerpt_max,
        )
        .await
        {
            Ok(excerpt) => excerpt,
            Err(e) => {
                tracing::warn!(url, error = %e, "page fetch failed");
                self.machine
                    .complete(Action::GenerateScript, false, Some(&e.to_string()))?;
                return Err(SessionError::PageUnavailable(e));
            }
        };

        let generated = generation::generate_script(
            self.generator.as_ref(),
            &self.settings.script_model,
            self.settings.temperature,
            ScriptInputs {
                records: &records,
                url,
                html_excerpt: &excerpt,
            },
        )
        .await;

        match generated {
            Ok(code) => {
                self.machine.complete(Action::GenerateScript, true, None)?;
                self.records = records;
                Ok(&*self.artifact.insert(Artifact {
                    code,
                    generated_at: Utc::now(),
                    edited: false,
                }))
            }
            Err(source) => {
                tracing::warn!(error = %source, "script generation failed");
                self.machine
                    .complete(Action::GenerateScript, false, Some(&source.to_string()))?;
                Err(SessionError::Generation {
                    stage: Stage::Script,
                    source,
                })
            }
        }
    }

    /// Replace the script text. Drops the previous result.
    pub fn edit_script(&mut self, code: impl Into<String>) -> Result<&Artifact, SessionError> {
        self.machine.check(Action::EditScript)?;
        let artifact = self.artifact.as_mut().ok_or(SessionError::EmptyScript)?;
        artifact.code = code.into();
        artifact.edited = true;
        self.last_result = None;
        self.machine.complete(Action::EditScript, true, None)?;
        tracing::info!("script edited");
        self.artifact.as_ref().ok_or(SessionError::EmptyScript)
    }

    /// Run the current script. A run always produces a result, whatever
    /// happened to the child.
    pub async fn execute(&mut self, options: &ExecutionOptions) -> Result<&ExecutionResult, SessionError> {
        self.machine.check(Action::ExecuteScript)?;
        let code = match self.artifact.as_ref() {
            Some(artifact) if !artifact.code.trim().is_empty() => artifact.code.clone(),
            _ => return Err(SessionError::EmptyScript),
        };

        self.last_result = None;
        let result = self
            .runner
            .run(&code, options, self.settings.execution_timeout)
            .await;
        self.machine.complete(
            Action::ExecuteScript,
            true,
            Some(&format!("{} (exit {})", result.state, result.exit_code)),
        )?;
        Ok(&*self.last_result.insert(result))
    }

    /// Report for the last execution.
    pub fn report(&self) -> Result<ExecutionReport, SessionError> {
        self.last_result
            .as_ref()
            .map(ExecutionReport::from_result)
            .ok_or(SessionError::NoResult)
    }

    fn reset(&mut self) {
        self.requirement = None;
        self.url = None;
        self.raw_cases.clear();
        self.snapshot = None;
        self.records.clear();
        self.artifact = None;
        self.last_result = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::testing::CannedGenerator;
    use async_trait::async_trait;
    use autotest_engine::RunnerConfig;
    use serde_json::json;

    struct StaticPage;

    #[async_trait]
    impl PageFetcher for StaticPage {
        async fn fetch(&self, _url: &str) -> Result<String, PageError> {
            Ok("<html><body><form id=\"login\"></form></body></html>".to_string())
        }
    }

    struct DeadPage;

    #[async_trait]
    impl PageFetcher for DeadPage {
        async fn fetch(&self, url: &str) -> Result<String, PageError> {
            Err(PageError::Status {
                url: url.to_string(),
                status: 503,
            })
        }
    }

    const CASES: &str = r#"[{"id": "TC001", "description": "Login", "preconditions": [],
        "test_type": "Functional", "steps": ["open", "submit"], "expected_outcome": "ok"}]"#;

    fn settings() -> SessionSettings {
        SessionSettings::from(&AutotestConfig::default())
    }

    fn session(generator: CannedGenerator, fetcher: Arc<dyn PageFetcher>) -> Session {
        Session::new(
            Arc::new(generator),
            fetcher,
            ProcessRunner::new(RunnerConfig::default()),
            settings(),
        )
    }

    #[tokio::test]
    async fn actions_out_of_order_are_rejected_without_side_effects() {
        let mut s = session(CannedGenerator::new(CASES), Arc::new(StaticPage));
        let err = s.generate_script("u").await.unwrap_err();
        assert!(matches!(err, SessionError::IllegalAction(_)), "{err}");
        assert!(s.url().is_none());
        assert_eq!(s.phase(), PipelinePhase::Idle);
        assert!(matches!(s.report(), Err(SessionError::NoResult)));
    }

    #[tokio::test]
    async fn generation_builds_versioned_editable_snapshot() {
        let mut s = session(CannedGenerator::new(CASES), Arc::new(StaticPage));
        let snapshot = s.generate_test_cases("login").await.unwrap();
        assert_eq!(snapshot.version, 1);
        assert_eq!(snapshot.rows[0]["steps_edit"], json!("open\nsubmit"));
        assert_eq!(s.phase(), PipelinePhase::Generated);
        assert_eq!(s.raw_test_cases().len(), 1);
    }

    #[tokio::test]
    async fn failed_generation_leaves_session_idle_and_empty() {
        let mut s = session(
            CannedGenerator::sequence(vec![
                Ok(CASES.to_string()),
                Err(GenerationError::Timeout { secs: 180 }),
            ]),
            Arc::new(StaticPage),
        );
        s.generate_test_cases("first").await.unwrap();

        let err = s.generate_test_cases("second").await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Generation {
                stage: Stage::TestCases,
                ..
            }
        ));
        assert_eq!(s.phase(), PipelinePhase::Idle);
        assert!(s.snapshot().is_none());
        assert!(s.raw_test_cases().is_empty());
    }

    #[tokio::test]
    async fn stale_deltas_are_rejected() {
        let mut s = session(CannedGenerator::new(CASES), Arc::new(StaticPage));
        s.generate_test_cases("login").await.unwrap();

        let delta = Delta::new().edit(0, json!({"description": "Edited"}));
        let snapshot = s.apply_edits(1, &delta).unwrap();
        assert_eq!(snapshot.version, 2);
        assert_eq!(snapshot.rows[0]["description"], json!("Edited"));

        let err = s.apply_edits(1, &Delta::new().delete(0)).unwrap_err();
        assert!(matches!(
            err,
            SessionError::StaleDelta {
                expected: 2,
                found: 1
            }
        ));
        assert_eq!(s.snapshot().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deleting_everything_means_nothing_to_generate() {
        let mut s = session(CannedGenerator::new(CASES), Arc::new(StaticPage));
        s.generate_test_cases("login").await.unwrap();
        s.apply_edits(1, &Delta::new().delete(0)).unwrap();

        let err = s.generate_script("https://example.test").await.unwrap_err();
        assert!(matches!(err, SessionError::NothingToGenerate));
        assert_eq!(s.phase(), PipelinePhase::Edited);
    }

    #[tokio::test]
    async fn page_failure_stops_script_generation() {
        let mut s = session(CannedGenerator::new(CASES), Arc::new(DeadPage));
        s.generate_test_cases("login").await.unwrap();

        let err = s.generate_script("https://example.test").await.unwrap_err();
        assert!(matches!(err, SessionError::PageUnavailable(_)), "{err}");
        assert_eq!(s.phase(), PipelinePhase::Generated);
        assert!(s.artifact().is_none());
        assert!(s.records().is_empty());
    }

    #[tokio::test]
    async fn failed_script_generation_keeps_no_records() {
        let generator = CannedGenerator::sequence(vec![
            Ok(CASES.to_string()),
            Ok("```python\nprint('generated')\n```".to_string()),
            Err(GenerationError::Timeout { secs: 180 }),
        ]);
        let mut s = session(generator, Arc::new(StaticPage));
        s.generate_test_cases("login").await.unwrap();
        s.generate_script("https://example.test").await.unwrap();
        assert_eq!(s.records().len(), 1);

        let err = s.generate_script("https://example.test").await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Generation {
                stage: Stage::Script,
                ..
            }
        ));
        assert_eq!(s.phase(), PipelinePhase::Generated);
        assert!(s.records().is_empty());
        assert!(s.artifact().is_none());
    }

    #[tokio::test]
    async fn script_generation_and_editing() {
        let generator = CannedGenerator::sequence(vec![
            Ok(CASES.to_string()),
            Ok("```python\nprint('generated')\n```".to_string()),
        ]);
        let mut s = session(generator, Arc::new(StaticPage));
        s.generate_test_cases("login").await.unwrap();

        let artifact = s.generate_script("https://example.test").await.unwrap();
        assert_eq!(artifact.code, "print('generated')");
        assert!(!artifact.edited);
        assert_eq!(s.phase(), PipelinePhase::ScriptReady);

        let artifact = s.edit_script("print('mine')").unwrap();
        assert!(artifact.edited);
        assert_eq!(s.url(), Some("https://example.test"));

        s.edit_script("   ").unwrap();
        let err = s.execute(&ExecutionOptions::headless()).await.unwrap_err();
        assert!(matches!(err, SessionError::EmptyScript));
    }

    #[tokio::test]
    async fn import_skips_the_model() {
        let mut s = session(
            CannedGenerator::failing(GenerationError::EmptyResponse),
            Arc::new(StaticPage),
        );
        let snapshot = s
            .import_test_cases(vec![json!({"id": "TC7", "steps": ["x"]})])
            .unwrap();
        assert_eq!(snapshot.rows[0]["steps_edit"], json!("x"));
        assert_eq!(s.phase(), PipelinePhase::Generated);
        assert_eq!(s.machine().transitions()[0].reason.as_deref(), Some("imported"));
    }
}
