//! End-to-end session flow with in-test model and page services.
//! The generated "script" is a shell script so the run needs no Python.
#![cfg(unix)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use autotest_agents::{
    GenerationError, GenerationRequest, PageError, PageFetcher, PipelinePhase, Session,
    SessionError, SessionSettings, TextGenerator,
};
use autotest_engine::{
    Delta, ExecutionOptions, OverallStatus, ProcessRunner, RunState, RunnerConfig, TestStatus,
};
use serde_json::json;

const TEST_CASES: &str = r#"```json
[
  {
    "id": "TC001",
    "description": "Valid login",
    "preconditions": ["User account exists"],
    "test_type": "Functional",
    "steps": ["Open the login page", "Enter valid credentials", "Submit"],
    "expected_outcome": "The dashboard is shown",
  },
]
```"#;

const SCRIPT: &str = r#"Here is the script:
```python
echo "TEST_RESULT_START"
echo "ID: TC001"
echo "DESCRIPTION: Login with edited description"
echo "STATUS: PASS"
echo "MESSAGE: Dashboard visible (args: $*)"
echo "TEST_RESULT_END"
echo "EXECUTION SUMMARY: Passed: 1, Failed: 0, Errored: 0"
```"#;

/// Answers by stage, keyed on the prompt contract, and keeps every prompt.
#[derive(Default)]
struct ScriptedModel {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl TextGenerator for ScriptedModel {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let is_script_stage = request.prompt.contains("TEST_RESULT_START");
        self.prompts.lock().unwrap().push(request.prompt);
        Ok(if is_script_stage { SCRIPT } else { TEST_CASES }.to_string())
    }
}

struct LoginPage;

#[async_trait]
impl PageFetcher for LoginPage {
    async fn fetch(&self, _url: &str) -> Result<String, PageError> {
        Ok("<html><head></head><body><form id=\"login\"><input name=\"email\"></form></body></html>"
            .to_string())
    }
}

fn session(model: Arc<ScriptedModel>, work_dir: &std::path::Path) -> Session {
    let runner = ProcessRunner::new(RunnerConfig {
        interpreter: "sh".to_string(),
        work_dir: work_dir.to_path_buf(),
        file_extension: "sh".to_string(),
        ..RunnerConfig::default()
    });
    let settings = SessionSettings {
        test_case_model: "stage-a".to_string(),
        script_model: "stage-b".to_string(),
        temperature: 0.2,
        html_excerpt_max: 75_000,
        execution_timeout: Duration::from_secs(30),
    };
    Session::new(model, Arc::new(LoginPage), runner, settings)
}

#[tokio::test]
async fn requirement_to_report() {
    let dir = tempfile::tempdir().unwrap();
    let model = Arc::new(ScriptedModel::default());
    let mut session = session(Arc::clone(&model), dir.path());

    // Stage A
    let snapshot = session
        .generate_test_cases("Users can log in with email and password.")
        .await
        .unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.rows[0]["id"], json!("TC001"));
    let version = snapshot.version;

    // User edit
    let delta = Delta::new().edit(0, json!({"description": "Login with edited description"}));
    session.apply_edits(version, &delta).unwrap();
    assert_eq!(session.phase(), PipelinePhase::Edited);

    // Stage B
    let artifact = session
        .generate_script("https://app.example/login")
        .await
        .unwrap();
    assert!(artifact.code.starts_with("echo \"TEST_RESULT_START\""));
    let records = session.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, "TC001");
    assert_eq!(records[0].description, "Login with edited description");
    assert_eq!(records[0].steps.len(), 3);

    {
        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].contains("Users can log in with email and password."));
        assert!(prompts[1].contains("Login with edited description"));
        assert!(prompts[1].contains("<form id=\"login\">"));
        assert!(!prompts[1].contains("<head>"));
    }

    // Execution
    let result = session
        .execute(&ExecutionOptions::headless())
        .await
        .unwrap();
    assert_eq!(result.state, RunState::Completed);
    assert_eq!(result.exit_code, 0);
    assert!(result.stdout.contains("(args: --headless)"));
    assert!(result.script_path.as_ref().unwrap().starts_with(dir.path()));
    assert_eq!(session.phase(), PipelinePhase::Executed);

    // Report
    let report = session.report().unwrap();
    assert_eq!(report.status, OverallStatus::Completed);
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].status, TestStatus::Pass);
    assert_eq!(report.summary.unwrap().passed, 1);

    let doc = report.render_markdown();
    assert!(doc.contains(">Execution Completed</span>"));
    assert!(doc.contains("<span style='color:green; font-weight:bold;'>PASS</span>"));
    assert!(doc.contains("| TC001 | Login with edited description |"));
}

#[tokio::test]
async fn edited_script_is_what_runs() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session(Arc::new(ScriptedModel::default()), dir.path());

    session.generate_test_cases("anything").await.unwrap();
    session.generate_script("https://app.example").await.unwrap();
    session
        .edit_script("echo 'TEST_RESULT_START\nID: TC001\nDESCRIPTION: d\nSTATUS: FAIL\nMESSAGE: nope\nTEST_RESULT_END'\nexit 1")
        .unwrap();
    assert_eq!(session.phase(), PipelinePhase::ScriptReady);

    session.execute(&ExecutionOptions::default()).await.unwrap();
    let report = session.report().unwrap();
    assert_eq!(report.exit_code, 1);
    assert_eq!(report.status, OverallStatus::CompletedWithFailures);
    assert_eq!(report.outcomes[0].status, TestStatus::Fail);
}

#[tokio::test]
async fn regeneration_discards_previous_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session(Arc::new(ScriptedModel::default()), dir.path());

    session.generate_test_cases("first").await.unwrap();
    session.generate_script("https://app.example").await.unwrap();
    session.execute(&ExecutionOptions::headless()).await.unwrap();
    assert!(session.report().is_ok());

    let snapshot = session.generate_test_cases("second").await.unwrap();
    assert_eq!(snapshot.version, 2);
    assert!(session.artifact().is_none());
    assert!(matches!(session.report(), Err(SessionError::NoResult)));
    assert!(matches!(
        session.execute(&ExecutionOptions::headless()).await,
        Err(SessionError::IllegalAction(_))
    ));
}
