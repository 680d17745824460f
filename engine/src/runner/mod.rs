//! Process Runner — execute a generated script as an isolated subprocess.
//!
//! Every run walks one path through a small state machine:
//!
//! ```text
//! NotStarted ──persist+spawn──▶ Running ──exit──────▶ Completed
//!     │                            ├──budget spent──▶ TimedOut   (SIGTERM, grace, SIGKILL)
//!     └──interpreter missing──▶ LaunchFailed
//! any runner fault ─────────────────────────────────▶ InternalError
//! ```
//!
//! [`ProcessRunner::run`] never fails: every path ends in a complete
//! [`ExecutionResult`]. The child gets its own process group so termination
//! reaches anything it spawned (browsers, drivers). The script file is left
//! on disk after the run.

mod workspace;

pub use workspace::ArtifactStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

/// Exit code reported when the run was cut short by the wall-clock budget.
pub const TIMEOUT_EXIT_CODE: i32 = 143;
/// Exit code reported when the interpreter could not be launched.
pub const LAUNCH_FAILED_EXIT_CODE: i32 = 1;
/// Exit code reported when the runner itself faulted.
pub const INTERNAL_ERROR_EXIT_CODE: i32 = 1;

/// Appended to stderr of a timed-out run.
pub const TIMEOUT_MARKER: &str = "\n--- Execution Timed Out ---";

/// Runner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Program used to execute the script (`python` by default).
    pub interpreter: String,
    /// Working area where scripts are written.
    pub work_dir: PathBuf,
    /// File name prefix for persisted scripts.
    pub file_prefix: String,
    /// File extension for persisted scripts.
    pub file_extension: String,
    /// Wall-clock budget used by [`ProcessRunner::run_default`].
    pub timeout_secs: u64,
    /// Time between SIGTERM and SIGKILL on timeout.
    pub grace_period_secs: u64,
    /// Upper bound on collecting remaining output once the child is gone.
    pub drain_timeout_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            interpreter: "python".to_string(),
            work_dir: PathBuf::from("tests"),
            file_prefix: "test_script_".to_string(),
            file_extension: "py".to_string(),
            timeout_secs: 3000,
            grace_period_secs: 5,
            drain_timeout_secs: 5,
        }
    }
}

/// Options passed through to the script as arguments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionOptions {
    /// Adds `--headless`.
    pub headless: bool,
    /// Appended after the headless flag, verbatim.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl ExecutionOptions {
    pub fn headless() -> Self {
        Self {
            headless: true,
            extra_args: Vec::new(),
        }
    }

    fn to_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.extra_args.len() + 1);
        if self.headless {
            args.push("--headless".to_string());
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

/// Lifecycle states of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    Running,
    Completed,
    TimedOut,
    LaunchFailed,
    InternalError,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::TimedOut | Self::LaunchFailed | Self::InternalError
        )
    }

    fn can_advance_to(self, to: RunState) -> bool {
        use RunState::*;
        if to == InternalError {
            return !self.is_terminal();
        }
        matches!(
            (self, to),
            (NotStarted, Running) | (NotStarted, LaunchFailed) | (Running, Completed) | (Running, TimedOut)
        )
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::TimedOut => write!(f, "timed_out"),
            Self::LaunchFailed => write!(f, "launch_failed"),
            Self::InternalError => write!(f, "internal_error"),
        }
    }
}

/// How a timed-out child was stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Exited within the grace period after SIGTERM.
    Graceful,
    /// Needed SIGKILL.
    Forced,
}

/// Faults of the runner itself, as opposed to the child.
#[derive(Debug, Error)]
pub enum RunnerFault {
    #[error("failed to create working area {}", path.display())]
    WorkArea {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write artifact {}", path.display())]
    WriteArtifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to launch `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting for child process")]
    Wait(#[source] std::io::Error),

    #[error("illegal runner transition {from} -> {to}")]
    IllegalTransition { from: RunState, to: RunState },
}

/// Captured outcome of one run. Immutable once returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    /// Child exit code, the negated signal number if it was killed by a
    /// signal, or one of the fixed runner codes.
    pub exit_code: i32,
    pub state: RunState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination: Option<Termination>,
    /// Where the script was written, when it got that far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_path: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub fn succeeded(&self) -> bool {
        self.state == RunState::Completed && self.exit_code == 0
    }

    pub fn timed_out(&self) -> bool {
        self.state == RunState::TimedOut
    }

    fn launch_failed(interpreter: &str) -> Self {
        Self {
            stdout: String::new(),
            stderr: format!(
                "'{interpreter}' command not found. Please ensure it is installed and on PATH."
            ),
            exit_code: LAUNCH_FAILED_EXIT_CODE,
            state: RunState::LaunchFailed,
            termination: None,
            script_path: None,
            started_at: Utc::now(),
            duration_ms: 0,
        }
    }

    fn internal_error(fault: RunnerFault) -> Self {
        let error = anyhow::Error::new(fault);
        Self {
            stdout: String::new(),
            stderr: format!("\n--- Subprocess Wrapper Error: {error:#}\n{error:?} ---"),
            exit_code: INTERNAL_ERROR_EXIT_CODE,
            state: RunState::InternalError,
            termination: None,
            script_path: None,
            started_at: Utc::now(),
            duration_ms: 0,
        }
    }
}

/// Executes scripts with a bounded lifetime.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    config: RunnerConfig,
    store: ArtifactStore,
}

impl ProcessRunner {
    pub fn new(config: RunnerConfig) -> Self {
        let store = ArtifactStore::new(
            &config.work_dir,
            &config.file_prefix,
            &config.file_extension,
        );
        Self { config, store }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run with the configured default timeout.
    pub async fn run_default(&self, script: &str, options: &ExecutionOptions) -> ExecutionResult {
        self.run(script, options, Duration::from_secs(self.config.timeout_secs))
            .await
    }

    /// Persist `script`, execute it and capture its outcome.
    ///
    /// Always returns; see the module docs for the possible end states.
    pub async fn run(
        &self,
        script: &str,
        options: &ExecutionOptions,
        timeout: Duration,
    ) -> ExecutionResult {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut run = Run::new();

        let mut result = match self.execute(&mut run, script, options, timeout).await {
            Ok(result) => result,
            Err(fault) => {
                tracing::error!(error = %fault, state = %run.state, "runner fault");
                let mut result = ExecutionResult::internal_error(fault);
                run.state = RunState::InternalError;
                result.state = run.state;
                result
            }
        };

        result.script_path = run.script_path;
        result.started_at = started_at;
        result.duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            state = %result.state,
            exit_code = result.exit_code,
            duration_ms = result.duration_ms,
            stdout_bytes = result.stdout.len(),
            stderr_bytes = result.stderr.len(),
            "execution finished"
        );
        result
    }

    async fn execute(
        &self,
        run: &mut Run,
        script: &str,
        options: &ExecutionOptions,
        timeout: Duration,
    ) -> Result<ExecutionResult, RunnerFault> {
        let path = self.store.persist(script).await?;
        run.script_path = Some(path.clone());

        let mut cmd = Command::new(&self.config.interpreter);
        cmd.arg(&path)
            .args(options.to_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group: signals on timeout reach the whole tree.
        #[cfg(unix)]
        cmd.process_group(0);

        tracing::info!(
            interpreter = %self.config.interpreter,
            script = %path.display(),
            headless = options.headless,
            timeout_secs = timeout.as_secs(),
            "launching script"
        );

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                run.advance(RunState::LaunchFailed)?;
                tracing::error!(interpreter = %self.config.interpreter, "interpreter not found");
                return Ok(ExecutionResult::launch_failed(&self.config.interpreter));
            }
            Err(source) => {
                return Err(RunnerFault::Spawn {
                    program: self.config.interpreter.clone(),
                    source,
                })
            }
        };
        run.advance(RunState::Running)?;

        let stdout = OutputCollector::spawn(child.stdout.take());
        let stderr = OutputCollector::spawn(child.stderr.take());

        let (exit_code, termination) = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => {
                run.advance(RunState::Completed)?;
                (exit_code_of(status), None)
            }
            Ok(Err(e)) => return Err(RunnerFault::Wait(e)),
            Err(_) => {
                tracing::warn!(
                    timeout_secs = timeout.as_secs(),
                    "script exceeded its time budget; terminating"
                );
                let termination = self.terminate(&mut child).await;
                run.advance(RunState::TimedOut)?;
                (TIMEOUT_EXIT_CODE, Some(termination))
            }
        };

        let drain = Duration::from_secs(self.config.drain_timeout_secs);
        let stdout = stdout.finish(drain).await;
        let mut stderr = stderr.finish(drain).await;
        if run.state == RunState::TimedOut {
            stderr.push_str(TIMEOUT_MARKER);
        }

        Ok(ExecutionResult {
            stdout,
            stderr,
            exit_code,
            state: run.state,
            termination,
            script_path: None,
            started_at: Utc::now(),
            duration_ms: 0,
        })
    }

    /// SIGTERM the process group, wait out the grace period, then SIGKILL.
    async fn terminate(&self, child: &mut Child) -> Termination {
        let grace = Duration::from_secs(self.config.grace_period_secs);

        signal_group(child, GroupSignal::Terminate);
        #[cfg(not(unix))]
        if let Err(e) = child.start_kill() {
            tracing::warn!(error = %e, "failed to request termination");
        }

        if let Ok(Ok(_)) = tokio::time::timeout(grace, child.wait()).await {
            tracing::info!("child exited after termination request");
            return Termination::Graceful;
        }

        tracing::warn!(
            grace_secs = self.config.grace_period_secs,
            "termination timed out; killing process forcefully"
        );
        signal_group(child, GroupSignal::Kill);
        if let Err(e) = child.kill().await {
            tracing::warn!(error = %e, "error during forced kill");
        }
        Termination::Forced
    }
}

/// Per-run bookkeeping for the state machine.
struct Run {
    state: RunState,
    script_path: Option<PathBuf>,
}

impl Run {
    fn new() -> Self {
        Self {
            state: RunState::NotStarted,
            script_path: None,
        }
    }

    fn advance(&mut self, to: RunState) -> Result<(), RunnerFault> {
        if !self.state.can_advance_to(to) {
            return Err(RunnerFault::IllegalTransition {
                from: self.state,
                to,
            });
        }
        tracing::debug!(from = %self.state, to = %to, "runner transition");
        self.state = to;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum GroupSignal {
    Terminate,
    Kill,
}

#[cfg(unix)]
fn signal_group(child: &Child, signal: GroupSignal) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };
    let sig = match signal {
        GroupSignal::Terminate => Signal::SIGTERM,
        GroupSignal::Kill => Signal::SIGKILL,
    };
    if let Err(e) = killpg(Pid::from_raw(pid as i32), sig) {
        tracing::debug!(pid, signal = ?sig, error = %e, "process group signal failed");
    }
}

#[cfg(not(unix))]
fn signal_group(_child: &Child, _signal: GroupSignal) {}

fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}

/// Drains one pipe on its own task into a shared buffer.
///
/// The buffer is shared so that whatever was read before a drain timeout
/// survives aborting the task.
struct OutputCollector {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: Option<JoinHandle<()>>,
}

impl OutputCollector {
    fn spawn<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let task = pipe.map(|mut pipe| {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move {
                let mut chunk = [0u8; 8192];
                loop {
                    match pipe.read(&mut chunk).await {
                        Ok(0) => break,
                        Ok(n) => buffer
                            .lock()
                            .unwrap_or_else(|poisoned| poisoned.into_inner())
                            .extend_from_slice(&chunk[..n]),
                        Err(e) => {
                            tracing::debug!(error = %e, "pipe read failed");
                            break;
                        }
                    }
                }
            })
        });
        Self { buffer, task }
    }

    /// Wait for end-of-stream (bounded by `drain`) and decode lossily.
    async fn finish(self, drain: Duration) -> String {
        if let Some(mut task) = self.task {
            if tokio::time::timeout(drain, &mut task).await.is_err() {
                tracing::warn!(
                    drain_secs = drain.as_secs(),
                    "output pipe still open after child exit; keeping what was read"
                );
                task.abort();
            }
        }
        let bytes = self
            .buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let text = String::from_utf8_lossy(&bytes).into_owned();
        text
    }
}
