//! Autotest Agents
//!
//! The model-facing half of autotest: configuration, the text-generation
//! client, the two generation stages, the page-content service and the
//! session that drives a requirement through to an execution report.
//!
//! ```text
//! requirement ──Stage A──▶ Snapshot ──apply_edits(Delta)*──▶ Snapshot
//!     ──normalize + page excerpt──▶ Stage B ──▶ Artifact ──execute──▶ ExecutionReport
//! ```

pub mod config;
pub mod generation;
pub mod page;
pub mod prompts;
pub mod session;
pub mod state_machine;

pub use config::{AutotestConfig, ConfigError};
pub use generation::{GenerationError, GenerationRequest, RigGenerator, TextGenerator};
pub use page::{HttpPageFetcher, PageError, PageFetcher};
pub use session::{Artifact, Session, SessionError, SessionSettings, Stage};
pub use state_machine::{Action, IllegalAction, PipelineMachine, PipelinePhase};
