//! Generation stages: instruction in, structured payload out.
//!
//! Both stages talk to the model through [`TextGenerator`], so tests and
//! alternative backends plug in without touching stage logic. A stage either
//! returns its full payload or a [`GenerationError`]; nothing partial, no
//! retries.

mod client;
pub mod script;
pub mod test_cases;

pub use client::RigGenerator;
pub use script::generate_script;
pub use test_cases::generate_test_cases;

use async_trait::async_trait;
use autotest_engine::RepairError;
use thiserror::Error;

/// One call to the text-generation service.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f64,
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("failed to build model client: {0}")]
    Client(String),

    #[error("model request failed: {0}")]
    Inference(String),

    #[error("model request timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("model returned an empty or blocked response")]
    EmptyResponse,

    #[error("could not parse test cases from model response")]
    Parse(#[from] RepairError),

    #[error("model response is not a list of test cases: {0}")]
    UnexpectedShape(String),

    #[error("no script code block found in model response")]
    NoScript,

    #[error("failed to serialize test cases for the prompt")]
    Serialize(#[from] serde_json::Error),
}

/// Black-box text generation.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Return the model's raw text for `request`.
    ///
    /// Implementations map an empty response to
    /// [`GenerationError::EmptyResponse`].
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays queued responses and records every request.
    pub struct CannedGenerator {
        responses: Mutex<VecDeque<Result<String, GenerationError>>>,
        requests: Mutex<Vec<GenerationRequest>>,
    }

    impl CannedGenerator {
        pub fn new(response: &str) -> Self {
            Self::sequence(vec![Ok(response.to_string())])
        }

        pub fn failing(error: GenerationError) -> Self {
            Self::sequence(vec![Err(error)])
        }

        pub fn sequence(responses: Vec<Result<String, GenerationError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn last_request(&self) -> Option<GenerationRequest> {
            self.requests.lock().unwrap().last().cloned()
        }
    }

    #[async_trait]
    impl TextGenerator for CannedGenerator {
        async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(GenerationError::EmptyResponse))
        }
    }
}
