use std::time::Duration;

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::openai;

use super::{GenerationError, GenerationRequest, TextGenerator};
use crate::config::AutotestConfig;

/// [`TextGenerator`] backed by an OpenAI-compatible chat-completions endpoint.
pub struct RigGenerator {
    client: openai::CompletionsClient,
    timeout: Duration,
}

impl RigGenerator {
    pub fn new(url: &str, api_key: &str, timeout: Duration) -> Result<Self, GenerationError> {
        let client = openai::CompletionsClient::builder()
            .api_key(api_key)
            .base_url(url)
            .build()
            .map_err(|e| GenerationError::Client(e.to_string()))?;
        Ok(Self { client, timeout })
    }

    pub fn from_config(config: &AutotestConfig) -> anyhow::Result<Self> {
        let api_key = config.require_api_key()?;
        Ok(Self::new(
            &config.llm_url,
            api_key,
            config.request_timeout(),
        )?)
    }
}

#[async_trait]
impl TextGenerator for RigGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let agent = self
            .client
            .agent(&request.model)
            .temperature(request.temperature)
            .build();

        tracing::debug!(
            model = %request.model,
            prompt_chars = request.prompt.len(),
            "sending generation request"
        );

        let response: String =
            match tokio::time::timeout(self.timeout, agent.prompt(request.prompt.as_str())).await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => return Err(GenerationError::Inference(e.to_string())),
                Err(_elapsed) => {
                    tracing::warn!(
                        model = %request.model,
                        timeout_secs = self.timeout.as_secs(),
                        "generation request exceeded timeout"
                    );
                    return Err(GenerationError::Timeout {
                        secs: self.timeout.as_secs(),
                    });
                }
            };

        if response.trim().is_empty() {
            tracing::warn!(model = %request.model, "model response was empty or blocked");
            return Err(GenerationError::EmptyResponse);
        }
        tracing::debug!(response_chars = response.len(), "generation response received");
        Ok(response)
    }
}
