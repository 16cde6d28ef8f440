use async_trait::async_trait;
use rig::client::{CompletionClient, ProviderClient};
use rig::completion::Prompt;
use rig::providers::anthropic;

use crate::domain::ports::{GenerationRequest, LlmService};
use crate::domain::DomainError;

// Anthropic rejects requests without an explicit output budget.
const DEFAULT_MAX_TOKENS: u64 = 1024;

/// Claude models through `rig`. Reads `ANTHROPIC_API_KEY`.
pub struct AnthropicLlm {
    client: anthropic::Client,
    model: String,
}

impl AnthropicLlm {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: anthropic::Client::from_env(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl LlmService for AnthropicLlm {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, DomainError> {
        let agent = self
            .client
            .agent(&self.model)
            .preamble(&request.system)
            .temperature(request.temperature)
            .max_tokens(request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS))
            .build();

        agent
            .prompt(request.render_prompt())
            .await
            .map_err(|e| DomainError::generation(format!("{}: {e}", self.model)))
    }

    fn model(&self) -> &str {
        &self.model
    }
}
