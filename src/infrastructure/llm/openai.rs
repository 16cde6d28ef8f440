use async_trait::async_trait;
use rig::client::{CompletionClient, ProviderClient};
use rig::completion::Prompt;
use rig::providers::openai;

use crate::domain::ports::{GenerationRequest, LlmService};
use crate::domain::DomainError;

/// OpenAI chat models through `rig`. Reads `OPENAI_API_KEY`.
pub struct OpenAiLlm {
    client: openai::Client,
    model: String,
}

impl OpenAiLlm {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: openai::Client::from_env(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl LlmService for OpenAiLlm {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, DomainError> {
        let mut builder = self
            .client
            .agent(&self.model)
            .preamble(&request.system)
            .temperature(request.temperature);
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(max_tokens);
        }
        let agent = builder.build();

        agent
            .prompt(request.render_prompt())
            .await
            .map_err(|e| DomainError::generation(format!("{}: {e}", self.model)))
    }

    fn model(&self) -> &str {
        &self.model
    }
}
