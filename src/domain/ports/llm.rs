use crate::domain::{errors::DomainError, Message};
use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system: String,
    pub history: Vec<Message>,
    pub prompt: String,
    pub temperature: f64,
    pub max_tokens: Option<u64>,
}

impl GenerationRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            history: Vec::new(),
            prompt: prompt.into(),
            temperature: 0.0,
            max_tokens: None,
        }
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u64>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// The user-facing prompt with prior turns folded in.
    pub fn render_prompt(&self) -> String {
        if self.history.is_empty() {
            return self.prompt.clone();
        }

        let context = self
            .history
            .iter()
            .map(|m| format!("{}: {}", m.role.as_str(), m.content))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "Previous conversation:\n{}\n\nCurrent message from user: {}",
            context, self.prompt
        )
    }
}

#[async_trait]
pub trait LlmService: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, DomainError>;
    fn model(&self) -> &str;
}
