use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, warn};

use super::{AnswerComposer, MultiIndexRetriever};
use crate::domain::{recent_turns, Answer, DomainError, GroundingMode, Message, Topic};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::ZERO,
        }
    }

    /// Exponential: `backoff`, `2 * backoff`, `4 * backoff`, ...
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_millis(500),
        }
    }
}

/// One conversational turn: retrieve across all topics, then compose.
pub struct RagAssistant {
    retriever: Arc<MultiIndexRetriever>,
    composer: Arc<AnswerComposer>,
    history_turns: usize,
    retry: RetryPolicy,
}

impl RagAssistant {
    pub fn new(retriever: Arc<MultiIndexRetriever>, composer: Arc<AnswerComposer>) -> Self {
        Self {
            retriever,
            composer,
            history_turns: 2,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_history_turns(mut self, turns: usize) -> Self {
        self.history_turns = turns;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn topics(&self) -> &[Topic] {
        self.retriever.topics()
    }

    pub fn refusal(&self) -> &str {
        self.composer.refusal()
    }

    #[instrument(skip(self, question, history), fields(mode = %mode, history = history.len()))]
    pub async fn answer(
        &self,
        question: &str,
        mode: GroundingMode,
        history: &[Message],
    ) -> Result<Answer, DomainError> {
        let context = self.retriever.retrieve(question).await?;
        let recent: Vec<Message> = recent_turns(history, self.history_turns)
            .into_iter()
            .cloned()
            .collect();

        let mut attempt = 0;
        loop {
            match self.composer.compose(question, &context, &recent, mode).await {
                Ok(answer) => return Ok(answer),
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay(attempt);
                    warn!(attempt, error = %e, delay_ms = delay.as_millis() as u64, "retrying generation");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
