use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::domain::{
    ports::{GenerationRequest, LlmService},
    Answer, DomainError, GroundingMode, Message, RetrievedContext, Topic,
};

const NO_CONTEXT: &str = "(no context retrieved)";

/// System prompt templates.
///
/// Placeholders: `{context}` in both system prompts, `{refusal}` and
/// `{directives}` in the strict one, `{topics}` in the refusal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplates {
    pub strict_system: String,
    pub strict_directives: String,
    pub refusal: String,
    pub open_system: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            strict_system: "You are a strict medical information assistant. \
                Use ONLY the provided context to answer the user's question. \
                Do not use your own internal knowledge.\n\n\
                ### RULES:\n\
                1. If the context contains the answer, provide it clearly and stop. DO NOT add any apologies.\n\
                2. ONLY if the context does not contain the answer at all, say exactly: '{refusal}'\n\
                {directives}\n\
                ### CONTEXT:\n\
                {context}"
                .to_string(),
            strict_directives: "3. Start with one sentence introducing the disease the question is about.\n\
                4. If you use bullet points, explain each one briefly.\n\
                5. End with one short follow-up question the user could ask next.\n\
                6. Keep the answer under 200 words.\n"
                .to_string(),
            refusal: "I am Sorry. I can't find the answer for this. \
                However, I can provide answer for the following diseases: {topics}."
                .to_string(),
            open_system: "You are a medical information assistant. \
                First answer the question using the provided context. \
                If the context does not contain the answer, use your own internal knowledge.\n\n\
                ### CONTEXT:\n\
                {context}"
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f64,
    pub max_tokens: Option<u64>,
    /// Hard cap applied to the generated text, cut at a word boundary.
    pub max_output_chars: Option<usize>,
    pub timeout: Duration,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: None,
            max_output_chars: None,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Builds the grounding prompt, calls the model once and applies the
/// grounding policy to what comes back.
pub struct AnswerComposer {
    llm: Arc<dyn LlmService>,
    templates: PromptTemplates,
    options: GenerationOptions,
    refusal: String,
}

impl AnswerComposer {
    pub fn new(
        llm: Arc<dyn LlmService>,
        templates: PromptTemplates,
        topics: &[Topic],
        options: GenerationOptions,
    ) -> Self {
        let refusal = templates.refusal.replace("{topics}", &format_topics(topics));
        Self {
            llm,
            templates,
            options,
            refusal,
        }
    }

    /// The exact strict-mode refusal, naming every configured topic.
    pub fn refusal(&self) -> &str {
        &self.refusal
    }

    pub fn build_request(
        &self,
        question: &str,
        context: &RetrievedContext,
        history: &[Message],
        mode: GroundingMode,
    ) -> GenerationRequest {
        let template = match mode {
            GroundingMode::Strict => self
                .templates
                .strict_system
                .replace("{refusal}", &self.refusal)
                .replace("{directives}", &self.templates.strict_directives),
            GroundingMode::Open => self.templates.open_system.clone(),
        };
        let system = template.replace("{context}", &render_context(context));

        GenerationRequest::new(system, question)
            .with_history(history.to_vec())
            .with_temperature(self.options.temperature)
            .with_max_tokens(self.options.max_tokens)
    }

    #[instrument(skip(self, question, context, history), fields(mode = %mode, context = context.len()))]
    pub async fn compose(
        &self,
        question: &str,
        context: &RetrievedContext,
        history: &[Message],
        mode: GroundingMode,
    ) -> Result<Answer, DomainError> {
        if mode == GroundingMode::Strict && context.is_empty() {
            info!("no context retrieved, refusing");
            return Ok(Answer::refusal(self.refusal.clone()));
        }

        let request = self.build_request(question, context, history, mode);
        let generated = tokio::time::timeout(self.options.timeout, self.llm.generate(&request))
            .await
            .map_err(|_| {
                DomainError::generation(format!(
                    "model '{}' timed out after {:?}",
                    self.llm.model(),
                    self.options.timeout
                ))
            })??;

        self.finish(&generated, context, mode)
    }

    fn finish(
        &self,
        generated: &str,
        context: &RetrievedContext,
        mode: GroundingMode,
    ) -> Result<Answer, DomainError> {
        let text = match mode {
            GroundingMode::Strict if self.is_refusal(generated) => {
                return Ok(Answer::refusal(self.refusal.clone()));
            }
            GroundingMode::Strict => generated.trim().to_string(),
            GroundingMode::Open => strip_all(generated, &self.refusal).trim().to_string(),
        };

        if text.is_empty() {
            return Err(DomainError::generation("model returned an empty answer"));
        }

        let text = match self.options.max_output_chars {
            Some(limit) if text.chars().count() > limit => {
                warn!(limit, "answer truncated");
                truncate_at_word(&text, limit)
            }
            _ => text,
        };

        Ok(Answer::grounded(text, mode, context))
    }

    /// Models tend to quote the refusal or reflow its whitespace, so the
    /// match is on its normalised lead-in rather than exact bytes.
    fn is_refusal(&self, generated: &str) -> bool {
        let lead = self
            .templates
            .refusal
            .split("{topics}")
            .next()
            .unwrap_or_default();
        let lead = normalize(lead);
        !lead.is_empty() && normalize(generated).contains(&lead)
    }
}

/// Removes `needle` until none is left; a single pass can splice two halves
/// back into a whole occurrence.
fn strip_all(text: &str, needle: &str) -> String {
    let mut text = text.to_string();
    if needle.is_empty() {
        return text;
    }
    while text.contains(needle) {
        text = text.replace(needle, "");
    }
    text
}

/// `A`, `A and B`, `A, B, and C`.
pub(crate) fn format_topics(topics: &[Topic]) -> String {
    match topics {
        [] => String::new(),
        [only] => only.to_string(),
        [first, second] => format!("{first} and {second}"),
        [init @ .., last] => {
            let head = init.iter().map(Topic::as_str).collect::<Vec<_>>().join(", ");
            format!("{head}, and {last}")
        }
    }
}

fn render_context(context: &RetrievedContext) -> String {
    if context.is_empty() {
        return NO_CONTEXT.to_string();
    }

    context
        .results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "[{}] ({}, page {})\n{}",
                i + 1,
                r.chunk.topic,
                r.chunk.page,
                r.chunk.content.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
        .replace(['\u{2019}', '\u{2018}'], "'")
}

fn truncate_at_word(text: &str, limit: usize) -> String {
    let mut chars = text.chars();
    let cut: String = chars.by_ref().take(limit).collect();
    if chars.next().map_or(true, char::is_whitespace) {
        return cut.trim_end().to_string();
    }
    let trimmed = match cut.rfind(char::is_whitespace) {
        Some(pos) if pos > 0 => &cut[..pos],
        _ => cut.as_str(),
    };
    trimmed.trim_end().to_string()
}
