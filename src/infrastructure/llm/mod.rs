mod anthropic;
mod openai;

pub use anthropic::AnthropicLlm;
pub use openai::OpenAiLlm;
