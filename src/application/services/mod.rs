mod assistant;
mod composer;
mod ingestion;
mod retrieval;

pub use assistant::{RagAssistant, RetryPolicy};
pub use composer::{AnswerComposer, GenerationOptions, PromptTemplates};
pub use ingestion::{IngestionReport, IngestionService};
pub use retrieval::MultiIndexRetriever;
