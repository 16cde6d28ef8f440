//! Application layer - Use cases and orchestration.
//!
//! This module contains the ingestion, retrieval and answer-composition
//! services. Services depend on domain ports (traits) rather than concrete
//! implementations.

pub mod services;

pub use services::{
    AnswerComposer, GenerationOptions, IngestionReport, IngestionService, MultiIndexRetriever,
    PromptTemplates, RagAssistant, RetryPolicy,
};
