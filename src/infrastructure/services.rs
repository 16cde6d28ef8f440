use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::config::{
    AppConfig, EmbeddingConfig, EmbeddingProvider, LlmConfig, LlmProvider, VectorBackend,
    VectorStoreConfig,
};
use super::{
    AnthropicLlm, FileIndexProvider, FsDocumentLoader, HashingEmbedding, InMemoryIndexProvider,
    OpenAiLlm, QdrantIndexProvider, TextEmbedding,
};
use crate::application::{AnswerComposer, IngestionService, MultiIndexRetriever, RagAssistant};
use crate::domain::{
    ports::{EmbeddingService, IndexProvider, LlmService},
    DomainError, Topic,
};

pub fn embedding_from_config(config: &EmbeddingConfig) -> Arc<dyn EmbeddingService> {
    match config.provider {
        EmbeddingProvider::OpenAi => Arc::new(TextEmbedding::from_config(config)),
        EmbeddingProvider::Hashing => Arc::new(HashingEmbedding::new(config.dimension)),
    }
}

pub fn llm_from_config(config: &LlmConfig) -> Arc<dyn LlmService> {
    match config.provider {
        LlmProvider::OpenAi => Arc::new(OpenAiLlm::new(&config.model)),
        LlmProvider::Anthropic => Arc::new(AnthropicLlm::new(&config.model)),
    }
}

pub fn indexes_from_config(
    config: &VectorStoreConfig,
    dimension: usize,
) -> Result<Arc<dyn IndexProvider>, DomainError> {
    Ok(match config.backend {
        VectorBackend::File => Arc::new(FileIndexProvider::new(&config.dir)),
        VectorBackend::Qdrant => Arc::new(QdrantIndexProvider::new(
            &config.qdrant_url,
            &config.collection_prefix,
            dimension,
        )?),
        VectorBackend::Memory => Arc::new(InMemoryIndexProvider::new()),
    })
}

/// The application services wired from configuration.
pub struct Services {
    pub topics: Vec<Topic>,
    pub ingestion: Arc<IngestionService>,
    pub assistant: Arc<RagAssistant>,
}

impl Services {
    pub fn from_config(app: &AppConfig) -> Result<Self, DomainError> {
        Self::with_llm(app, llm_from_config(&app.config.llm))
    }

    /// Like `from_config` but with a caller-supplied language model.
    pub fn with_llm(app: &AppConfig, llm: Arc<dyn LlmService>) -> Result<Self, DomainError> {
        let config = &app.config;
        let topics = config.topics()?;

        let embedding = embedding_from_config(&config.embedding);
        let indexes = indexes_from_config(&config.vector_store, config.embedding.dimension)?;

        let ingestion = IngestionService::new(
            Arc::new(FsDocumentLoader::new()),
            Arc::clone(&embedding),
            Arc::clone(&indexes),
            config.chunking(),
        )
        .with_batch_size(config.embedding.batch_size);

        let retriever = MultiIndexRetriever::new(embedding, indexes, topics.clone(), config.rag.top_k)
            .with_index_timeout(Duration::from_secs(config.rag.index_timeout_seconds));

        let composer = AnswerComposer::new(
            llm,
            app.prompt_templates(),
            &topics,
            config.generation_options(),
        );

        let assistant = RagAssistant::new(Arc::new(retriever), Arc::new(composer))
            .with_history_turns(config.rag.history_turns)
            .with_retry(config.retry_policy());

        info!(
            topics = topics.len(),
            backend = ?config.vector_store.backend,
            embedding = ?config.embedding.provider,
            llm = ?config.llm.provider,
            "services ready"
        );

        Ok(Self {
            topics,
            ingestion: Arc::new(ingestion),
            assistant: Arc::new(assistant),
        })
    }
}
