use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::domain::{errors::DomainError, DocumentChunk, Embedding, SearchResult, Topic};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub chunks: usize,
    /// Distinct source documents, when the backend can count them cheaply.
    pub documents: Option<usize>,
}

/// The vectors of one topic.
///
/// Readers must never observe a half-applied write: `replace` swaps the
/// whole content at once.
#[async_trait]
pub trait TopicIndex: Send + Sync {
    fn topic(&self) -> &Topic;

    /// Makes `entries` the entire content of the index.
    async fn replace(&self, entries: Vec<(DocumentChunk, Embedding)>) -> Result<(), DomainError>;

    /// Top `top_k` chunks by descending similarity.
    async fn search(&self, query: &Embedding, top_k: usize)
        -> Result<Vec<SearchResult>, DomainError>;

    async fn stats(&self) -> Result<IndexStats, DomainError>;
}

/// Opens topic indexes by name.
#[async_trait]
pub trait IndexProvider: Send + Sync {
    /// Opens an existing index; `IndexUnavailable` if it is missing or
    /// cannot be read.
    async fn open(&self, topic: &Topic) -> Result<Arc<dyn TopicIndex>, DomainError>;

    /// Opens an index for writing, creating an empty one if absent.
    async fn open_or_create(&self, topic: &Topic) -> Result<Arc<dyn TopicIndex>, DomainError>;
}
