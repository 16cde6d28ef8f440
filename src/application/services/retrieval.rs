use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::domain::{
    ports::{EmbeddingService, IndexProvider},
    DomainError, Embedding, RetrievedContext, SearchResult, Topic,
};

/// Fans a query out to every topic index and concatenates the per-topic
/// results in topic order.
pub struct MultiIndexRetriever {
    embedding: Arc<dyn EmbeddingService>,
    indexes: Arc<dyn IndexProvider>,
    topics: Vec<Topic>,
    default_top_k: usize,
    index_timeout: Duration,
}

impl MultiIndexRetriever {
    pub fn new(
        embedding: Arc<dyn EmbeddingService>,
        indexes: Arc<dyn IndexProvider>,
        topics: Vec<Topic>,
        default_top_k: usize,
    ) -> Self {
        Self {
            embedding,
            indexes,
            topics,
            default_top_k,
            index_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_index_timeout(mut self, timeout: Duration) -> Self {
        self.index_timeout = timeout;
        self
    }

    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    #[instrument(skip(self, query), fields(top_k = self.default_top_k))]
    pub async fn retrieve(&self, query: &str) -> Result<RetrievedContext, DomainError> {
        self.retrieve_top_k(query, self.default_top_k).await
    }

    #[instrument(skip(self, query))]
    pub async fn retrieve_top_k(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<RetrievedContext, DomainError> {
        self.retrieve_from(query, &self.topics, top_k).await
    }

    /// Embeds `query` once and searches `topics` concurrently. A topic whose
    /// index cannot be opened or searched in time is skipped, never fatal.
    #[instrument(skip(self, query, topics), fields(topics = topics.len()))]
    pub async fn retrieve_from(
        &self,
        query: &str,
        topics: &[Topic],
        top_k: usize,
    ) -> Result<RetrievedContext, DomainError> {
        let embedding = self.embedding.embed(query).await?;

        let searches = topics
            .iter()
            .map(|topic| self.search_topic(topic, &embedding, top_k));
        let outcomes = join_all(searches).await;

        let mut context = RetrievedContext::default();
        for (topic, outcome) in topics.iter().zip(outcomes) {
            match outcome {
                Ok(results) => {
                    debug!(topic = %topic, hits = results.len(), "topic searched");
                    context.results.extend(results);
                }
                Err(e) => {
                    warn!(topic = %topic, error = %e, "skipping topic index");
                    context.skipped.push(topic.clone());
                }
            }
        }

        debug!(
            results = context.results.len(),
            skipped = context.skipped.len(),
            "retrieval completed"
        );
        Ok(context)
    }

    async fn search_topic(
        &self,
        topic: &Topic,
        embedding: &Embedding,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let search = async {
            let index = self.indexes.open(topic).await?;
            index.search(embedding, top_k).await
        };

        let mut results = tokio::time::timeout(self.index_timeout, search)
            .await
            .map_err(|_| {
                DomainError::index_unavailable(
                    topic.as_str(),
                    format!("search timed out after {:?}", self.index_timeout),
                )
            })??;

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(top_k);
        Ok(results)
    }
}
