use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::domain::{
    ports::{IndexProvider, IndexStats, TopicIndex},
    DocumentChunk, DomainError, Embedding, SearchResult, Topic,
};

type Entries = Arc<Vec<(DocumentChunk, Embedding)>>;

/// Non-persistent index. Writers build a new entry list and swap it in, so
/// searches always see a complete snapshot.
pub struct InMemoryTopicIndex {
    topic: Topic,
    entries: RwLock<Entries>,
}

impl InMemoryTopicIndex {
    pub fn new(topic: Topic) -> Self {
        Self {
            topic,
            entries: RwLock::new(Arc::new(Vec::new())),
        }
    }

    fn snapshot(&self) -> Result<Entries, DomainError> {
        self.entries
            .read()
            .map(|e| Arc::clone(&e))
            .map_err(|e| DomainError::internal(e.to_string()))
    }
}

#[async_trait]
impl TopicIndex for InMemoryTopicIndex {
    fn topic(&self) -> &Topic {
        &self.topic
    }

    async fn replace(&self, entries: Vec<(DocumentChunk, Embedding)>) -> Result<(), DomainError> {
        let mut store = self
            .entries
            .write()
            .map_err(|e| DomainError::internal(e.to_string()))?;
        *store = Arc::new(entries);
        Ok(())
    }

    async fn search(
        &self,
        query: &Embedding,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError> {
        let entries = self.snapshot()?;
        Ok(super::rank(&entries, query, top_k))
    }

    async fn stats(&self) -> Result<IndexStats, DomainError> {
        Ok(super::stats(&self.snapshot()?))
    }
}

#[derive(Default)]
pub struct InMemoryIndexProvider {
    indexes: RwLock<HashMap<Topic, Arc<InMemoryTopicIndex>>>,
}

impl InMemoryIndexProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IndexProvider for InMemoryIndexProvider {
    async fn open(&self, topic: &Topic) -> Result<Arc<dyn TopicIndex>, DomainError> {
        let indexes = self
            .indexes
            .read()
            .map_err(|e| DomainError::internal(e.to_string()))?;

        indexes
            .get(topic)
            .map(|index| Arc::clone(index) as Arc<dyn TopicIndex>)
            .ok_or_else(|| DomainError::index_unavailable(topic.as_str(), "not ingested"))
    }

    async fn open_or_create(&self, topic: &Topic) -> Result<Arc<dyn TopicIndex>, DomainError> {
        let mut indexes = self
            .indexes
            .write()
            .map_err(|e| DomainError::internal(e.to_string()))?;

        let index = indexes
            .entry(topic.clone())
            .or_insert_with(|| Arc::new(InMemoryTopicIndex::new(topic.clone())));
        Ok(Arc::clone(index) as Arc<dyn TopicIndex>)
    }
}
