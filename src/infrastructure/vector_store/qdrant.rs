use async_trait::async_trait;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
    PointStruct, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{
    ports::{IndexProvider, IndexStats, TopicIndex},
    DocumentChunk, DomainError, Embedding, SearchResult, Topic,
};

const UPSERT_BATCH: usize = 256;

/// One Qdrant collection per topic, named `<prefix><topic>`.
pub struct QdrantIndexProvider {
    client: Arc<Qdrant>,
    prefix: String,
    dimension: usize,
}

impl QdrantIndexProvider {
    pub fn new(url: &str, prefix: &str, dimension: usize) -> Result<Self, DomainError> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| DomainError::index(e.to_string()))?;

        Ok(Self {
            client: Arc::new(client),
            prefix: prefix.to_string(),
            dimension,
        })
    }

    pub fn collection_name(&self, topic: &Topic) -> String {
        format!("{}{}", self.prefix, topic)
    }

    fn index(&self, topic: &Topic) -> Arc<dyn TopicIndex> {
        Arc::new(QdrantTopicIndex {
            client: Arc::clone(&self.client),
            topic: topic.clone(),
            collection: self.collection_name(topic),
        })
    }
}

#[async_trait]
impl IndexProvider for QdrantIndexProvider {
    async fn open(&self, topic: &Topic) -> Result<Arc<dyn TopicIndex>, DomainError> {
        let collection = self.collection_name(topic);
        let exists = self
            .client
            .collection_exists(collection.as_str())
            .await
            .map_err(|e| DomainError::index_unavailable(topic.as_str(), e.to_string()))?;

        if !exists {
            return Err(DomainError::index_unavailable(
                topic.as_str(),
                format!("collection '{collection}' does not exist"),
            ));
        }
        Ok(self.index(topic))
    }

    async fn open_or_create(&self, topic: &Topic) -> Result<Arc<dyn TopicIndex>, DomainError> {
        let collection = self.collection_name(topic);
        let exists = self
            .client
            .collection_exists(collection.as_str())
            .await
            .map_err(|e| DomainError::index(e.to_string()))?;

        if !exists {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&collection).vectors_config(
                        VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine),
                    ),
                )
                .await
                .map_err(|e| DomainError::index(e.to_string()))?;
            info!(collection = %collection, dimension = self.dimension, "created collection");
        }

        Ok(self.index(topic))
    }
}

/// Points carry a `generation` tag. `replace` writes a new generation and
/// then drops every point of older ones, so a reader may briefly see both
/// but never an empty or partial index.
pub struct QdrantTopicIndex {
    client: Arc<Qdrant>,
    topic: Topic,
    collection: String,
}

impl QdrantTopicIndex {
    fn point(
        &self,
        chunk: &DocumentChunk,
        embedding: &Embedding,
        generation: Uuid,
    ) -> Result<PointStruct, DomainError> {
        let payload: Payload = serde_json::json!({
            "document_id": chunk.document_id.to_string(),
            "topic": chunk.topic.as_str(),
            "chunk_index": chunk.chunk_index,
            "page": chunk.page,
            "start": chunk.start,
            "end": chunk.end,
            "content": chunk.content,
            "generation": generation.to_string(),
        })
        .try_into()
        .map_err(|_| DomainError::internal("Failed to create payload"))?;

        Ok(PointStruct::new(
            chunk.id.to_string(),
            embedding.as_slice().to_vec(),
            payload,
        ))
    }

    async fn upsert_points(&self, points: Vec<PointStruct>) -> Result<(), DomainError> {
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .map_err(|e| DomainError::index(e.to_string()))?;
        Ok(())
    }

    async fn delete_where(&self, filter: Filter) -> Result<(), DomainError> {
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(filter)
                    .wait(true),
            )
            .await
            .map_err(|e| DomainError::index(e.to_string()))?;
        Ok(())
    }
}

fn chunk_from_payload(
    id: Uuid,
    payload: &HashMap<String, qdrant_client::qdrant::Value>,
) -> Option<DocumentChunk> {
    let int = |key: &str| payload.get(key)?.as_integer().map(|v| v as usize);

    Some(DocumentChunk {
        id,
        document_id: payload.get("document_id")?.as_str()?.parse().ok()?,
        topic: Topic::new(payload.get("topic")?.as_str()?.as_str()).ok()?,
        chunk_index: int("chunk_index")?,
        page: int("page")?,
        start: int("start")?,
        end: int("end")?,
        content: payload.get("content")?.as_str()?.to_string(),
    })
}

#[async_trait]
impl TopicIndex for QdrantTopicIndex {
    fn topic(&self) -> &Topic {
        &self.topic
    }

    async fn replace(&self, entries: Vec<(DocumentChunk, Embedding)>) -> Result<(), DomainError> {
        let generation = Uuid::new_v4();

        for batch in entries.chunks(UPSERT_BATCH) {
            let points = batch
                .iter()
                .map(|(chunk, embedding)| self.point(chunk, embedding, generation))
                .collect::<Result<Vec<_>, _>>()?;
            self.upsert_points(points).await?;
        }

        self.delete_where(Filter::must_not([Condition::matches(
            "generation",
            generation.to_string(),
        )]))
        .await?;

        debug!(collection = %self.collection, chunks = entries.len(), %generation, "replaced index");
        Ok(())
    }

    async fn search(
        &self,
        query: &Embedding,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, query.as_slice().to_vec(), top_k as u64)
                    .with_payload(true),
            )
            .await
            .map_err(|e| DomainError::index(e.to_string()))?;

        Ok(response
            .result
            .into_iter()
            .filter_map(|point| {
                let id = match point.id?.point_id_options? {
                    qdrant_client::qdrant::point_id::PointIdOptions::Uuid(s) => s.parse().ok()?,
                    qdrant_client::qdrant::point_id::PointIdOptions::Num(_) => return None,
                };
                Some(SearchResult {
                    chunk: chunk_from_payload(id, &point.payload)?,
                    score: point.score,
                })
            })
            .collect())
    }

    async fn stats(&self) -> Result<IndexStats, DomainError> {
        let response = self
            .client
            .count(CountPointsBuilder::new(&self.collection).exact(true))
            .await
            .map_err(|e| DomainError::index(e.to_string()))?;

        Ok(IndexStats {
            chunks: response.result.map(|r| r.count as usize).unwrap_or(0),
            documents: None,
        })
    }
}
