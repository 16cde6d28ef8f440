use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::{
    ports::{DocumentLoader, EmbeddingService, IndexProvider},
    ChunkingOptions, Document, DocumentChunk, DomainError, Embedding, RecursiveSplitter, Topic,
};

#[derive(Debug, Clone, Serialize)]
pub struct IngestionReport {
    pub topic: Topic,
    pub document_id: Uuid,
    pub source: PathBuf,
    pub pages: usize,
    pub chunks: usize,
}

/// Loads a document, splits it, embeds the chunks and replaces the topic's
/// index with the result.
pub struct IngestionService {
    loader: Arc<dyn DocumentLoader>,
    embedding: Arc<dyn EmbeddingService>,
    indexes: Arc<dyn IndexProvider>,
    options: ChunkingOptions,
    batch_size: usize,
}

impl IngestionService {
    pub fn new(
        loader: Arc<dyn DocumentLoader>,
        embedding: Arc<dyn EmbeddingService>,
        indexes: Arc<dyn IndexProvider>,
        options: ChunkingOptions,
    ) -> Self {
        Self {
            loader,
            embedding,
            indexes,
            options,
            batch_size: 64,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[instrument(skip_all, fields(topic = %topic, path = %path.display()))]
    pub async fn ingest(&self, topic: &Topic, path: &Path) -> Result<IngestionReport, DomainError> {
        self.ingest_with(topic, path, self.options).await
    }

    #[instrument(skip_all, fields(topic = %topic, path = %path.display(), chunk_size = options.chunk_size))]
    pub async fn ingest_with(
        &self,
        topic: &Topic,
        path: &Path,
        options: ChunkingOptions,
    ) -> Result<IngestionReport, DomainError> {
        options.validate()?;
        let document = self.loader.load(path, topic).await?;
        self.ingest_document(&document, options).await
    }

    /// Chunks and embeds `document`, then swaps it in as the whole content
    /// of its topic's index. Nothing is written unless every chunk was
    /// embedded.
    #[instrument(skip(self, document, options), fields(topic = %document.topic, document_id = %document.id))]
    pub async fn ingest_document(
        &self,
        document: &Document,
        options: ChunkingOptions,
    ) -> Result<IngestionReport, DomainError> {
        let splitter = RecursiveSplitter::new(options)?;
        let chunks = splitter.split_document(document);

        if chunks.is_empty() {
            warn!(source = %document.source.display(), "document has no extractable text");
        }

        let embeddings = self.embed_chunks(&chunks).await?;
        let entries: Vec<(DocumentChunk, Embedding)> = chunks.into_iter().zip(embeddings).collect();
        let chunk_count = entries.len();

        let index = self.indexes.open_or_create(&document.topic).await?;
        index.replace(entries).await?;

        info!(pages = document.pages.len(), chunks = chunk_count, "document ingested");

        Ok(IngestionReport {
            topic: document.topic.clone(),
            document_id: document.id,
            source: document.source.clone(),
            pages: document.pages.len(),
            chunks: chunk_count,
        })
    }

    async fn embed_chunks(&self, chunks: &[DocumentChunk]) -> Result<Vec<Embedding>, DomainError> {
        let mut embeddings = Vec::with_capacity(chunks.len());
        let dimension = self.embedding.dimension();

        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<&str> = batch.iter().map(|c| c.content.as_str()).collect();
            let vectors = self.embedding.embed_batch(&texts).await?;

            if vectors.len() != batch.len() {
                return Err(DomainError::embedding(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }
            if let Some(bad) = vectors
                .iter()
                .find(|v| v.dimension() != dimension || !v.is_finite())
            {
                return Err(DomainError::embedding(format!(
                    "invalid embedding of dimension {} (expected {dimension})",
                    bad.dimension()
                )));
            }

            embeddings.extend(vectors);
        }

        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{HashingEmbedding, InMemoryIndexProvider};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticLoader(String);

    #[async_trait]
    impl DocumentLoader for StaticLoader {
        async fn load(&self, path: &Path, topic: &Topic) -> Result<Document, DomainError> {
            if path.as_os_str().is_empty() {
                return Err(DomainError::not_found("empty path"));
            }
            Ok(Document::from_text(topic.clone(), path, self.0.clone()))
        }
    }

    /// Fails on the second batch.
    struct FlakyEmbedding {
        inner: HashingEmbedding,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingService for FlakyEmbedding {
        async fn embed(&self, text: &str) -> Result<Embedding, DomainError> {
            self.inner.embed(text).await
        }

        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 1 {
                return Err(DomainError::embedding("quota exceeded"));
            }
            self.inner.embed_batch(texts).await
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }

        fn model(&self) -> &str {
            "flaky"
        }
    }

    fn text() -> String {
        "Malaria is caused by Plasmodium parasites.\n\n\
         It is transmitted by Anopheles mosquitoes.\n\n\
         Bed nets and repellents reduce bites."
            .to_string()
    }

    fn service(
        embedding: Arc<dyn EmbeddingService>,
        provider: Arc<InMemoryIndexProvider>,
    ) -> IngestionService {
        IngestionService::new(
            Arc::new(StaticLoader(text())),
            embedding,
            provider,
            ChunkingOptions::new(50, 10).unwrap(),
        )
        .with_batch_size(1)
    }

    #[tokio::test]
    async fn test_ingest_writes_all_chunks() {
        let provider = Arc::new(InMemoryIndexProvider::new());
        let svc = service(Arc::new(HashingEmbedding::new(64)), provider.clone());
        let topic = Topic::new("Malaria").unwrap();

        let report = svc.ingest(&topic, Path::new("malaria.txt")).await.unwrap();

        assert!(report.chunks >= 3);
        assert_eq!(report.pages, 1);
        let index = provider.open(&topic).await.unwrap();
        assert_eq!(index.stats().await.unwrap().chunks, report.chunks);
    }

    #[tokio::test]
    async fn test_reingest_replaces_previous_chunks() {
        let provider = Arc::new(InMemoryIndexProvider::new());
        let svc = service(Arc::new(HashingEmbedding::new(64)), provider.clone());
        let topic = Topic::new("Malaria").unwrap();

        let first = svc.ingest(&topic, Path::new("malaria.txt")).await.unwrap();
        let second = svc.ingest(&topic, Path::new("malaria.txt")).await.unwrap();

        let stats = provider.open(&topic).await.unwrap().stats().await.unwrap();
        assert_eq!(stats.chunks, second.chunks);
        assert_eq!(stats.chunks, first.chunks);
        assert_eq!(stats.documents, Some(1));
    }

    #[tokio::test]
    async fn test_embedding_failure_leaves_index_untouched() {
        let provider = Arc::new(InMemoryIndexProvider::new());
        let topic = Topic::new("Malaria").unwrap();

        let good = service(Arc::new(HashingEmbedding::new(64)), provider.clone());
        let before = good.ingest(&topic, Path::new("malaria.txt")).await.unwrap();

        let flaky = service(
            Arc::new(FlakyEmbedding {
                inner: HashingEmbedding::new(64),
                calls: AtomicUsize::new(0),
            }),
            provider.clone(),
        );
        let err = flaky.ingest(&topic, Path::new("malaria.txt")).await.unwrap_err();
        assert!(matches!(err, DomainError::Embedding(_)));

        let stats = provider.open(&topic).await.unwrap().stats().await.unwrap();
        assert_eq!(stats.chunks, before.chunks);
    }

    #[tokio::test]
    async fn test_rejects_invalid_overlap() {
        let provider = Arc::new(InMemoryIndexProvider::new());
        let svc = service(Arc::new(HashingEmbedding::new(64)), provider);
        let topic = Topic::new("Malaria").unwrap();
        let bad = ChunkingOptions {
            chunk_size: 10,
            chunk_overlap: 10,
        };

        let err = svc
            .ingest_with(&topic, Path::new("malaria.txt"), bad)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn test_loader_not_found_propagates() {
        let provider = Arc::new(InMemoryIndexProvider::new());
        let svc = service(Arc::new(HashingEmbedding::new(64)), provider.clone());
        let topic = Topic::new("Malaria").unwrap();

        let err = svc.ingest(&topic, Path::new("")).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
        assert!(provider.open(&topic).await.is_err());
    }
}
