use async_trait::async_trait;
use rig::client::{EmbeddingsClient, ProviderClient};
use rig::embeddings::{Embed, EmbedError, EmbeddingModel, EmbeddingsBuilder, TextEmbedder};
use rig::providers::openai;
use std::time::Duration;

use crate::domain::{ports::EmbeddingService, DomainError, Embedding};
use crate::infrastructure::config::EmbeddingConfig;

/// OpenAI embeddings through `rig`. Reads `OPENAI_API_KEY`.
pub struct TextEmbedding {
    client: openai::Client,
    model: String,
    dimension: usize,
    timeout: Duration,
}

impl TextEmbedding {
    pub fn new() -> Self {
        Self {
            client: openai::Client::from_env(),
            model: "text-embedding-3-small".to_string(),
            dimension: 1536,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self::new()
            .with_model(&config.model)
            .with_dimension(config.dimension)
            .with_timeout(Duration::from_secs(config.timeout_seconds))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn request(&self, texts: Vec<String>) -> Result<Vec<Embedding>, DomainError> {
        let model = self.client.embedding_model(&self.model);

        tokio::time::timeout(self.timeout, embed_in_order(model, texts))
            .await
            .map_err(|_| {
                DomainError::embedding(format!("request timed out after {:?}", self.timeout))
            })?
    }
}

/// A text tagged with its position in the request.
struct Positioned {
    position: usize,
    text: String,
}

impl Embed for Positioned {
    fn embed(&self, embedder: &mut TextEmbedder) -> Result<(), EmbedError> {
        embedder.embed(self.text.clone());
        Ok(())
    }
}

/// `EmbeddingsBuilder::build` hands documents back in no particular order,
/// so each text carries its position and the output is sorted by it.
async fn embed_in_order<M: EmbeddingModel>(
    model: M,
    texts: Vec<String>,
) -> Result<Vec<Embedding>, DomainError> {
    let expected = texts.len();
    let builder = EmbeddingsBuilder::new(model)
        .documents(
            texts
                .into_iter()
                .enumerate()
                .map(|(position, text)| Positioned { position, text }),
        )
        .map_err(|e| DomainError::embedding(e.to_string()))?;

    let mut embedded = builder
        .build()
        .await
        .map_err(|e| DomainError::embedding(e.to_string()))?;

    if embedded.len() != expected {
        return Err(DomainError::embedding(format!(
            "expected {expected} embeddings, got {}",
            embedded.len()
        )));
    }
    embedded.sort_by_key(|(doc, _)| doc.position);

    Ok(embedded
        .into_iter()
        .map(|(_, emb)| Embedding::new(emb.first().vec.into_iter().map(|x| x as f32).collect()))
        .collect())
}

impl Default for TextEmbedding {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingService for TextEmbedding {
    async fn embed(&self, text: &str) -> Result<Embedding, DomainError> {
        // The API rejects empty input.
        if text.trim().is_empty() {
            return Ok(Embedding::zeros(self.dimension));
        }

        self.request(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::embedding("No embedding returned"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let non_blank: Vec<String> = texts
            .iter()
            .filter(|t| !t.trim().is_empty())
            .map(|t| t.to_string())
            .collect();
        let mut fetched = if non_blank.is_empty() {
            Vec::new()
        } else {
            self.request(non_blank).await?
        }
        .into_iter();

        texts
            .iter()
            .map(|t| {
                if t.trim().is_empty() {
                    Ok(Embedding::zeros(self.dimension))
                } else {
                    fetched
                        .next()
                        .ok_or_else(|| DomainError::embedding("fewer embeddings than inputs"))
                }
            })
            .collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model(&self) -> &str {
        &self.model
    }
}
