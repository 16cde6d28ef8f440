use crate::domain::{errors::DomainError, Embedding};
use async_trait::async_trait;

/// Turns text into vectors. Implementations map empty or whitespace-only
/// text to a zero vector instead of failing.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Embedding, DomainError>;
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError>;
    fn dimension(&self) -> usize;
    fn model(&self) -> &str;
}
