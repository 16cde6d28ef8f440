use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::domain::{ports::EmbeddingService, DomainError, Embedding};

/// Bag-of-words feature hashing into a fixed number of buckets.
///
/// Deterministic and offline: texts sharing words get similar vectors,
/// which is enough for local runs without an embedding API.
#[derive(Debug, Clone)]
pub struct HashingEmbedding {
    dimension: usize,
}

impl HashingEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn embed_sync(&self, text: &str) -> Embedding {
        let mut vec = vec![0.0f32; self.dimension];

        for token in tokens(text) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let hash = hasher.finish();

            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vec[bucket] += sign;
        }

        Embedding::new(vec).normalized()
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl EmbeddingService for HashingEmbedding {
    async fn embed(&self, text: &str) -> Result<Embedding, DomainError> {
        Ok(self.embed_sync(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model(&self) -> &str {
        "feature-hashing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_and_case_insensitive() {
        let e = HashingEmbedding::new(32);
        assert_eq!(e.embed_sync("Dengue Fever"), e.embed_sync("dengue, fever!"));
    }

    #[test]
    fn test_shared_words_score_higher() {
        let e = HashingEmbedding::new(256);
        let query = e.embed_sync("how is dengue prevented");
        let close = e.embed_sync("dengue is prevented by removing standing water");
        let far = e.embed_sync("insulin regulates blood sugar");

        assert!(query.cosine_similarity(&close) > query.cosine_similarity(&far));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let e = HashingEmbedding::new(8);
        let v = e.embed_sync("   ");
        assert_eq!(v.dimension(), 8);
        assert_eq!(v.norm(), 0.0);
    }
}
