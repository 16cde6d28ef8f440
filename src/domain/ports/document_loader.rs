use async_trait::async_trait;
use std::path::Path;

use crate::domain::{errors::DomainError, Document, Topic};

#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Reads `path` into per-page text. Fails with `NotFound` if the file
    /// does not exist.
    async fn load(&self, path: &Path, topic: &Topic) -> Result<Document, DomainError>;
}
