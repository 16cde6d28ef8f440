use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use super::Topic;

/// One page of extracted source text. Page numbers start at 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub number: usize,
    pub text: String,
}

impl Page {
    pub fn new(number: usize, text: impl Into<String>) -> Self {
        Self {
            number,
            text: text.into(),
        }
    }
}

/// A loaded source document. Immutable once created; re-ingesting a file
/// produces a new `Document` that replaces the topic's index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub topic: Topic,
    pub source: PathBuf,
    pub pages: Vec<Page>,
    pub created_at: DateTime<Utc>,
}

impl Document {
    pub fn new(topic: Topic, source: impl Into<PathBuf>, pages: Vec<Page>) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic,
            source: source.into(),
            pages,
            created_at: Utc::now(),
        }
    }

    /// Single-page document from in-memory text.
    pub fn from_text(topic: Topic, source: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self::new(topic, source, vec![Page::new(1, text)])
    }
}

/// A contiguous slice of one page. `start..end` is the character span of
/// `content` within the page text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub topic: Topic,
    pub chunk_index: usize,
    pub page: usize,
    pub start: usize,
    pub end: usize,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk: DocumentChunk,
    pub score: f32,
}

/// Chunks merged across topic indexes, in topic order and then by
/// descending score within each topic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievedContext {
    pub results: Vec<SearchResult>,
    /// Topics whose index could not be searched for this query.
    pub skipped: Vec<Topic>,
}

impl RetrievedContext {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn for_topic<'a>(&'a self, topic: &'a Topic) -> impl Iterator<Item = &'a SearchResult> {
        self.results.iter().filter(move |r| &r.chunk.topic == topic)
    }
}
