mod file;
mod in_memory;
mod qdrant;

pub use file::{FileIndexProvider, FileTopicIndex};
pub use in_memory::{InMemoryIndexProvider, InMemoryTopicIndex};
pub use qdrant::{QdrantIndexProvider, QdrantTopicIndex};

use std::collections::HashSet;

use crate::domain::{ports::IndexStats, DocumentChunk, Embedding, SearchResult};

/// Brute-force cosine ranking shared by the local backends.
pub(crate) fn rank(
    entries: &[(DocumentChunk, Embedding)],
    query: &Embedding,
    top_k: usize,
) -> Vec<SearchResult> {
    let mut results: Vec<SearchResult> = entries
        .iter()
        .map(|(chunk, embedding)| SearchResult {
            chunk: chunk.clone(),
            score: query.cosine_similarity(embedding),
        })
        .collect();

    // ties keep insertion order
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
    results.truncate(top_k);
    results
}

pub(crate) fn stats(entries: &[(DocumentChunk, Embedding)]) -> IndexStats {
    let documents: HashSet<_> = entries.iter().map(|(c, _)| c.document_id).collect();
    IndexStats {
        chunks: entries.len(),
        documents: Some(documents.len()),
    }
}
