mod answer;
mod conversation;
mod document;
mod embedding;
mod topic;

pub use answer::{Answer, GroundingMode, Source};
pub use conversation::{recent_turns, Message, MessageRole};
pub use document::{Document, DocumentChunk, Page, RetrievedContext, SearchResult};
pub use embedding::Embedding;
pub use topic::Topic;
