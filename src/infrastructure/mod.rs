pub mod config;
pub mod embedding;
pub mod llm;
pub mod loader;
pub mod queue;
pub mod services;
pub mod telemetry;
pub mod vector_store;

pub use config::{AppConfig, Config, ConfigError, PromptsConfig};
pub use embedding::{HashingEmbedding, TextEmbedding};
pub use llm::{AnthropicLlm, OpenAiLlm};
pub use loader::{confine_document_path, resolve_document_path, FsDocumentLoader};
pub use queue::{keys, queues, IngestDocumentJob, JobResult, ProcessChatJob, QueueJobStatus};
pub use services::Services;
pub use telemetry::init_tracing;
pub use vector_store::{FileIndexProvider, InMemoryIndexProvider, QdrantIndexProvider};
