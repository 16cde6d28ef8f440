use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::domain::{GroundingMode, Message, Topic};

pub mod queues {
    pub const CHAT_QUEUE: &str = "jobs:chat";
    pub const INGEST_QUEUE: &str = "jobs:ingest";
}

pub mod keys {
    use uuid::Uuid;

    pub fn job_status(job_id: &Uuid) -> String {
        format!("job:status:{}", job_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueJobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: Uuid,
    pub status: QueueJobStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobResult {
    fn with_status(job_id: Uuid, status: QueueJobStatus) -> Self {
        Self {
            job_id,
            status,
            result: None,
            error: None,
            completed_at: None,
        }
    }

    pub fn pending(job_id: Uuid) -> Self {
        Self::with_status(job_id, QueueJobStatus::Pending)
    }

    pub fn processing(job_id: Uuid) -> Self {
        Self::with_status(job_id, QueueJobStatus::Processing)
    }

    pub fn completed(job_id: Uuid, result: serde_json::Value) -> Self {
        Self {
            result: Some(result),
            completed_at: Some(Utc::now()),
            ..Self::with_status(job_id, QueueJobStatus::Completed)
        }
    }

    pub fn failed(job_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            completed_at: Some(Utc::now()),
            ..Self::with_status(job_id, QueueJobStatus::Failed)
        }
    }
}

/// One question of a conversation. The client owns the history and sends
/// the earlier turns along with each question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessChatJob {
    pub job_id: Uuid,
    pub question: String,
    #[serde(default)]
    pub mode: GroundingMode,
    #[serde(default)]
    pub history: Vec<Message>,
    pub conversation_id: Option<Uuid>,
}

impl ProcessChatJob {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            question: question.into(),
            mode: GroundingMode::default(),
            history: Vec::new(),
            conversation_id: None,
        }
    }

    pub fn with_mode(mut self, mode: GroundingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    pub fn with_conversation(mut self, conversation_id: Uuid) -> Self {
        self.conversation_id = Some(conversation_id);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestDocumentJob {
    pub job_id: Uuid,
    pub topic: Topic,
    pub path: PathBuf,
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
}

impl IngestDocumentJob {
    pub fn new(topic: Topic, path: impl Into<PathBuf>) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            topic,
            path: path.into(),
            chunk_size: None,
            chunk_overlap: None,
        }
    }

    pub fn with_chunking(mut self, chunk_size: Option<usize>, chunk_overlap: Option<usize>) -> Self {
        self.chunk_size = chunk_size;
        self.chunk_overlap = chunk_overlap;
        self
    }
}
