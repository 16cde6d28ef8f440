use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::state::AppState;
use crate::domain::{GroundingMode, Message};
use crate::infrastructure::ProcessChatJob;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub question: String,
    #[serde(default)]
    pub mode: GroundingMode,
    /// Earlier turns of the conversation, oldest first.
    #[serde(default)]
    pub history: Vec<Message>,
    pub conversation_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub job_id: Uuid,
    pub status: String,
    pub mode: GroundingMode,
}

pub async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<(StatusCode, Json<ChatResponse>), StatusCode> {
    if request.question.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let mut job = ProcessChatJob::new(request.question)
        .with_mode(request.mode)
        .with_history(request.history);
    if let Some(conv_id) = request.conversation_id {
        job = job.with_conversation(conv_id);
    }

    let job_id = state.job_producer.push_chat_job(&job).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to queue chat job");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ChatResponse {
            job_id,
            status: "queued".to_string(),
            mode: job.mode,
        }),
    ))
}
