use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::api::state::AppState;
use crate::domain::{ChunkingOptions, Topic};
use crate::infrastructure::{resolve_document_path, IngestDocumentJob};

#[derive(Debug, Serialize)]
pub struct TopicsResponse {
    pub topics: Vec<Topic>,
}

#[derive(Debug, Serialize)]
pub struct PromptsResponse {
    pub prompts: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    /// Path of the source document, relative to the worker's documents
    /// directory.
    pub path: PathBuf,
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub job_id: Uuid,
    pub topic: Topic,
    pub status: String,
}

pub async fn list_topics(State(state): State<AppState>) -> Json<TopicsResponse> {
    Json(TopicsResponse {
        topics: state.topics.as_ref().clone(),
    })
}

pub async fn quick_prompts(State(state): State<AppState>) -> Json<PromptsResponse> {
    Json(PromptsResponse {
        prompts: state.config.config.quick_prompts.clone(),
    })
}

pub async fn ingest_topic(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<IngestRequest>,
) -> Result<(StatusCode, Json<IngestResponse>), StatusCode> {
    let topic = state.topic(&name).cloned().ok_or(StatusCode::NOT_FOUND)?;

    let documents_dir = &state.config.config.ingestion.documents_dir;
    if let Err(e) = resolve_document_path(documents_dir, &request.path) {
        tracing::warn!(error = %e, topic = %topic, "rejected ingest path");
        return Err(StatusCode::BAD_REQUEST);
    }

    let defaults = state.config.config.chunking();
    let options = ChunkingOptions {
        chunk_size: request.chunk_size.unwrap_or(defaults.chunk_size),
        chunk_overlap: request.chunk_overlap.unwrap_or(defaults.chunk_overlap),
    };
    if let Err(e) = options.validate() {
        tracing::warn!(error = %e, topic = %topic, "rejected ingest request");
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }

    let job = IngestDocumentJob::new(topic.clone(), request.path)
        .with_chunking(request.chunk_size, request.chunk_overlap);

    let job_id = state.job_producer.push_ingest_job(&job).await.map_err(|e| {
        tracing::error!(error = %e, topic = %topic, "Failed to queue ingest job");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(IngestResponse {
            job_id,
            topic,
            status: "queued".to_string(),
        }),
    ))
}
