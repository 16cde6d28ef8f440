use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::api::state::AppState;
use crate::infrastructure::{JobResult, QueueJobStatus};

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub status: QueueJobStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<JobResult> for JobStatusResponse {
    fn from(job: JobResult) -> Self {
        Self {
            job_id: job.job_id,
            status: job.status,
            result: job.result,
            error: job.error,
            completed_at: job.completed_at,
        }
    }
}

pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>, StatusCode> {
    let result = state
        .job_producer
        .get_job_status(&job_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, job_id = %job_id, "Failed to get job status");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    result
        .map(|job| Json(JobStatusResponse::from(job)))
        .ok_or(StatusCode::NOT_FOUND)
}
