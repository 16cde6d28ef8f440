use deadpool_redis::{redis::AsyncCommands, Config, Connection, Pool, Runtime};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

use health_rag::domain::{ChunkingOptions, DomainError, Topic};
use health_rag::infrastructure::{
    confine_document_path, init_tracing, keys, queues, AppConfig, IngestDocumentJob, JobResult,
    ProcessChatJob, Services,
};

pub type RedisPool = Pool;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Redis pool error: {0}")]
    Pool(String),
    #[error("Redis error: {0}")]
    Redis(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Processing error: {0}")]
    Processing(String),
}

pub type Result<T> = std::result::Result<T, WorkerError>;

pub fn create_pool(redis_url: &str) -> Result<RedisPool> {
    let cfg = Config::from_url(redis_url);
    cfg.create_pool(Some(Runtime::Tokio1))
        .map_err(|e| WorkerError::Pool(e.to_string()))
}

pub struct WorkerState {
    pub redis_pool: RedisPool,
    pub services: Services,
    pub default_chunking: ChunkingOptions,
    pub documents_dir: PathBuf,
    pub result_ttl_seconds: u64,
}

impl WorkerState {
    pub fn new(redis_pool: RedisPool, app: &AppConfig) -> anyhow::Result<Self> {
        Ok(Self {
            redis_pool,
            services: Services::from_config(app)?,
            default_chunking: app.config.chunking(),
            documents_dir: app.config.ingestion.documents_dir.clone(),
            result_ttl_seconds: app.config.worker.result_ttl_seconds,
        })
    }
}

pub struct JobConsumer {
    state: Arc<WorkerState>,
    concurrency: usize,
}

impl JobConsumer {
    pub fn new(state: WorkerState, concurrency: usize) -> Self {
        Self {
            state: Arc::new(state),
            concurrency: concurrency.max(1),
        }
    }

    pub async fn start(&self) -> Result<()> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        info!(concurrency = self.concurrency, "consumer started");

        loop {
            let permit = tokio::select! {
                permit = semaphore.clone().acquire_owned() => {
                    permit.map_err(|e| WorkerError::Processing(e.to_string()))?
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown requested, waiting for running jobs");
                    let _drain = semaphore
                        .acquire_many(self.concurrency as u32)
                        .await
                        .map_err(|e| WorkerError::Processing(e.to_string()))?;
                    return Ok(());
                }
            };
            let state = self.state.clone();

            tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = process_next_job(&state).await {
                    tracing::error!(error = %e, "job failed");
                }
            });

            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        }
    }
}

async fn conn(state: &WorkerState) -> Result<Connection> {
    state
        .redis_pool
        .get()
        .await
        .map_err(|e| WorkerError::Pool(e.to_string()))
}

async fn set_status(state: &WorkerState, conn: &mut Connection, status: &JobResult) -> Result<()> {
    let json = serde_json::to_string(status)?;
    conn.set_ex::<_, _, ()>(keys::job_status(&status.job_id), &json, state.result_ttl_seconds)
        .await
        .map_err(|e| WorkerError::Redis(e.to_string()))
}

async fn process_next_job(state: &WorkerState) -> Result<()> {
    let mut c = conn(state).await?;

    let result: Option<(String, String)> = c
        .brpop(&[queues::CHAT_QUEUE, queues::INGEST_QUEUE], 1.0)
        .await
        .map_err(|e| WorkerError::Redis(e.to_string()))?;
    drop(c);

    let Some((queue, job_json)) = result else {
        return Ok(());
    };

    match queue.as_str() {
        q if q == queues::CHAT_QUEUE => {
            let Some(job) = decode::<ProcessChatJob>(state, &job_json).await? else {
                return Ok(());
            };
            let job_id = job.job_id;
            info!(job_id = %job_id, mode = %job.mode, "processing chat");
            mark_processing(state, job_id).await?;
            finish(state, job_id, run_chat(&state.services, job).await).await?;
        }
        q if q == queues::INGEST_QUEUE => {
            let Some(job) = decode::<IngestDocumentJob>(state, &job_json).await? else {
                return Ok(());
            };
            let job_id = job.job_id;
            info!(job_id = %job_id, topic = %job.topic, path = %job.path.display(), "processing ingest");
            mark_processing(state, job_id).await?;
            finish(state, job_id, run_ingest(state, job).await).await?;
        }
        _ => warn!(queue, "unknown queue"),
    }
    Ok(())
}

/// Parses a queued job. A payload that does not parse is recorded as a
/// failed job when its id can still be read, and dropped otherwise.
async fn decode<T: serde::de::DeserializeOwned>(
    state: &WorkerState,
    job_json: &str,
) -> Result<Option<T>> {
    match serde_json::from_str(job_json) {
        Ok(job) => Ok(Some(job)),
        Err(e) => {
            let Some(job_id) = job_id_of(job_json) else {
                warn!(error = %e, "dropping job without a readable id");
                return Ok(None);
            };
            warn!(job_id = %job_id, error = %e, "malformed job");
            let mut c = conn(state).await?;
            set_status(state, &mut c, &JobResult::failed(job_id, format!("malformed job: {e}")))
                .await?;
            Ok(None)
        }
    }
}

fn job_id_of(job_json: &str) -> Option<Uuid> {
    let raw: serde_json::Value = serde_json::from_str(job_json).ok()?;
    raw.get("job_id")?.as_str()?.parse().ok()
}

async fn mark_processing(state: &WorkerState, job_id: Uuid) -> Result<()> {
    let mut c = conn(state).await?;
    set_status(state, &mut c, &JobResult::processing(job_id)).await
}

/// Records the outcome of a job. Domain failures become a failed job
/// status, not a worker error.
async fn finish(
    state: &WorkerState,
    job_id: Uuid,
    outcome: std::result::Result<serde_json::Value, DomainError>,
) -> Result<()> {
    let mut c = conn(state).await?;
    let status = match outcome {
        Ok(value) => {
            info!(job_id = %job_id, "job completed");
            JobResult::completed(job_id, value)
        }
        Err(e) => {
            warn!(job_id = %job_id, error = %e, "job failed");
            JobResult::failed(job_id, e.to_string())
        }
    };
    set_status(state, &mut c, &status).await
}

async fn run_chat(
    services: &Services,
    job: ProcessChatJob,
) -> std::result::Result<serde_json::Value, DomainError> {
    let answer = services
        .assistant
        .answer(&job.question, job.mode, &job.history)
        .await?;

    Ok(serde_json::json!({
        "answer": answer.text,
        "mode": answer.mode,
        "refused": answer.refused,
        "sources": answer.sources,
        "conversation_id": job.conversation_id,
    }))
}

fn chunking_for(defaults: ChunkingOptions, job: &IngestDocumentJob) -> ChunkingOptions {
    ChunkingOptions {
        chunk_size: job.chunk_size.unwrap_or(defaults.chunk_size),
        chunk_overlap: job.chunk_overlap.unwrap_or(defaults.chunk_overlap),
    }
}

fn configured_topic<'a>(services: &'a Services, topic: &Topic) -> Option<&'a Topic> {
    services.topics.iter().find(|t| *t == topic)
}

async fn run_ingest(
    state: &WorkerState,
    job: IngestDocumentJob,
) -> std::result::Result<serde_json::Value, DomainError> {
    let topic = configured_topic(&state.services, &job.topic)
        .ok_or_else(|| DomainError::validation(format!("topic '{}' is not configured", job.topic)))?;

    let path = confine_document_path(&state.documents_dir, &job.path).await?;
    let options = chunking_for(state.default_chunking, &job);
    let report = state
        .services
        .ingestion
        .ingest_with(topic, &path, options)
        .await?;

    serde_json::to_value(&report).map_err(|e| DomainError::internal(e.to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing("worker=debug,health_rag=debug");

    let app_config = AppConfig::from_env()?;

    let redis_pool = create_pool(&app_config.config.redis_url)?;
    info!("Redis connected");

    let concurrency = app_config.config.worker.concurrency;
    let state = WorkerState::new(redis_pool, &app_config)?;
    info!(
        backend = ?app_config.config.vector_store.backend,
        topics = state.services.topics.len(),
        "indexes configured"
    );

    let consumer = JobConsumer::new(state, concurrency);

    info!(concurrency, "worker started");
    consumer.start().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use health_rag::domain::ports::{GenerationRequest, LlmService};
    use health_rag::domain::GroundingMode;
    use health_rag::infrastructure::config::{EmbeddingProvider, VectorBackend};
    use std::io::Write;

    struct EchoLlm;

    #[async_trait]
    impl LlmService for EchoLlm {
        async fn generate(&self, request: &GenerationRequest) -> std::result::Result<String, DomainError> {
            Ok(format!("From the documents: {}", request.prompt))
        }

        fn model(&self) -> &str {
            "echo"
        }
    }

    fn state(documents_dir: &std::path::Path) -> WorkerState {
        let mut app = AppConfig::default();
        app.config.embedding.provider = EmbeddingProvider::Hashing;
        app.config.embedding.dimension = 128;
        app.config.vector_store.backend = VectorBackend::Memory;

        WorkerState {
            redis_pool: create_pool("redis://127.0.0.1:1").unwrap(),
            services: Services::with_llm(&app, Arc::new(EchoLlm)).unwrap(),
            default_chunking: app.config.chunking(),
            documents_dir: documents_dir.to_path_buf(),
            result_ttl_seconds: 60,
        }
    }

    #[test]
    fn test_job_chunking_overrides_defaults() {
        let defaults = ChunkingOptions::new(1000, 200).unwrap();
        let job = IngestDocumentJob::new(Topic::new("GBS").unwrap(), "gbs.pdf")
            .with_chunking(Some(400), None);

        let options = chunking_for(defaults, &job);
        assert_eq!(options.chunk_size, 400);
        assert_eq!(options.chunk_overlap, 200);
    }

    #[tokio::test]
    async fn test_ingest_then_chat() {
        let docs = tempfile::tempdir().unwrap();
        let state = state(docs.path());
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile_in(docs.path()).unwrap();
        write!(file, "Nipah virus spreads from fruit bats to people.").unwrap();

        let name = file.path().file_name().unwrap();
        let job = IngestDocumentJob::new(Topic::new("Nipah").unwrap(), name);
        let report = run_ingest(&state, job).await.unwrap();
        assert_eq!(report["chunks"], 1);

        let chat = ProcessChatJob::new("How does Nipah spread?").with_mode(GroundingMode::Strict);
        let result = run_chat(&state.services, chat).await.unwrap();
        assert_eq!(result["refused"], false);
        assert_eq!(result["sources"][0]["topic"], "Nipah");
    }

    #[tokio::test]
    async fn test_ingest_rejects_unconfigured_topic() {
        let docs = tempfile::tempdir().unwrap();
        let state = state(docs.path());
        let job = IngestDocumentJob::new(Topic::new("Leprosy").unwrap(), "leprosy.pdf");

        let err = run_ingest(&state, job).await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn test_chat_without_indexes_refuses_in_strict_mode() {
        let docs = tempfile::tempdir().unwrap();
        let state = state(docs.path());
        let chat = ProcessChatJob::new("What is the capital of France?");

        let result = run_chat(&state.services, chat).await.unwrap();
        assert_eq!(result["refused"], true);
        assert_eq!(result["answer"], state.services.assistant.refusal());
    }

    #[tokio::test]
    async fn test_ingest_refuses_paths_outside_documents_dir() {
        let docs = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let env = outside.path().join(".env");
        std::fs::write(&env, "OPENAI_API_KEY=sk-test").unwrap();
        let state = state(docs.path());
        let nipah = Topic::new("Nipah").unwrap();

        for path in [env.clone(), std::path::PathBuf::from("../.env")] {
            let job = IngestDocumentJob::new(nipah.clone(), path);
            let err = run_ingest(&state, job).await.unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));
        }
    }

    #[test]
    fn test_job_id_is_read_from_malformed_payload() {
        let id = Uuid::new_v4();
        let raw = serde_json::json!({ "job_id": id, "question": 42 }).to_string();

        assert!(serde_json::from_str::<ProcessChatJob>(&raw).is_err());
        assert_eq!(job_id_of(&raw), Some(id));
        assert_eq!(job_id_of("not json"), None);
        assert_eq!(job_id_of(r#"{"job_id": "nope"}"#), None);
    }
}
