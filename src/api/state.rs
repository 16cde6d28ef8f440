use std::sync::Arc;

use crate::api::queue::{JobProducer, RedisPool};
use crate::domain::{DomainError, Topic};
use crate::infrastructure::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub redis_pool: RedisPool,
    pub job_producer: JobProducer,
    pub topics: Arc<Vec<Topic>>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(redis_pool: RedisPool, config: AppConfig) -> Result<Self, DomainError> {
        let topics = config.config.topics()?;
        let job_producer =
            JobProducer::new(redis_pool.clone(), config.config.worker.result_ttl_seconds);

        Ok(Self {
            redis_pool,
            job_producer,
            topics: Arc::new(topics),
            config: Arc::new(config),
        })
    }

    /// The configured topic with this exact name, if any.
    pub fn topic(&self, name: &str) -> Option<&Topic> {
        self.topics.iter().find(|t| t.as_str() == name)
    }
}
