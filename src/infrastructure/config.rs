use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::application::{GenerationOptions, PromptTemplates, RetryPolicy};
use crate::domain::{ChunkingOptions, DomainError, Topic};

pub const CONFIG_FILE: &str = "config.yaml";
pub const PROMPTS_FILE: &str = "prompts.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("Invalid environment variable {name}: {message}")]
    Env { name: String, message: String },
    #[error(transparent)]
    Invalid(#[from] DomainError),
}

/// Everything the binaries need: service settings plus prompt templates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub config: Config,
    pub prompts: PromptsConfig,
}

impl AppConfig {
    /// Reads `config.yaml` and `prompts.yaml` from `dir`. A missing file
    /// means defaults; a malformed one is an error.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = dir.as_ref();
        let app = Self {
            config: read_yaml(&dir.join(CONFIG_FILE))?.unwrap_or_default(),
            prompts: read_yaml(&dir.join(PROMPTS_FILE))?.unwrap_or_default(),
        };
        app.config.validate()?;
        app.prompts.validate()?;
        Ok(app)
    }

    /// Loads from `$CONFIG_DIR` (default `config`) and applies environment
    /// overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".into());
        let mut app = Self::load(dir)?;
        app.config.apply_env(|name| std::env::var(name).ok())?;
        app.config.validate()?;
        Ok(app)
    }

    pub fn prompt_templates(&self) -> PromptTemplates {
        PromptTemplates::from(&self.prompts)
    }
}

fn read_yaml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>, ConfigError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_yaml::from_str(&raw)
        .map(Some)
        .map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub redis_url: String,
    pub worker: WorkerConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub rag: RagConfig,
    pub ingestion: IngestionConfig,
    pub vector_store: VectorStoreConfig,
    pub topics: Vec<String>,
    pub quick_prompts: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            cors: CorsConfig::default(),
            redis_url: "redis://localhost:6379".to_string(),
            worker: WorkerConfig::default(),
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
            rag: RagConfig::default(),
            ingestion: IngestionConfig::default(),
            vector_store: VectorStoreConfig::default(),
            topics: [
                "Anaemia",
                "Asthma",
                "Covid-19",
                "Dengue",
                "Diabetes",
                "GBS",
                "HyperTension",
                "Malaria",
                "Nipah",
                "Tuberculosis",
                "Typhoid",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            quick_prompts: [
                "What are the symptoms of Diabetes?",
                "How can Dengue be prevented?",
                "How to manage Asthma?",
                "Malaria vs Typhoid",
                "What is Anaemia?",
                "What are early signs of Hypertension?",
                "What causes Tuberculosis?",
                "Symptoms of COVID-19",
                "How to prevent Heart Disease?",
                "How to boost immunity naturally?",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl Config {
    pub fn topics(&self) -> Result<Vec<Topic>, DomainError> {
        self.topics.iter().map(|t| Topic::new(t.as_str())).collect()
    }

    pub fn chunking(&self) -> ChunkingOptions {
        ChunkingOptions {
            chunk_size: self.ingestion.chunk_size,
            chunk_overlap: self.ingestion.chunk_overlap,
        }
    }

    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            temperature: self.llm.temperature,
            max_tokens: self.llm.max_tokens,
            max_output_chars: self.llm.max_output_chars,
            timeout: Duration::from_secs(self.llm.timeout_seconds),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.llm.max_retries,
            backoff: Duration::from_millis(self.llm.retry_backoff_ms),
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        self.chunking().validate()?;

        let topics = self.topics()?;
        if topics.is_empty() {
            return Err(DomainError::validation("at least one topic must be configured"));
        }
        let mut names: Vec<_> = topics.iter().map(|t| t.as_str().to_lowercase()).collect();
        names.sort();
        names.dedup();
        if names.len() != topics.len() {
            return Err(DomainError::validation("topic names must be unique"));
        }

        if self.rag.top_k == 0 {
            return Err(DomainError::validation("rag.top_k must be at least 1"));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(DomainError::validation("llm.temperature must be within 0.0..=2.0"));
        }
        if self.embedding.dimension == 0 {
            return Err(DomainError::validation("embedding.dimension must be positive"));
        }
        Ok(())
    }

    /// Overrides selected fields from environment-style variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("REDIS_URL") {
            self.redis_url = v;
        }
        if let Some(v) = lookup("QDRANT_URL") {
            self.vector_store.qdrant_url = v;
        }
        if let Some(v) = lookup("DOCUMENTS_DIR") {
            self.ingestion.documents_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("VECTOR_DIR") {
            self.vector_store.dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("SERVER_HOST") {
            self.server.host = v;
        }
        if let Some(v) = lookup("SERVER_PORT") {
            self.server.port = parse_env("SERVER_PORT", &v)?;
        }
        if let Some(v) = lookup("LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = lookup("EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Some(v) = lookup("WORKER_CONCURRENCY") {
            self.worker.concurrency = parse_env("WORKER_CONCURRENCY", &v)?;
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Env {
        name: name.to_string(),
        message: e.to_string(),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Accepted `X-API-Key` values. Empty disables the check.
    pub api_keys: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            api_keys: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub result_ttl_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            result_ttl_seconds: 3600,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    OpenAi,
    Anthropic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: Option<u64>,
    pub max_output_chars: Option<usize>,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAi,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            max_tokens: Some(1024),
            max_output_chars: None,
            timeout_seconds: 60,
            max_retries: 2,
            retry_backoff_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    #[default]
    OpenAi,
    /// Local feature hashing; no network, no API key.
    Hashing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub dimension: usize,
    pub batch_size: usize,
    pub timeout_seconds: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::OpenAi,
            model: "text-embedding-3-small".to_string(),
            dimension: 1536,
            batch_size: 64,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub top_k: usize,
    pub history_turns: usize,
    pub index_timeout_seconds: u64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            history_turns: 2,
            index_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Ingest requests may only name files below this directory.
    pub documents_dir: PathBuf,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        let defaults = ChunkingOptions::default();
        Self {
            chunk_size: defaults.chunk_size,
            chunk_overlap: defaults.chunk_overlap,
            documents_dir: PathBuf::from("documents"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    #[default]
    File,
    Qdrant,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub backend: VectorBackend,
    pub dir: PathBuf,
    pub qdrant_url: String,
    pub collection_prefix: String,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::File,
            dir: PathBuf::from("vector_db"),
            qdrant_url: "http://localhost:6334".to_string(),
            collection_prefix: "disease_".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub strict: StrictPrompts,
    pub open: OpenPrompts,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        let templates = PromptTemplates::default();
        Self {
            strict: StrictPrompts {
                system: templates.strict_system,
                directives: templates.strict_directives,
                refusal: templates.refusal,
            },
            open: OpenPrompts {
                system: templates.open_system,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrictPrompts {
    pub system: String,
    #[serde(default)]
    pub directives: String,
    pub refusal: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenPrompts {
    pub system: String,
}

impl PromptsConfig {
    /// Refusals are recognised by the fixed text before `{topics}`, so the
    /// template has to start with some.
    pub fn validate(&self) -> Result<(), DomainError> {
        let lead = self.strict.refusal.split("{topics}").next().unwrap_or_default();
        if lead.trim().is_empty() {
            return Err(DomainError::validation(
                "strict.refusal must begin with fixed text before {topics}",
            ));
        }
        Ok(())
    }
}

impl From<&PromptsConfig> for PromptTemplates {
    fn from(prompts: &PromptsConfig) -> Self {
        Self {
            strict_system: prompts.strict.system.clone(),
            strict_directives: prompts.strict.directives.clone(),
            refusal: prompts.strict.refusal.clone(),
            open_system: prompts.open.system.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.topics().unwrap().len(), 11);
        assert_eq!(config.rag.top_k, 3);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "topics: [Dengue, Malaria]\nrag:\n  top_k: 5\nllm:\n  provider: anthropic\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.topics, vec!["Dengue", "Malaria"]);
        assert_eq!(config.rag.top_k, 5);
        assert_eq!(config.rag.history_turns, 2);
        assert_eq!(config.llm.provider, LlmProvider::Anthropic);
        assert_eq!(config.vector_store.backend, VectorBackend::File);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.ingestion.chunk_overlap = config.ingestion.chunk_size;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.topics = vec!["Dengue".into(), "dengue".into()];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.topics.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.rag.top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_apply_env() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("REDIS_URL", "redis://cache:6379"),
            ("VECTOR_DIR", "/data/vectors"),
            ("SERVER_PORT", "9090"),
        ]);
        let mut config = Config::default();
        config
            .apply_env(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.redis_url, "redis://cache:6379");
        assert_eq!(config.vector_store.dir, PathBuf::from("/data/vectors"));
        assert_eq!(config.server.port, 9090);

        let err = config
            .apply_env(|name| (name == "SERVER_PORT").then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { .. }));
    }

    #[test]
    fn test_load_missing_dir_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let app = AppConfig::load(dir.path()).unwrap();
        assert_eq!(app.prompt_templates(), PromptTemplates::default());
    }

    #[test]
    fn test_load_reads_prompts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(PROMPTS_FILE),
            "strict:\n  system: \"S {context}\"\n  refusal: \"No. Try {topics}.\"\nopen:\n  system: \"O {context}\"\n",
        )
        .unwrap();

        let templates = AppConfig::load(dir.path()).unwrap().prompt_templates();
        assert_eq!(templates.refusal, "No. Try {topics}.");
        assert_eq!(templates.strict_directives, "");
    }

    #[test]
    fn test_refusal_must_not_start_with_topics() {
        assert!(PromptsConfig::default().validate().is_ok());

        let mut prompts = PromptsConfig::default();
        prompts.strict.refusal = "{topics} are the diseases I know about.".to_string();
        assert!(prompts.validate().is_err());

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(PROMPTS_FILE),
            "strict:\n  system: \"S {context}\"\n  refusal: \"  {topics} only.\"\nopen:\n  system: \"O {context}\"\n",
        )
        .unwrap();
        let err = AppConfig::load(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_shipped_config_loads() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("config");
        let app = AppConfig::load(dir).unwrap();

        assert_eq!(app.config.topics().unwrap().len(), 11);
        assert_eq!(app.prompts.strict.refusal, PromptTemplates::default().refusal);
        assert!(app.prompts.strict.system.contains("{context}"));
    }

    #[test]
    fn test_load_rejects_malformed_yaml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "rag: [unclosed").unwrap();
        assert!(matches!(
            AppConfig::load(dir.path()),
            Err(ConfigError::Yaml { .. })
        ));
    }
}
