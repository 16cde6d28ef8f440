use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use health_rag::domain::ports::{GenerationRequest, IndexProvider, LlmService};
use health_rag::domain::{DomainError, GroundingMode, Message, Topic};
use health_rag::infrastructure::config::{EmbeddingProvider, VectorBackend};
use health_rag::infrastructure::{AppConfig, FileIndexProvider, Services};

const STOP_WORDS: &[&str] = &[
    "what", "which", "does", "have", "this", "that", "with", "from", "about", "there", "their",
];

/// Answers with the first context sentence sharing a content word with the
/// question. When nothing matches it paraphrases the refusal in strict mode
/// and falls back to "general knowledge" in open mode.
struct ContextEchoLlm;

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.len() > 3 && !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

#[async_trait]
impl LlmService for ContextEchoLlm {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, DomainError> {
        let strict = request.system.contains("Use ONLY");
        let context = request
            .system
            .split("### CONTEXT:")
            .nth(1)
            .unwrap_or_default();

        let question = words(&request.prompt);
        let hit = context
            .split(['.', '\n'])
            .map(str::trim)
            .filter(|sentence| !sentence.starts_with('['))
            .find(|sentence| words(sentence).iter().any(|w| question.contains(w)));

        Ok(match (hit, strict) {
            (Some(sentence), _) => format!("{sentence}."),
            (None, true) => "I am Sorry.  I can’t find the answer for this. However, I can \
                provide answer for the following diseases: Dengue."
                .to_string(),
            (None, false) => "Paris is the capital of France.".to_string(),
        })
    }

    fn model(&self) -> &str {
        "context-echo"
    }
}

struct Fixture {
    services: Services,
    index_dir: PathBuf,
    docs: tempfile::TempDir,
    _vectors: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        let vectors = tempfile::tempdir().unwrap();
        let docs = tempfile::tempdir().unwrap();

        let mut app = AppConfig::default();
        app.config.embedding.provider = EmbeddingProvider::Hashing;
        app.config.embedding.dimension = 256;
        app.config.vector_store.backend = VectorBackend::File;
        app.config.vector_store.dir = vectors.path().to_path_buf();
        app.config.llm.max_retries = 0;

        Self {
            services: Services::with_llm(&app, Arc::new(ContextEchoLlm)).unwrap(),
            index_dir: vectors.path().to_path_buf(),
            docs,
            _vectors: vectors,
        }
    }

    fn write_doc(&self, name: &str, text: &str) -> PathBuf {
        let path = self.docs.path().join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    async fn ingest(&self, topic: &str, path: &Path) {
        let topic = Topic::new(topic).unwrap();
        self.services.ingestion.ingest(&topic, path).await.unwrap();
    }
}

const DENGUE: &str = "Dengue is a viral infection common in tropical regions. \
Dengue is transmitted by the bite of infected Aedes mosquitoes. \
Prevention focuses on removing standing water and avoiding mosquito bites.";

#[tokio::test]
async fn strict_answer_comes_from_ingested_topic() {
    let fx = Fixture::new();
    let path = fx.write_doc("dengue.txt", DENGUE);
    fx.ingest("Dengue", &path).await;

    let answer = fx
        .services
        .assistant
        .answer("How is dengue transmitted?", GroundingMode::Strict, &[])
        .await
        .unwrap();

    assert!(!answer.refused);
    assert!(answer.text.to_lowercase().contains("dengue"));
    assert!(!answer.sources.is_empty());
    assert!(answer.sources.iter().all(|s| s.topic.as_str() == "Dengue"));
}

#[tokio::test]
async fn strict_prevention_question_is_answered_from_the_page() {
    let fx = Fixture::new();
    let path = fx.write_doc(
        "dengue_prevention.txt",
        "Dengue is prevented by avoiding mosquito breeding sites.",
    );
    fx.ingest("Dengue", &path).await;

    let answer = fx
        .services
        .assistant
        .answer("How can Dengue be prevented?", GroundingMode::Strict, &[])
        .await
        .unwrap();

    assert!(!answer.refused);
    assert!(answer.text.contains("avoiding mosquito breeding sites"));
    assert!(!answer.text.contains("I am Sorry"));
}

#[tokio::test]
async fn strict_off_topic_question_gets_exact_refusal() {
    let fx = Fixture::new();
    let path = fx.write_doc("dengue.txt", DENGUE);
    fx.ingest("Dengue", &path).await;

    let assistant = &fx.services.assistant;
    let answer = assistant
        .answer("What is the capital of France?", GroundingMode::Strict, &[])
        .await
        .unwrap();

    assert!(answer.refused);
    assert_eq!(answer.text, assistant.refusal());
    assert!(answer.text.ends_with("Tuberculosis, and Typhoid."));
}

#[tokio::test]
async fn strict_mode_refuses_without_any_index() {
    let fx = Fixture::new();

    let answer = fx
        .services
        .assistant
        .answer("How is dengue transmitted?", GroundingMode::Strict, &[])
        .await
        .unwrap();

    assert!(answer.refused);
    assert!(answer.sources.is_empty());
}

#[tokio::test]
async fn open_mode_never_refuses() {
    let fx = Fixture::new();
    let path = fx.write_doc("dengue.txt", DENGUE);
    fx.ingest("Dengue", &path).await;

    let answer = fx
        .services
        .assistant
        .answer("What is the capital of France?", GroundingMode::Open, &[])
        .await
        .unwrap();

    assert!(!answer.refused);
    assert_eq!(answer.mode, GroundingMode::Open);
    assert!(!answer.text.contains("I am Sorry"));
    assert!(answer.text.contains("Paris"));
}

#[tokio::test]
async fn reingesting_replaces_instead_of_duplicating() {
    let fx = Fixture::new();
    let path = fx.write_doc("dengue.txt", DENGUE);
    let topic = Topic::new("Dengue").unwrap();

    fx.ingest("Dengue", &path).await;
    let first = FileIndexProvider::new(&fx.index_dir)
        .open(&topic)
        .await
        .unwrap()
        .stats()
        .await
        .unwrap();

    fx.ingest("Dengue", &path).await;
    let second = FileIndexProvider::new(&fx.index_dir)
        .open(&topic)
        .await
        .unwrap()
        .stats()
        .await
        .unwrap();

    assert_eq!(first.chunks, second.chunks);
    assert_eq!(second.documents, Some(1));
}

#[tokio::test]
async fn topics_are_searched_independently() {
    let fx = Fixture::new();
    let dengue = fx.write_doc("dengue.txt", DENGUE);
    let asthma = fx.write_doc(
        "asthma.txt",
        "Asthma is a chronic condition of the airways. Inhalers relieve asthma symptoms.",
    );
    fx.ingest("Dengue", &dengue).await;
    fx.ingest("Asthma", &asthma).await;

    let answer = fx
        .services
        .assistant
        .answer("Which inhalers help asthma?", GroundingMode::Strict, &[])
        .await
        .unwrap();

    assert!(!answer.refused);
    assert!(answer.text.contains("sthma"));
    let topics: Vec<_> = answer.sources.iter().map(|s| s.topic.as_str()).collect();
    assert!(topics.contains(&"Asthma"));
    assert!(topics.contains(&"Dengue"));
    // Asthma precedes Dengue in the configured order
    let first_dengue = topics.iter().position(|t| *t == "Dengue").unwrap();
    assert!(topics[..first_dengue].iter().all(|t| *t == "Asthma"));
}

#[tokio::test]
async fn follow_up_question_with_history_is_answered() {
    let fx = Fixture::new();
    let path = fx.write_doc("dengue.txt", DENGUE);
    fx.ingest("Dengue", &path).await;

    let history = vec![
        Message::user("What is dengue?"),
        Message::assistant("Dengue is a viral infection common in tropical regions."),
    ];
    let answer = fx
        .services
        .assistant
        .answer("How can mosquito bites be avoided?", GroundingMode::Strict, &history)
        .await
        .unwrap();

    assert!(!answer.refused);
}

#[tokio::test]
async fn ingesting_a_missing_file_fails_cleanly() {
    let fx = Fixture::new();
    let topic = Topic::new("Malaria").unwrap();

    let err = fx
        .services
        .ingestion
        .ingest(&topic, &fx.docs.path().join("malaria.pdf"))
        .await
        .unwrap_err();

    assert!(matches!(err, DomainError::NotFound(_)));
    assert!(FileIndexProvider::new(&fx.index_dir).open(&topic).await.is_err());
}
