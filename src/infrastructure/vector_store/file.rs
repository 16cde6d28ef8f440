use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::domain::{
    ports::{IndexProvider, IndexStats, TopicIndex},
    DocumentChunk, DomainError, Embedding, SearchResult, Topic,
};

const FORMAT_VERSION: u32 = 1;
const INDEX_FILE: &str = "index.json";

type Entries = Arc<Vec<(DocumentChunk, Embedding)>>;

#[derive(Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    topic: Topic,
    dimension: usize,
    entries: Vec<StoredEntry>,
}

#[derive(Serialize, Deserialize)]
struct StoredEntry {
    chunk: DocumentChunk,
    embedding: Embedding,
}

/// Topic index persisted as a single JSON file under `<dir>/<topic>/`.
///
/// Every write produces a complete new file next to the old one and renames
/// it into place, so a crash leaves either the previous or the new index.
pub struct FileTopicIndex {
    topic: Topic,
    path: PathBuf,
    entries: RwLock<Entries>,
    modified: Mutex<Option<SystemTime>>,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileTopicIndex {
    fn empty(topic: Topic, path: PathBuf) -> Self {
        Self {
            topic,
            path,
            entries: RwLock::new(Arc::new(Vec::new())),
            modified: Mutex::new(None),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn load(topic: Topic, path: PathBuf) -> Result<Self, DomainError> {
        let (entries, modified) = read_index(&topic, &path).await?;
        let index = Self::empty(topic, path);
        index.swap(entries, modified)?;
        Ok(index)
    }

    fn snapshot(&self) -> Result<Entries, DomainError> {
        self.entries
            .read()
            .map(|e| Arc::clone(&e))
            .map_err(|e| DomainError::internal(e.to_string()))
    }

    fn swap(
        &self,
        entries: Vec<(DocumentChunk, Embedding)>,
        modified: Option<SystemTime>,
    ) -> Result<(), DomainError> {
        let mut store = self
            .entries
            .write()
            .map_err(|e| DomainError::internal(e.to_string()))?;
        *store = Arc::new(entries);

        if let Ok(mut m) = self.modified.lock() {
            *m = modified;
        }
        Ok(())
    }

    /// Picks up a file rewritten by another process since the last load.
    async fn refresh(&self) -> Result<(), DomainError> {
        let Ok(on_disk) = modified_at(&self.path).await else {
            return Ok(());
        };
        let known = self.modified.lock().ok().and_then(|m| *m);
        if known == Some(on_disk) {
            return Ok(());
        }

        let _guard = self.write_lock.lock().await;
        let (entries, modified) = read_index(&self.topic, &self.path).await?;
        debug!(topic = %self.topic, chunks = entries.len(), "reloaded index from disk");
        self.swap(entries, modified)
    }

    async fn write(&self, entries: Vec<(DocumentChunk, Embedding)>) -> Result<(), DomainError> {
        persist(&self.topic, &self.path, &entries).await?;
        let modified = modified_at(&self.path).await.ok();
        self.swap(entries, modified)
    }
}

#[async_trait]
impl TopicIndex for FileTopicIndex {
    fn topic(&self) -> &Topic {
        &self.topic
    }

    async fn replace(&self, entries: Vec<(DocumentChunk, Embedding)>) -> Result<(), DomainError> {
        let _guard = self.write_lock.lock().await;
        self.write(entries).await
    }

    async fn search(
        &self,
        query: &Embedding,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError> {
        self.refresh().await?;
        let entries = self.snapshot()?;
        Ok(super::rank(&entries, query, top_k))
    }

    async fn stats(&self) -> Result<IndexStats, DomainError> {
        Ok(super::stats(&self.snapshot()?))
    }
}

async fn modified_at(path: &Path) -> std::io::Result<SystemTime> {
    tokio::fs::metadata(path).await?.modified()
}

async fn read_index(
    topic: &Topic,
    path: &Path,
) -> Result<(Vec<(DocumentChunk, Embedding)>, Option<SystemTime>), DomainError> {
    let unavailable = |msg: String| DomainError::index_unavailable(topic.as_str(), msg);

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| unavailable(format!("{}: {e}", path.display())))?;
    let file: IndexFile = serde_json::from_slice(&bytes)
        .map_err(|e| unavailable(format!("{}: {e}", path.display())))?;

    if file.version != FORMAT_VERSION {
        return Err(unavailable(format!(
            "unsupported index version {}",
            file.version
        )));
    }
    if &file.topic != topic {
        return Err(unavailable(format!("file belongs to topic '{}'", file.topic)));
    }
    if let Some(bad) = file
        .entries
        .iter()
        .find(|e| e.embedding.dimension() != file.dimension)
    {
        return Err(unavailable(format!(
            "chunk {} has dimension {}, expected {}",
            bad.chunk.id,
            bad.embedding.dimension(),
            file.dimension
        )));
    }

    let entries = file
        .entries
        .into_iter()
        .map(|e| (e.chunk, e.embedding))
        .collect();
    Ok((entries, modified_at(path).await.ok()))
}

async fn persist(
    topic: &Topic,
    path: &Path,
    entries: &[(DocumentChunk, Embedding)],
) -> Result<(), DomainError> {
    let dimension = entries.first().map(|(_, e)| e.dimension()).unwrap_or(0);
    if entries.iter().any(|(_, e)| e.dimension() != dimension) {
        return Err(DomainError::index(format!(
            "mixed embedding dimensions in index for topic '{topic}'"
        )));
    }
    let file = IndexFile {
        version: FORMAT_VERSION,
        topic: topic.clone(),
        dimension,
        entries: entries
            .iter()
            .map(|(chunk, embedding)| StoredEntry {
                chunk: chunk.clone(),
                embedding: embedding.clone(),
            })
            .collect(),
    };
    let bytes = serde_json::to_vec(&file).map_err(|e| DomainError::index(e.to_string()))?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DomainError::index(format!("{}: {e}", parent.display())))?;
    }

    let tmp = path.with_extension("json.tmp");
    let io_err = |e: std::io::Error| DomainError::index(format!("{}: {e}", tmp.display()));

    let mut out = tokio::fs::File::create(&tmp).await.map_err(io_err)?;
    out.write_all(&bytes).await.map_err(io_err)?;
    out.sync_all().await.map_err(io_err)?;
    drop(out);

    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| DomainError::index(format!("{}: {e}", path.display())))?;

    debug!(topic = %topic, chunks = entries.len(), path = %path.display(), "index written");
    Ok(())
}

/// One directory per topic under a common root.
pub struct FileIndexProvider {
    root: PathBuf,
    indexes: tokio::sync::Mutex<HashMap<Topic, Arc<FileTopicIndex>>>,
}

impl FileIndexProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            indexes: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn index_path(&self, topic: &Topic) -> PathBuf {
        self.root.join(topic.as_str()).join(INDEX_FILE)
    }
}

impl FileIndexProvider {
    async fn cached(&self, topic: &Topic) -> Option<Arc<dyn TopicIndex>> {
        self.indexes
            .lock()
            .await
            .get(topic)
            .map(|index| Arc::clone(index) as Arc<dyn TopicIndex>)
    }

    /// Keeps whichever index for `topic` was cached first, so concurrent
    /// openers share one instance.
    async fn remember(&self, index: FileTopicIndex) -> Arc<dyn TopicIndex> {
        let mut indexes = self.indexes.lock().await;
        let kept = indexes
            .entry(index.topic.clone())
            .or_insert_with(|| Arc::new(index));
        Arc::clone(kept) as Arc<dyn TopicIndex>
    }
}

// The cache lock is never held while a file is read, so a stalled topic
// cannot hold up the others.
#[async_trait]
impl IndexProvider for FileIndexProvider {
    async fn open(&self, topic: &Topic) -> Result<Arc<dyn TopicIndex>, DomainError> {
        if let Some(index) = self.cached(topic).await {
            return Ok(index);
        }

        let index = FileTopicIndex::load(topic.clone(), self.index_path(topic)).await?;
        Ok(self.remember(index).await)
    }

    async fn open_or_create(&self, topic: &Topic) -> Result<Arc<dyn TopicIndex>, DomainError> {
        if let Some(index) = self.cached(topic).await {
            return Ok(index);
        }

        let path = self.index_path(topic);
        let index = if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            match FileTopicIndex::load(topic.clone(), path.clone()).await {
                Ok(index) => index,
                Err(e) => {
                    warn!(topic = %topic, error = %e, "existing index unreadable, starting empty");
                    FileTopicIndex::empty(topic.clone(), path)
                }
            }
        } else {
            FileTopicIndex::empty(topic.clone(), path)
        };

        Ok(self.remember(index).await)
    }
}
