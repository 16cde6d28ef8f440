use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use crate::domain::{ports::DocumentLoader, Document, DomainError, Page, Topic};

/// Loads documents from the local filesystem.
///
/// PDFs are split into pages with `pdf-extract`; anything else is read as
/// UTF-8 text and treated as a single page.
#[derive(Debug, Clone, Default)]
pub struct FsDocumentLoader;

impl FsDocumentLoader {
    pub fn new() -> Self {
        Self
    }
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

async fn read_pdf(path: &Path) -> Result<Vec<Page>, DomainError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| DomainError::validation(format!("{}: {e}", path.display())))?;

    // pdf-extract is synchronous and CPU bound
    let pages = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem_by_pages(&bytes))
        .await
        .map_err(|e| DomainError::internal(format!("Task join error: {e}")))?
        .map_err(|e| DomainError::validation(format!("{}: {e}", path.display())))?;

    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(i, text)| Page::new(i + 1, text))
        .collect())
}

async fn read_text(path: &Path) -> Result<Vec<Page>, DomainError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| DomainError::validation(format!("{}: {e}", path.display())))?;
    Ok(vec![Page::new(1, text)])
}

/// Places a client-supplied path under `root` without touching the
/// filesystem. Relative paths are taken from `root`; `..` is refused.
pub fn resolve_document_path(root: &Path, requested: &Path) -> Result<PathBuf, DomainError> {
    if requested.as_os_str().is_empty() {
        return Err(DomainError::validation("document path must not be empty"));
    }
    if requested.components().any(|c| c == Component::ParentDir) {
        return Err(DomainError::validation(format!(
            "{}: parent directory references are not allowed",
            requested.display()
        )));
    }

    let path = root.join(requested);
    if !path.starts_with(root) {
        return Err(DomainError::validation(format!(
            "{} is outside the documents directory",
            requested.display()
        )));
    }
    Ok(path)
}

/// Like [`resolve_document_path`], then follows symlinks and checks the real
/// location is still under the real `root`.
pub async fn confine_document_path(root: &Path, requested: &Path) -> Result<PathBuf, DomainError> {
    let path = resolve_document_path(root, requested)?;

    let real_root = tokio::fs::canonicalize(root).await.map_err(|e| {
        DomainError::validation(format!("documents directory {}: {e}", root.display()))
    })?;
    let real = match tokio::fs::canonicalize(&path).await {
        Ok(real) => real,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(DomainError::not_found(format!("Document {}", path.display())));
        }
        Err(e) => return Err(DomainError::validation(format!("{}: {e}", path.display()))),
    };

    if !real.starts_with(&real_root) {
        return Err(DomainError::validation(format!(
            "{} is outside the documents directory",
            requested.display()
        )));
    }
    Ok(real)
}

#[async_trait]
impl DocumentLoader for FsDocumentLoader {
    async fn load(&self, path: &Path, topic: &Topic) -> Result<Document, DomainError> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(DomainError::not_found(format!(
                "Document {}",
                path.display()
            )));
        }

        let pages = if is_pdf(path) {
            read_pdf(path).await?
        } else {
            read_text(path).await?
        };

        debug!(path = %path.display(), topic = %topic, pages = pages.len(), "document loaded");
        Ok(Document::new(topic.clone(), path, pages))
    }
}
