//! Markup retrieval
//!
//! `MarkupSource` is the seam to whatever serves book markup (an HTTP
//! client in a storefront, the filesystem for the CLI, a map in tests).

use std::collections::HashMap;
use std::future::Future;
use std::path::{Component, Path, PathBuf};

use crate::error::FetchError;

/// Raw markup fetched for one open.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawDocument {
    /// Reference the markup was fetched from.
    pub source_ref: String,
    /// Unprocessed markup.
    pub markup: String,
}

/// Capability to turn a source reference into markup.
pub trait MarkupSource: Send + Sync + 'static {
    /// Fetch the markup behind `source_ref`.
    fn fetch(&self, source_ref: &str)
        -> impl Future<Output = Result<RawDocument, FetchError>> + Send;
}

/// In-memory source keyed by reference.
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    documents: HashMap<String, String>,
}

impl MemorySource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document, builder style.
    pub fn with_document(mut self, source_ref: impl Into<String>, markup: impl Into<String>) -> Self {
        self.insert(source_ref, markup);
        self
    }

    /// Add or replace a document.
    pub fn insert(&mut self, source_ref: impl Into<String>, markup: impl Into<String>) {
        self.documents.insert(source_ref.into(), markup.into());
    }
}

impl MarkupSource for MemorySource {
    async fn fetch(&self, source_ref: &str) -> Result<RawDocument, FetchError> {
        let markup = self
            .documents
            .get(source_ref)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(source_ref.to_string()))?;
        Ok(RawDocument {
            source_ref: source_ref.to_string(),
            markup,
        })
    }
}

/// Filesystem source resolving references relative to a root directory.
#[derive(Clone, Debug)]
pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    /// Serve files under `root`.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Resolve `source_ref` under the root, refusing to escape it.
    fn resolve(&self, source_ref: &str) -> Result<PathBuf, FetchError> {
        let relative = Path::new(source_ref);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(FetchError::NotFound(source_ref.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl MarkupSource for FileSource {
    async fn fetch(&self, source_ref: &str) -> Result<RawDocument, FetchError> {
        let path = self.resolve(source_ref)?;
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FetchError::NotFound(source_ref.to_string())
            } else {
                FetchError::Transport(e.to_string())
            }
        })?;
        let markup =
            String::from_utf8(bytes).map_err(|_| FetchError::NotText(source_ref.to_string()))?;
        Ok(RawDocument {
            source_ref: source_ref.to_string(),
            markup,
        })
    }
}
