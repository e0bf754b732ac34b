//! Persisted reading progress keyed by (user, book)
//!
//! The store itself is an external collaborator; this module defines the
//! record types, the async `ProgressStore` seam and an in-memory store.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::SystemTime;

use crate::error::StoreError;

/// Composite key of a progress row.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProgressKey {
    /// Reader identity.
    pub user_id: String,
    /// Book identity.
    pub book_id: u64,
}

impl ProgressKey {
    /// Create a key.
    pub fn new(user_id: impl Into<String>, book_id: u64) -> Self {
        Self {
            user_id: user_id.into(),
            book_id,
        }
    }
}

/// Stored reading position for one (user, book).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Progress {
    /// Reader identity.
    pub user_id: String,
    /// Book identity.
    pub book_id: u64,
    /// Last page marker; see `Session` for how it encodes the cursor.
    pub last_page: usize,
    /// Document page count when the row was written.
    pub total_pages: usize,
    /// When the reader last advanced.
    pub timestamp: SystemTime,
}

impl Progress {
    /// Key of this row.
    pub fn key(&self) -> ProgressKey {
        ProgressKey::new(self.user_id.clone(), self.book_id)
    }
}

/// Values written by an upsert.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// New last page marker.
    pub last_page: usize,
    /// Current document page count.
    pub total_pages: usize,
}

/// Remote key-value progress storage.
///
/// Implementations talk to whatever backs persistence (HTTP API, database).
/// All methods may fail; callers decide whether a failure is fatal.
pub trait ProgressStore: Send + Sync + 'static {
    /// Read the row for `key`, if one exists.
    fn read(
        &self,
        key: &ProgressKey,
    ) -> impl Future<Output = Result<Option<Progress>, StoreError>> + Send;

    /// Create or update the row for `key`.
    fn upsert(
        &self,
        key: &ProgressKey,
        update: ProgressUpdate,
    ) -> impl Future<Output = Result<Progress, StoreError>> + Send;

    /// Delete the row for `key`. Returns whether a row existed.
    fn delete(&self, key: &ProgressKey) -> impl Future<Output = Result<bool, StoreError>> + Send;
}

/// Process-local progress store.
///
/// The timestamp only moves when `last_page` increases, so it records when
/// the reader last got further into the book.
#[derive(Debug, Default)]
pub struct MemoryProgressStore {
    rows: Mutex<HashMap<ProgressKey, Progress>>,
}

impl MemoryProgressStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous snapshot of the row for `key`.
    pub fn get(&self, key: &ProgressKey) -> Option<Progress> {
        self.rows.lock().ok()?.get(key).cloned()
    }

    /// Insert a row directly, replacing any existing one.
    pub fn insert(&self, progress: Progress) {
        if let Ok(mut rows) = self.rows.lock() {
            rows.insert(progress.key(), progress);
        }
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or(0)
    }

    /// Check if the store has no rows
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_rows<T>(
        &self,
        f: impl FnOnce(&mut HashMap<ProgressKey, Progress>) -> T,
    ) -> Result<T, StoreError> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| StoreError::new("progress store lock poisoned"))?;
        Ok(f(&mut rows))
    }
}

impl ProgressStore for MemoryProgressStore {
    async fn read(&self, key: &ProgressKey) -> Result<Option<Progress>, StoreError> {
        self.with_rows(|rows| rows.get(key).cloned())
    }

    async fn upsert(
        &self,
        key: &ProgressKey,
        update: ProgressUpdate,
    ) -> Result<Progress, StoreError> {
        let now = SystemTime::now();
        self.with_rows(|rows| {
            let row = rows.entry(key.clone()).or_insert_with(|| Progress {
                user_id: key.user_id.clone(),
                book_id: key.book_id,
                last_page: update.last_page,
                total_pages: update.total_pages,
                timestamp: now,
            });
            if update.last_page > row.last_page {
                row.timestamp = now;
            }
            row.last_page = update.last_page;
            row.total_pages = update.total_pages;
            row.clone()
        })
    }

    async fn delete(&self, key: &ProgressKey) -> Result<bool, StoreError> {
        self.with_rows(|rows| rows.remove(key).is_some())
    }
}
