//! Reading sessions and progress synchronization
//!
//! A [`Reader`] opens documents into [`Session`]s. Each session owns the
//! page cursor for one open document and mirrors it to a
//! [`ProgressStore`] through a background writer task:
//!
//! - navigation queues a fire-and-forget upsert; failures are logged and
//!   never block the cursor
//! - bookmark toggles go through the same queue but wait for the store's
//!   answer, so success is only reported once it is persisted
//!
//! Every session gets an id and the reader tracks which one is active.
//! Opening a new document makes all older sessions stale: an open still
//! waiting on its fetch fails with [`ReaderError::Superseded`], and queued
//! writes from a stale session are dropped before they reach the store.
//!
//! Progress rows encode the cursor as follows: passive writes store the
//! 0-based page index, bookmark pins store `index + 1`, and opening
//! restores `last_page - 1` clamped into the page range. A session is
//! bookmarked when the stored value equals `cursor + 1`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::document::{DocumentOptions, PaginatedDocument};
use crate::error::ReaderError;
use crate::paginate::{Page, PageKind};
use crate::progress::{Progress, ProgressKey, ProgressStore, ProgressUpdate};
use crate::search::{self, SearchResults};
use crate::source::MarkupSource;
use crate::toc::TocEntry;

/// Identifier of one opened session; never reused by a `Reader`.
pub type SessionId = u64;

/// Passive-write reports a session holds before newer ones are dropped.
pub const SYNC_EVENT_CAPACITY: usize = 256;

/// How the initial cursor was chosen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// No stored progress; cursor starts at 0.
    Fresh,
    /// Stored progress was applied.
    Restored {
        /// Stored last page marker.
        last_page: usize,
        /// Page count recorded with it.
        stored_total: usize,
        /// Whether the marker fell outside the current page range.
        clamped: bool,
    },
    /// Progress could not be read; cursor starts at 0.
    ReadFailed(ReaderError),
}

/// Result of one passive progress write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The store accepted the write.
    Saved,
    /// The store rejected the write; the local cursor is unaffected.
    Failed(String),
    /// The session was no longer active; nothing was written.
    Discarded,
}

/// Completion report of a passive progress write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncEvent {
    /// Session that queued the write.
    pub session: SessionId,
    /// Page marker that was (or would have been) written.
    pub last_page: usize,
    /// What happened.
    pub outcome: SyncOutcome,
}

enum WriteCommand {
    Passive(ProgressUpdate),
    Pin {
        update: ProgressUpdate,
        ack: oneshot::Sender<Result<(), ReaderError>>,
    },
    Unpin {
        ack: oneshot::Sender<Result<(), ReaderError>>,
    },
    Flush {
        ack: oneshot::Sender<()>,
    },
}

/// Opens documents and hands out sessions bound to one progress store.
#[derive(Debug)]
pub struct Reader<S, P> {
    source: Arc<S>,
    store: Arc<P>,
    options: DocumentOptions,
    active: Arc<AtomicU64>,
    next_id: AtomicU64,
}

impl<S: MarkupSource, P: ProgressStore> Reader<S, P> {
    /// Create a reader with default document options.
    pub fn new(source: S, store: P) -> Self {
        Self::with_options(source, store, DocumentOptions::default())
    }

    /// Create a reader with explicit document options.
    pub fn with_options(source: S, store: P, options: DocumentOptions) -> Self {
        Self::from_shared(Arc::new(source), Arc::new(store), options)
    }

    /// Create a reader over shared source and store handles.
    pub fn from_shared(source: Arc<S>, store: Arc<P>, options: DocumentOptions) -> Self {
        Self {
            source,
            store,
            options,
            active: Arc::new(AtomicU64::new(0)),
            next_id: AtomicU64::new(0),
        }
    }

    /// Shared handle to the progress store.
    pub fn store(&self) -> &Arc<P> {
        &self.store
    }

    /// Document options used for every open.
    pub fn options(&self) -> &DocumentOptions {
        &self.options
    }

    /// Id of the most recently opened session, if any.
    pub fn active_session(&self) -> Option<SessionId> {
        match self.active.load(Ordering::SeqCst) {
            0 => None,
            id => Some(id),
        }
    }

    /// Fetch, paginate and open a document, restoring stored progress.
    ///
    /// Fails with `Fetch` or `Parse` when the document cannot be loaded and
    /// with `Superseded` when another open started before this one
    /// finished. A failed progress read is not fatal; the session starts
    /// at page 0 and reports `RestoreOutcome::ReadFailed`.
    pub async fn open_document(
        &self,
        source_ref: &str,
        user_id: impl Into<String>,
        book_id: u64,
    ) -> Result<Session, ReaderError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.active.store(id, Ordering::SeqCst);
        log::debug!("session {}: opening '{}'", id, source_ref);

        let raw = self.source.fetch(source_ref).await.map_err(|err| {
            log::warn!("session {}: fetch of '{}' failed: {}", id, source_ref, err);
            ReaderError::from(err)
        })?;
        self.ensure_active(id)?;

        let document = PaginatedDocument::from_markup_with_options(&raw.markup, self.options.clone())?;

        let key = ProgressKey::new(user_id, book_id);
        let stored = self.store.read(&key).await;
        self.ensure_active(id)?;
        let stored = stored.map_err(|err| {
            log::warn!("session {}: progress read failed: {}", id, err);
            ReaderError::ProgressRead(err.to_string())
        });

        log::info!(
            "session {}: opened '{}' with {} blocks on {} pages",
            id,
            source_ref,
            document.block_count(),
            document.page_count()
        );

        Ok(Session::start(
            id,
            key,
            document,
            stored,
            Arc::clone(&self.store),
            Arc::clone(&self.active),
        ))
    }

    fn ensure_active(&self, id: SessionId) -> Result<(), ReaderError> {
        if self.active.load(Ordering::SeqCst) == id {
            Ok(())
        } else {
            log::debug!("session {}: discarding stale open result", id);
            Err(ReaderError::Superseded { session: id })
        }
    }
}

/// In-memory state of one open document.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    key: ProgressKey,
    document: PaginatedDocument,
    search: Option<SearchResults>,
    cursor: usize,
    stored_last_page: Option<usize>,
    restore: RestoreOutcome,
    commands: mpsc::UnboundedSender<WriteCommand>,
    events: mpsc::Receiver<SyncEvent>,
}

impl Session {
    fn start<P: ProgressStore>(
        id: SessionId,
        key: ProgressKey,
        document: PaginatedDocument,
        stored: Result<Option<Progress>, ReaderError>,
        store: Arc<P>,
        active: Arc<AtomicU64>,
    ) -> Self {
        let page_count = document.page_count();
        let (cursor, restore, stored_last_page) = match stored {
            Ok(Some(progress)) => {
                let wanted = progress.last_page.saturating_sub(1);
                let cursor = wanted.min(page_count - 1);
                let restore = RestoreOutcome::Restored {
                    last_page: progress.last_page,
                    stored_total: progress.total_pages,
                    clamped: cursor != wanted,
                };
                (cursor, restore, Some(progress.last_page))
            }
            Ok(None) => (0, RestoreOutcome::Fresh, None),
            Err(err) => (0, RestoreOutcome::ReadFailed(err), None),
        };

        let (commands, command_rx) = mpsc::unbounded_channel();
        let (event_tx, events) = mpsc::channel(SYNC_EVENT_CAPACITY);
        tokio::spawn(run_writer(
            id,
            key.clone(),
            store,
            active,
            command_rx,
            event_tx,
        ));

        Self {
            id,
            key,
            document,
            search: None,
            cursor,
            stored_last_page,
            restore,
            commands,
            events,
        }
    }

    /// Session identifier.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Progress key this session writes to.
    pub fn key(&self) -> &ProgressKey {
        &self.key
    }

    /// The loaded document.
    pub fn document(&self) -> &PaginatedDocument {
        &self.document
    }

    /// How the initial cursor was chosen.
    pub fn restore_outcome(&self) -> &RestoreOutcome {
        &self.restore
    }

    /// Pages currently navigable: search results, or the whole document.
    pub fn pages(&self) -> &[Page] {
        match &self.search {
            Some(results) => &results.pages,
            None => self.document.pages(),
        }
    }

    /// Number of navigable pages; never zero.
    pub fn page_count(&self) -> usize {
        self.pages().len()
    }

    /// Cursor position within `pages()`.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Page under the cursor.
    pub fn current_page(&self) -> &Page {
        &self.pages()[self.cursor]
    }

    /// Document page index under the cursor; `None` on a no-results page.
    pub fn current_document_page(&self) -> Option<usize> {
        let page = self.current_page();
        (page.kind != PageKind::NoResults).then_some(page.page_index)
    }

    /// Table of contents of the document.
    pub fn table_of_contents(&self) -> &[TocEntry] {
        self.document.toc()
    }

    /// Active search query, if any.
    pub fn search_query(&self) -> Option<&str> {
        self.search.as_ref().map(|s| s.query.as_str())
    }

    /// Active search results, if any.
    pub fn search_results(&self) -> Option<&SearchResults> {
        self.search.as_ref()
    }

    /// Whether the current page is bookmarked.
    pub fn is_bookmarked(&self) -> bool {
        match (self.stored_last_page, self.current_document_page()) {
            (Some(stored), Some(page)) => stored == page + 1,
            _ => false,
        }
    }

    /// "Page X of Y" for the navigable pages.
    pub fn position_label(&self) -> String {
        format!("Page {} of {}", self.cursor + 1, self.page_count())
    }

    /// Fraction of navigable pages reached, in `(0.0, 1.0]`.
    pub fn progress_ratio(&self) -> f32 {
        (self.cursor + 1) as f32 / self.page_count() as f32
    }

    /// Move to the next page if there is one. Returns the cursor.
    pub fn next(&mut self) -> usize {
        if self.cursor + 1 < self.page_count() {
            self.move_cursor(self.cursor + 1);
        }
        self.cursor
    }

    /// Move to the previous page if there is one. Returns the cursor.
    pub fn previous(&mut self) -> usize {
        if self.cursor > 0 {
            self.move_cursor(self.cursor - 1);
        }
        self.cursor
    }

    /// Move to `index` within `pages()`.
    pub fn jump_to(&mut self, index: usize) -> Result<usize, ReaderError> {
        let page_count = self.page_count();
        if index >= page_count {
            return Err(ReaderError::PageOutOfBounds { index, page_count });
        }
        if index != self.cursor {
            self.move_cursor(index);
        }
        Ok(self.cursor)
    }

    /// Jump to the page of TOC entry `entry`, clearing any active search.
    pub fn jump_to_toc(&mut self, entry: usize) -> Result<usize, ReaderError> {
        let target = self
            .document
            .toc()
            .get(entry)
            .map(|e| e.target_page_index)
            .ok_or(ReaderError::TocEntryOutOfBounds {
                index: entry,
                entry_count: self.document.toc().len(),
            })?;
        let cleared = self.search.take().is_some();
        if cleared || target != self.cursor {
            self.move_cursor(target);
        }
        Ok(self.cursor)
    }

    /// Replace the page view with results for `query`, or restore the full
    /// document for a blank query. The cursor resets to 0 when the view
    /// changes; repeating the current query is a no-op.
    /// Returns the number of navigable pages.
    pub fn set_search_query(&mut self, query: &str) -> usize {
        if search::active_query(query) == self.search_query() {
            return self.page_count();
        }
        self.search = self.document.search(query);
        self.move_cursor(0);
        self.page_count()
    }

    /// Pin or unpin the current page.
    ///
    /// Waits for the store. On failure the bookmark state is unchanged and
    /// the error is returned. Returns the new bookmarked state.
    pub async fn toggle_bookmark(&mut self) -> Result<bool, ReaderError> {
        let Some(page) = self.current_document_page() else {
            return Ok(false);
        };

        if self.is_bookmarked() {
            let (ack, done) = oneshot::channel();
            self.send(WriteCommand::Unpin { ack })?;
            done.await.map_err(|_| ReaderError::SessionClosed)??;
            self.stored_last_page = None;
        } else {
            let update = ProgressUpdate {
                last_page: page + 1,
                total_pages: self.document.page_count(),
            };
            let (ack, done) = oneshot::channel();
            self.send(WriteCommand::Pin { update, ack })?;
            done.await.map_err(|_| ReaderError::SessionClosed)??;
            self.stored_last_page = Some(update.last_page);
        }
        Ok(self.is_bookmarked())
    }

    /// Wait until every queued progress write has been handled.
    pub async fn flush(&self) -> Result<(), ReaderError> {
        let (ack, done) = oneshot::channel();
        self.send(WriteCommand::Flush { ack })?;
        done.await.map_err(|_| ReaderError::SessionClosed)
    }

    /// Flush pending writes and end the session.
    pub async fn close(self) -> Result<(), ReaderError> {
        self.flush().await
    }

    /// Take the completion reports of passive writes finished so far.
    ///
    /// At most [`SYNC_EVENT_CAPACITY`] reports wait here; while the buffer
    /// is full, reports of later writes are dropped. The writes themselves
    /// still happen.
    pub fn drain_sync_events(&mut self) -> Vec<SyncEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            if event.session == self.id {
                out.push(event);
            }
        }
        out
    }

    fn move_cursor(&mut self, index: usize) {
        self.cursor = index;
        let Some(page) = self.current_document_page() else {
            return;
        };
        let update = ProgressUpdate {
            last_page: page,
            total_pages: self.document.page_count(),
        };
        self.stored_last_page = Some(page);
        if self.send(WriteCommand::Passive(update)).is_err() {
            log::debug!("session {}: writer gone, progress not queued", self.id);
        }
    }

    fn send(&self, command: WriteCommand) -> Result<(), ReaderError> {
        self.commands
            .send(command)
            .map_err(|_| ReaderError::SessionClosed)
    }
}

async fn run_writer<P: ProgressStore>(
    id: SessionId,
    key: ProgressKey,
    store: Arc<P>,
    active: Arc<AtomicU64>,
    mut commands: mpsc::UnboundedReceiver<WriteCommand>,
    events: mpsc::Sender<SyncEvent>,
) {
    while let Some(command) = commands.recv().await {
        let is_active = active.load(Ordering::SeqCst) == id;
        match command {
            WriteCommand::Passive(update) => {
                let outcome = if !is_active {
                    log::debug!(
                        "session {}: dropping stale progress write (page {})",
                        id,
                        update.last_page
                    );
                    SyncOutcome::Discarded
                } else {
                    match store.upsert(&key, update).await {
                        Ok(_) => SyncOutcome::Saved,
                        Err(err) => {
                            log::warn!(
                                "session {}: failed to update progress to page {}: {}",
                                id,
                                update.last_page,
                                err
                            );
                            SyncOutcome::Failed(err.to_string())
                        }
                    }
                };
                let event = SyncEvent {
                    session: id,
                    last_page: update.last_page,
                    outcome,
                };
                if let Err(mpsc::error::TrySendError::Full(event)) = events.try_send(event) {
                    log::debug!(
                        "session {}: sync report for page {} dropped, buffer full",
                        id,
                        event.last_page
                    );
                }
            }
            WriteCommand::Pin { update, ack } => {
                let result = if is_active {
                    store
                        .upsert(&key, update)
                        .await
                        .map(|_| ())
                        .map_err(ReaderError::from)
                } else {
                    Err(ReaderError::Superseded { session: id })
                };
                if let Err(err) = &result {
                    log::warn!("session {}: bookmark pin failed: {}", id, err);
                }
                let _ = ack.send(result);
            }
            WriteCommand::Unpin { ack } => {
                let result = if is_active {
                    store
                        .delete(&key)
                        .await
                        .map(|_| ())
                        .map_err(ReaderError::from)
                } else {
                    Err(ReaderError::Superseded { session: id })
                };
                if let Err(err) = &result {
                    log::warn!("session {}: bookmark removal failed: {}", id, err);
                }
                let _ = ack.send(result);
            }
            WriteCommand::Flush { ack } => {
                let _ = ack.send(());
            }
        }
    }
    log::debug!("session {}: writer stopped", id);
}
