//! Integration tests for reading sessions and progress sync
//!
//! Run:    cargo test --test session

#![cfg(feature = "async")]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::Notify;

use mu_pager::{
    DocumentOptions, FetchError, MarkupSource, MemoryProgressStore, MemorySource, PageKind,
    PaginationOptions, Progress, ProgressKey, ProgressStore, ProgressUpdate, RawDocument, Reader,
    ReaderError, RestoreOutcome, StoreError, SyncOutcome,
};

/// Six paragraphs of 36-37 characters; at a 40-char budget each is a page.
fn dragon_markup() -> String {
    let mut out = String::from("<h1>Start</h1>");
    for i in 0..6 {
        let body = match i {
            2 => "A Dragon sleeps under the hill",
            5 => "the dragon wakes; DRAGONS fly",
            _ => "quiet fields and empty roads.",
        };
        out.push_str(&format!("<p>{}</p>", body));
    }
    out
}

fn options() -> DocumentOptions {
    DocumentOptions {
        pagination: PaginationOptions::with_budget(40),
        ..DocumentOptions::default()
    }
}

fn source() -> MemorySource {
    MemorySource::new().with_document("dragons", dragon_markup())
}

fn key() -> ProgressKey {
    ProgressKey::new("reader-1", 7)
}

/// Store whose operations can be switched to fail.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryProgressStore,
    fail_read: AtomicBool,
    fail_upsert: AtomicBool,
    fail_delete: AtomicBool,
}

impl ProgressStore for FlakyStore {
    async fn read(&self, key: &ProgressKey) -> Result<Option<Progress>, StoreError> {
        if self.fail_read.load(Ordering::SeqCst) {
            return Err(StoreError::new("read unavailable"));
        }
        self.inner.read(key).await
    }

    async fn upsert(&self, key: &ProgressKey, update: ProgressUpdate) -> Result<Progress, StoreError> {
        if self.fail_upsert.load(Ordering::SeqCst) {
            return Err(StoreError::new("upsert rejected"));
        }
        self.inner.upsert(key, update).await
    }

    async fn delete(&self, key: &ProgressKey) -> Result<bool, StoreError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(StoreError::new("delete rejected"));
        }
        self.inner.delete(key).await
    }
}

/// Source that holds back one reference until released.
struct GatedSource {
    inner: MemorySource,
    gated_ref: &'static str,
    gate: Arc<Notify>,
}

impl MarkupSource for GatedSource {
    async fn fetch(&self, source_ref: &str) -> Result<RawDocument, FetchError> {
        if source_ref == self.gated_ref {
            self.gate.notified().await;
        }
        self.inner.fetch(source_ref).await
    }
}

fn reader() -> Reader<MemorySource, FlakyStore> {
    Reader::with_options(source(), FlakyStore::default(), options())
}

// -- Opening -----------------------------------------------------------------

#[tokio::test]
async fn test_open_paginates_with_toc() {
    let reader = reader();
    let session = reader.open_document("dragons", "reader-1", 7).await.unwrap();
    assert_eq!(session.page_count(), 8);
    assert_eq!(session.current_page().kind, PageKind::Toc);
    assert_eq!(session.table_of_contents().len(), 1);
    assert_eq!(session.position_label(), "Page 1 of 8");
}

#[tokio::test]
async fn test_fetch_failure_is_reported() {
    let reader = reader();
    let err = reader.open_document("missing", "reader-1", 7).await.unwrap_err();
    assert_eq!(err, ReaderError::Fetch(FetchError::NotFound("missing".into())));
}

#[tokio::test]
async fn test_parse_failure_is_reported() {
    let reader = Reader::with_options(
        MemorySource::new().with_document("blank", "   "),
        FlakyStore::default(),
        options(),
    );
    let err = reader.open_document("blank", "reader-1", 7).await.unwrap_err();
    assert!(matches!(err, ReaderError::Parse(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_progress_read_failure_starts_at_zero() {
    let reader = reader();
    reader.store().fail_read.store(true, Ordering::SeqCst);
    let session = reader.open_document("dragons", "reader-1", 7).await.unwrap();
    assert_eq!(session.cursor(), 0);
    assert_eq!(
        *session.restore_outcome(),
        RestoreOutcome::ReadFailed(ReaderError::ProgressRead("read unavailable".into()))
    );
}

#[tokio::test]
async fn test_stored_progress_is_clamped_to_last_page() {
    let reader = reader();
    reader.store().inner.insert(Progress {
        user_id: "reader-1".into(),
        book_id: 7,
        last_page: 50,
        total_pages: 60,
        timestamp: SystemTime::UNIX_EPOCH,
    });
    let session = reader.open_document("dragons", "reader-1", 7).await.unwrap();
    assert_eq!(session.cursor(), 7);
    assert_eq!(
        *session.restore_outcome(),
        RestoreOutcome::Restored {
            last_page: 50,
            stored_total: 60,
            clamped: true
        }
    );
    assert!(!session.is_bookmarked());
}

#[tokio::test]
async fn test_stored_zero_restores_first_page() {
    let reader = reader();
    reader.store().inner.insert(Progress {
        user_id: "reader-1".into(),
        book_id: 7,
        last_page: 0,
        total_pages: 8,
        timestamp: SystemTime::UNIX_EPOCH,
    });
    let session = reader.open_document("dragons", "reader-1", 7).await.unwrap();
    assert_eq!(session.cursor(), 0);
}

#[tokio::test]
async fn test_newer_open_supersedes_pending_one() {
    let gate = Arc::new(Notify::new());
    let source = GatedSource {
        inner: source().with_document("slow", "<p>slow</p>"),
        gated_ref: "slow",
        gate: Arc::clone(&gate),
    };
    let reader = Reader::with_options(source, FlakyStore::default(), options());

    let slow = reader.open_document("slow", "reader-1", 1);
    let fast = async {
        let session = reader.open_document("dragons", "reader-1", 7).await;
        gate.notify_one();
        session
    };
    let (slow, fast) = tokio::join!(slow, fast);

    assert_eq!(slow.err(), Some(ReaderError::Superseded { session: 1 }));
    let fast = fast.unwrap();
    assert_eq!(fast.id(), 2);
    assert_eq!(reader.active_session(), Some(2));
}

// -- Navigation and passive sync ---------------------------------------------

#[tokio::test]
async fn test_navigation_writes_page_index() {
    let reader = reader();
    let mut session = reader.open_document("dragons", "reader-1", 7).await.unwrap();
    session.next();
    session.next();
    session.previous();
    session.flush().await.unwrap();

    let row = reader.store().inner.get(&key()).unwrap();
    assert_eq!(row.last_page, 1);
    assert_eq!(row.total_pages, 8);
    let saved: Vec<usize> = session
        .drain_sync_events()
        .into_iter()
        .filter(|e| e.outcome == SyncOutcome::Saved)
        .map(|e| e.last_page)
        .collect();
    assert_eq!(saved, vec![1, 2, 1]);
}

#[tokio::test]
async fn test_clamped_navigation_does_not_write() {
    let reader = reader();
    let mut session = reader.open_document("dragons", "reader-1", 7).await.unwrap();
    session.previous();
    session.flush().await.unwrap();
    assert!(reader.store().inner.is_empty());
    assert!(session.drain_sync_events().is_empty());
}

#[tokio::test]
async fn test_write_failure_does_not_block_navigation() {
    let reader = reader();
    reader.store().fail_upsert.store(true, Ordering::SeqCst);
    let mut session = reader.open_document("dragons", "reader-1", 7).await.unwrap();
    assert_eq!(session.next(), 1);
    assert_eq!(session.next(), 2);
    session.flush().await.unwrap();

    assert_eq!(session.cursor(), 2);
    let events = session.drain_sync_events();
    assert_eq!(events.len(), 2);
    assert!(events
        .iter()
        .all(|e| matches!(e.outcome, SyncOutcome::Failed(_))));
}

#[tokio::test]
async fn test_stale_session_writes_are_discarded() {
    let reader = reader();
    let mut old = reader.open_document("dragons", "reader-1", 7).await.unwrap();
    let _new = reader.open_document("dragons", "reader-1", 8).await.unwrap();

    old.next();
    old.flush().await.unwrap();
    assert!(reader.store().inner.get(&key()).is_none());
    assert_eq!(old.drain_sync_events()[0].outcome, SyncOutcome::Discarded);

    let err = old.toggle_bookmark().await.unwrap_err();
    assert_eq!(err, ReaderError::Superseded { session: old.id() });
}

#[tokio::test]
async fn test_jump_to_toc_entry() {
    let reader = reader();
    let mut session = reader.open_document("dragons", "reader-1", 7).await.unwrap();
    assert_eq!(session.jump_to_toc(0).unwrap(), 1);
    assert!(matches!(
        session.jump_to_toc(3),
        Err(ReaderError::TocEntryOutOfBounds {
            index: 3,
            entry_count: 1
        })
    ));
}

// -- Bookmarks ---------------------------------------------------------------

#[tokio::test]
async fn test_bookmark_survives_reload() {
    let reader = reader();
    let mut session = reader.open_document("dragons", "reader-1", 7).await.unwrap();
    session.jump_to(3).unwrap();
    assert!(session.toggle_bookmark().await.unwrap());
    assert!(session.is_bookmarked());
    session.close().await.unwrap();

    assert_eq!(reader.store().inner.get(&key()).unwrap().last_page, 4);

    let reopened = reader.open_document("dragons", "reader-1", 7).await.unwrap();
    assert_eq!(reopened.cursor(), 3);
    assert!(reopened.is_bookmarked());
}

#[tokio::test]
async fn test_unpin_deletes_progress() {
    let reader = reader();
    let mut session = reader.open_document("dragons", "reader-1", 7).await.unwrap();
    session.jump_to(2).unwrap();
    assert!(session.toggle_bookmark().await.unwrap());
    assert!(!session.toggle_bookmark().await.unwrap());
    session.flush().await.unwrap();
    assert!(reader.store().inner.get(&key()).is_none());
}

#[tokio::test]
async fn test_pin_failure_leaves_state_unchanged() {
    let reader = reader();
    let mut session = reader.open_document("dragons", "reader-1", 7).await.unwrap();
    session.jump_to(2).unwrap();
    session.flush().await.unwrap();
    reader.store().fail_upsert.store(true, Ordering::SeqCst);

    let err = session.toggle_bookmark().await.unwrap_err();
    assert!(matches!(err, ReaderError::ProgressWrite(_)));
    assert!(err.is_retryable());
    assert!(!session.is_bookmarked());
    assert_eq!(reader.store().inner.get(&key()).unwrap().last_page, 2);
}

#[tokio::test]
async fn test_unpin_failure_keeps_bookmark() {
    let reader = reader();
    let mut session = reader.open_document("dragons", "reader-1", 7).await.unwrap();
    session.jump_to(2).unwrap();
    session.toggle_bookmark().await.unwrap();
    reader.store().fail_delete.store(true, Ordering::SeqCst);

    assert!(session.toggle_bookmark().await.is_err());
    assert!(session.is_bookmarked());
}

#[tokio::test]
async fn test_moving_away_clears_bookmark_flag() {
    let reader = reader();
    let mut session = reader.open_document("dragons", "reader-1", 7).await.unwrap();
    session.jump_to(3).unwrap();
    session.toggle_bookmark().await.unwrap();
    session.next();
    assert!(!session.is_bookmarked());
}

// -- Search ------------------------------------------------------------------

#[tokio::test]
async fn test_search_resets_cursor_and_syncs_document_page() {
    let reader = reader();
    let mut session = reader.open_document("dragons", "reader-1", 7).await.unwrap();
    session.jump_to(5).unwrap();

    assert_eq!(session.set_search_query("dragon"), 2);
    assert_eq!(session.cursor(), 0);
    assert_eq!(session.search_query(), Some("dragon"));
    assert_eq!(session.current_document_page(), Some(4));
    assert!(session
        .current_page()
        .html
        .contains("<mark class=\"search-highlight\">Dragon</mark>"));

    assert_eq!(session.next(), 1);
    assert_eq!(session.current_document_page(), Some(7));
    assert_eq!(session.next(), 1);
    session.flush().await.unwrap();
    assert_eq!(reader.store().inner.get(&key()).unwrap().last_page, 7);

    assert_eq!(session.set_search_query(""), 8);
    assert_eq!(session.cursor(), 0);
    assert!(session.search_query().is_none());
}

#[tokio::test]
async fn test_blank_query_keeps_restored_position() {
    let reader = reader();
    reader.store().inner.insert(Progress {
        user_id: "reader-1".into(),
        book_id: 7,
        last_page: 6,
        total_pages: 8,
        timestamp: SystemTime::UNIX_EPOCH,
    });
    let mut session = reader.open_document("dragons", "reader-1", 7).await.unwrap();
    assert_eq!(session.cursor(), 5);
    assert!(session.is_bookmarked());

    assert_eq!(session.set_search_query(""), 8);
    assert_eq!(session.set_search_query("   "), 8);
    session.flush().await.unwrap();

    assert_eq!(session.cursor(), 5);
    assert!(session.is_bookmarked());
    assert_eq!(reader.store().inner.get(&key()).unwrap().last_page, 6);
    assert!(session.drain_sync_events().is_empty());
}

#[tokio::test]
async fn test_clearing_search_twice_is_idempotent() {
    let reader = reader();
    let mut session = reader.open_document("dragons", "reader-1", 7).await.unwrap();
    session.set_search_query("dragon");
    assert_eq!(session.search_results().unwrap().match_count, 3);

    assert_eq!(session.set_search_query(""), 8);
    assert_eq!(session.pages(), session.document().pages());
    assert!(session.search_results().is_none());
    session.jump_to(3).unwrap();
    session.flush().await.unwrap();
    session.drain_sync_events();

    assert_eq!(session.set_search_query(""), 8);
    session.flush().await.unwrap();
    assert_eq!(session.pages(), session.document().pages());
    assert_eq!(session.cursor(), 3);
    assert_eq!(reader.store().inner.get(&key()).unwrap().last_page, 3);
    assert!(session.drain_sync_events().is_empty());
}

#[tokio::test]
async fn test_repeating_query_keeps_cursor() {
    let reader = reader();
    let mut session = reader.open_document("dragons", "reader-1", 7).await.unwrap();
    session.set_search_query("dragon");
    assert_eq!(session.next(), 1);

    assert_eq!(session.set_search_query("dragon"), 2);
    assert_eq!(session.cursor(), 1);
    assert_eq!(session.current_document_page(), Some(7));
}

#[tokio::test]
async fn test_no_results_page_is_not_synced_or_pinned() {
    let reader = reader();
    let mut session = reader.open_document("dragons", "reader-1", 7).await.unwrap();
    assert_eq!(session.set_search_query("griffin"), 1);
    assert_eq!(session.current_page().kind, PageKind::NoResults);
    assert_eq!(session.current_document_page(), None);
    assert!(!session.toggle_bookmark().await.unwrap());
    session.flush().await.unwrap();
    assert!(reader.store().inner.get(&key()).is_none());
}

#[tokio::test]
async fn test_jump_to_toc_clears_search() {
    let reader = reader();
    let mut session = reader.open_document("dragons", "reader-1", 7).await.unwrap();
    session.set_search_query("dragon");
    assert_eq!(session.jump_to_toc(0).unwrap(), 1);
    assert!(session.search_query().is_none());
    assert_eq!(session.page_count(), 8);
}
