//! mu-pager -- Document pagination and reading-position synchronization
//!
//! Turns a single markup document into a deterministic sequence of
//! character-budgeted pages, prefixed by a generated table-of-contents page,
//! and keeps a reader's position in sync with a remote progress store.
//!
//! # Pipeline
//!
//! 1. [`extract`] splits markup into top-level content blocks and images
//! 2. [`reattach`] merges images back into the block stream
//! 3. [`paginate`] packs units greedily into pages under a character budget
//! 4. [`toc`] builds heading entries and prepends the TOC page
//! 5. [`search`] filters pages by a query and highlights matches
//!
//! [`PaginatedDocument`] runs steps 1-4 in one call.
//!
//! # Features
//!
//! - `std` (default) -- `std::error::Error` impls and logging via `log`
//! - `async` (default) -- progress store seam, markup sources and reading
//!   sessions on `tokio`
//! - `cli` -- the `mu-pager` inspection binary
//!
//! Without `std` the pure pipeline builds on `alloc` alone.

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
#![deny(clippy::large_enum_variant, clippy::large_stack_arrays, clippy::redundant_clone)]
#![warn(
    clippy::box_collection,
    clippy::needless_collect,
    clippy::map_clone,
    clippy::implicit_clone,
    clippy::inefficient_to_string
)]

extern crate alloc;

pub mod document;
pub mod error;
pub mod extract;
pub mod paginate;
pub mod reattach;
pub mod search;
pub mod toc;

#[cfg(feature = "async")]
pub mod progress;

#[cfg(feature = "async")]
pub mod session;

#[cfg(feature = "async")]
pub mod source;

// Re-export key types for convenience
pub use document::{DocumentBuilder, DocumentOptions, PaginatedDocument};
pub use error::{FetchError, ReaderError, StoreError};
pub use extract::{
    extract_blocks, extract_blocks_with_limits, BlockKind, ContentBlock, ExtractError,
    ExtractLimits, Extraction, ImageRef,
};
pub use paginate::{paginate, BlockRange, Page, PageKind, PaginationOptions, Paginator};
#[cfg(feature = "async")]
pub use progress::{MemoryProgressStore, Progress, ProgressKey, ProgressStore, ProgressUpdate};
pub use reattach::{reattach_images, ContentUnit};
pub use search::{filter_pages, SearchOptions, SearchResults};
#[cfg(feature = "async")]
pub use session::{
    Reader, RestoreOutcome, Session, SessionId, SyncEvent, SyncOutcome, SYNC_EVENT_CAPACITY,
};
#[cfg(feature = "async")]
pub use source::{FileSource, MarkupSource, MemorySource, RawDocument};
pub use toc::{insert_toc, TableOfContents, TocEntry, TocOptions};
