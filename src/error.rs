//! Unified error types for mu-pager
//!
//! Provides a top-level `ReaderError` that wraps module-specific errors,
//! plus `From` impls so `?` works across module boundaries.

extern crate alloc;

use alloc::string::{String, ToString};
use core::fmt;

use crate::extract::ExtractError;

/// Top-level error type for mu-pager operations
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReaderError {
    /// Markup could not be retrieved from its source
    Fetch(FetchError),
    /// Markup could not be turned into content blocks
    Parse(ExtractError),
    /// Remote progress could not be read
    ProgressRead(String),
    /// Remote progress could not be written
    ProgressWrite(String),
    /// Page index requested is out of bounds for the active page view
    PageOutOfBounds {
        /// Requested page index.
        index: usize,
        /// Number of pages in the active view.
        page_count: usize,
    },
    /// Table-of-contents entry requested is out of bounds
    TocEntryOutOfBounds {
        /// Requested entry index.
        index: usize,
        /// Number of entries available.
        entry_count: usize,
    },
    /// A newer document was opened while this operation was in flight
    Superseded {
        /// Identifier of the session whose result was discarded.
        session: u64,
    },
    /// The session's background writer is gone
    SessionClosed,
}

impl ReaderError {
    /// Whether the caller may reasonably retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReaderError::Fetch(_) | ReaderError::ProgressWrite(_))
    }
}

impl fmt::Display for ReaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReaderError::Fetch(err) => write!(f, "Fetch error: {}", err),
            ReaderError::Parse(err) => write!(f, "Parse error: {}", err),
            ReaderError::ProgressRead(msg) => write!(f, "Progress read error: {}", msg),
            ReaderError::ProgressWrite(msg) => write!(f, "Progress write error: {}", msg),
            ReaderError::PageOutOfBounds { index, page_count } => write!(
                f,
                "Page index {} out of bounds (page count: {})",
                index, page_count
            ),
            ReaderError::TocEntryOutOfBounds { index, entry_count } => write!(
                f,
                "TOC entry {} out of bounds (entry count: {})",
                index, entry_count
            ),
            ReaderError::Superseded { session } => {
                write!(f, "Session {} was superseded by a newer document", session)
            }
            ReaderError::SessionClosed => write!(f, "Session is closed"),
        }
    }
}

/// Failure retrieving raw markup
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FetchError {
    /// No document is known under the requested reference
    NotFound(String),
    /// Transport-level failure (I/O, network, HTTP status)
    Transport(String),
    /// Payload was not valid UTF-8 text
    NotText(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::NotFound(source_ref) => write!(f, "document not found: {}", source_ref),
            FetchError::Transport(msg) => write!(f, "transport failure: {}", msg),
            FetchError::NotText(source_ref) => {
                write!(f, "document is not valid UTF-8: {}", source_ref)
            }
        }
    }
}

/// Failure reported by a progress store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    message: String,
}

impl StoreError {
    /// Create a store error with a description.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Description of the failure.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ReaderError {}

#[cfg(feature = "std")]
impl std::error::Error for FetchError {}

#[cfg(feature = "std")]
impl std::error::Error for StoreError {}

impl From<ExtractError> for ReaderError {
    fn from(err: ExtractError) -> Self {
        ReaderError::Parse(err)
    }
}

impl From<FetchError> for ReaderError {
    fn from(err: FetchError) -> Self {
        ReaderError::Fetch(err)
    }
}

impl From<StoreError> for ReaderError {
    fn from(err: StoreError) -> Self {
        ReaderError::ProgressWrite(err.to_string())
    }
}
