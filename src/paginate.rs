//! Content-budget pagination
//!
//! Groups content units into pages by serialized markup size. Greedy: units
//! accumulate on the current page until the next one would push it past the
//! budget. A unit is never split; one that alone exceeds the budget gets a
//! page to itself.
//!
//! The same units and options always produce the same pages, which keeps
//! persisted page numbers valid across reloads.

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

use crate::reattach::ContentUnit;

/// What a page holds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PageKind {
    /// Synthetic table-of-contents page
    Toc,
    /// Document content
    Content,
    /// Placeholder shown when a search matches nothing
    NoResults,
}

/// Inclusive range of block `original_index` values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockRange {
    /// First block on the page.
    pub first: usize,
    /// Last block on the page.
    pub last: usize,
}

impl BlockRange {
    /// Range holding a single block.
    pub fn single(index: usize) -> Self {
        Self {
            first: index,
            last: index,
        }
    }

    /// Whether `index` falls inside the range.
    pub fn contains(&self, index: usize) -> bool {
        self.first <= index && index <= self.last
    }

    /// Number of blocks covered.
    pub fn len(&self) -> usize {
        self.last - self.first + 1
    }

    /// Always false; ranges cover at least one block.
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// A single page of content
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Page {
    /// 0-based position in the document's page list.
    pub page_index: usize,
    /// Page role.
    pub kind: PageKind,
    /// Concatenated markup of the page's units.
    pub html: String,
    /// Blocks on this page; `None` for synthetic pages and image-only pages.
    pub source_blocks: Option<BlockRange>,
}

impl Page {
    /// Whether the page carries document content.
    pub fn is_content(&self) -> bool {
        self.kind == PageKind::Content
    }

    /// Whether block `index` is on this page.
    pub fn contains_block(&self, index: usize) -> bool {
        self.source_blocks.is_some_and(|r| r.contains(index))
    }

    /// Page size in characters.
    pub fn char_len(&self) -> usize {
        self.html.chars().count()
    }
}

/// Pagination configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PaginationOptions {
    /// Soft ceiling on page size, in characters of serialized markup.
    pub max_chars_per_page: usize,
}

impl PaginationOptions {
    /// Default page budget in characters.
    pub const DEFAULT_MAX_CHARS: usize = 3000;

    /// Options with a specific character budget (at least 1).
    pub fn with_budget(max_chars_per_page: usize) -> Self {
        Self {
            max_chars_per_page: max_chars_per_page.max(1),
        }
    }
}

impl Default for PaginationOptions {
    fn default() -> Self {
        Self {
            max_chars_per_page: Self::DEFAULT_MAX_CHARS,
        }
    }
}

/// Incremental greedy paginator.
///
/// Feed units in order with [`Paginator::push_unit`], then collect pages
/// with [`Paginator::into_pages`].
#[derive(Clone, Debug)]
pub struct Paginator {
    budget: usize,
    pages: Vec<Page>,
    buffer: String,
    buffer_chars: usize,
    buffer_units: usize,
    range: Option<BlockRange>,
}

impl Paginator {
    /// Create a paginator for the given options.
    pub fn new(options: PaginationOptions) -> Self {
        Self {
            budget: options.max_chars_per_page.max(1),
            pages: Vec::new(),
            buffer: String::new(),
            buffer_chars: 0,
            buffer_units: 0,
            range: None,
        }
    }

    /// Append the next unit, closing the current page first if the unit
    /// would push it over budget.
    pub fn push_unit(&mut self, unit: &ContentUnit) {
        let unit_chars = unit.char_len();
        if self.buffer_units > 0 && self.buffer_chars + unit_chars > self.budget {
            self.close_page();
        }

        unit.write_markup(&mut self.buffer);
        self.buffer_chars += unit_chars;
        self.buffer_units += 1;
        if let Some(index) = unit.block_index() {
            self.range = Some(match self.range {
                Some(range) => BlockRange {
                    first: range.first,
                    last: index,
                },
                None => BlockRange::single(index),
            });
        }
    }

    /// Number of pages closed so far.
    pub fn closed_pages(&self) -> usize {
        self.pages.len()
    }

    /// Close the last page and return all pages.
    ///
    /// A paginator that saw no units yields one empty content page so page
    /// counts are never zero.
    pub fn into_pages(mut self) -> Vec<Page> {
        if self.buffer_units > 0 || self.pages.is_empty() {
            self.close_page();
        }
        self.pages
    }

    fn close_page(&mut self) {
        let page_index = self.pages.len();
        self.pages.push(Page {
            page_index,
            kind: PageKind::Content,
            html: core::mem::take(&mut self.buffer),
            source_blocks: self.range.take(),
        });
        self.buffer_chars = 0;
        self.buffer_units = 0;
    }
}

/// Paginate an ordered content stream.
pub fn paginate(units: &[ContentUnit], options: PaginationOptions) -> Vec<Page> {
    let mut paginator = Paginator::new(options);
    for unit in units {
        paginator.push_unit(unit);
    }
    paginator.into_pages()
}
