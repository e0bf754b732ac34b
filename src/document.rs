//! Paginated document: the full extraction-to-pages pipeline
//!
//! Runs block extraction, image reattachment, pagination and TOC insertion
//! in one step. Either a complete page set comes out or an error does;
//! there is no partially built document.

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::ReaderError;
use crate::extract::{extract_blocks_with_limits, ExtractLimits};
use crate::paginate::{paginate, Page, PaginationOptions};
use crate::reattach::{reattach_images, ContentUnit};
use crate::search::{filter_pages, SearchOptions, SearchResults};
use crate::toc::{insert_toc, TableOfContents, TocEntry, TocOptions};

/// Options for building a paginated document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DocumentOptions {
    /// Extraction caps.
    pub limits: ExtractLimits,
    /// Page budget.
    pub pagination: PaginationOptions,
    /// TOC generation.
    pub toc: TocOptions,
    /// Search highlighting.
    pub search: SearchOptions,
}

/// Builder for `DocumentOptions`.
#[derive(Clone, Debug, Default)]
pub struct DocumentBuilder {
    options: DocumentOptions,
}

impl DocumentBuilder {
    /// Start from default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the page budget in characters.
    pub fn with_budget(mut self, max_chars_per_page: usize) -> Self {
        self.options.pagination = PaginationOptions::with_budget(max_chars_per_page);
        self
    }

    /// Do not generate a TOC page.
    pub fn without_toc(mut self) -> Self {
        self.options.toc.enabled = false;
        self
    }

    /// Override TOC options.
    pub fn with_toc_options(mut self, toc: TocOptions) -> Self {
        self.options.toc = toc;
        self
    }

    /// Override extraction caps.
    pub fn with_limits(mut self, limits: ExtractLimits) -> Self {
        self.options.limits = limits;
        self
    }

    /// Override search highlighting.
    pub fn with_search_options(mut self, search: SearchOptions) -> Self {
        self.options.search = search;
        self
    }

    /// Finished options.
    pub fn options(self) -> DocumentOptions {
        self.options
    }

    /// Build a document from markup with these options.
    pub fn build(self, markup: &str) -> Result<PaginatedDocument, ReaderError> {
        PaginatedDocument::from_markup_with_options(markup, self.options)
    }
}

/// Page set, TOC and content stream for one loaded document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaginatedDocument {
    units: Vec<ContentUnit>,
    pages: Vec<Page>,
    toc: TableOfContents,
    options: DocumentOptions,
}

impl PaginatedDocument {
    /// Paginate markup with default options.
    ///
    /// # Example
    /// ```
    /// use mu_pager::PaginatedDocument;
    ///
    /// let doc = PaginatedDocument::from_markup("<h1>Start</h1><p>Hello</p>").unwrap();
    /// assert_eq!(doc.page_count(), 2); // TOC page + one content page
    /// assert_eq!(doc.toc()[0].target_page_index, 1);
    /// ```
    pub fn from_markup(markup: &str) -> Result<Self, ReaderError> {
        Self::from_markup_with_options(markup, DocumentOptions::default())
    }

    /// Paginate markup with explicit options.
    pub fn from_markup_with_options(
        markup: &str,
        options: DocumentOptions,
    ) -> Result<Self, ReaderError> {
        let extraction = extract_blocks_with_limits(markup, options.limits)?;
        let units = reattach_images(extraction);
        let pages = paginate(&units, options.pagination);
        let (pages, toc) = insert_toc(&units, pages, &options.toc);
        Ok(Self {
            units,
            pages,
            toc,
            options,
        })
    }

    /// Start a `DocumentBuilder`.
    pub fn builder() -> DocumentBuilder {
        DocumentBuilder::new()
    }

    /// All pages, TOC page first when enabled.
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// Page at `index`, if any.
    pub fn page(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }

    /// Number of pages including the TOC page.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Whether page 0 is the synthetic TOC page.
    pub fn has_toc_page(&self) -> bool {
        self.options.toc.enabled
    }

    /// TOC entries in document order.
    pub fn toc(&self) -> &[TocEntry] {
        &self.toc.entries
    }

    /// Full table of contents.
    pub fn table_of_contents(&self) -> &TableOfContents {
        &self.toc
    }

    /// Ordered content stream the pages were cut from.
    pub fn units(&self) -> &[ContentUnit] {
        &self.units
    }

    /// Number of content blocks.
    pub fn block_count(&self) -> usize {
        self.units.iter().filter(|u| u.block.is_some()).count()
    }

    /// Options the document was built with.
    pub fn options(&self) -> &DocumentOptions {
        &self.options
    }

    /// Filter pages by `query`; `None` when the query is blank.
    pub fn search(&self, query: &str) -> Option<SearchResults> {
        filter_pages(&self.pages, query, &self.options.search)
    }

    /// Page holding block `original_index`.
    pub fn page_of_block(&self, original_index: usize) -> Option<usize> {
        self.pages
            .iter()
            .position(|p| p.contains_block(original_index))
    }

    /// Concatenated markup of every content page, in order.
    pub fn content_markup(&self) -> String {
        self.pages
            .iter()
            .filter(|p| p.is_content())
            .map(|p| p.html.as_str())
            .collect()
    }
}
