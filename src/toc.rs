//! Table of contents built from heading blocks
//!
//! Headings are matched to the page whose block range holds them, then a
//! synthetic TOC page is inserted at index 0 and every content page shifts
//! up by one. Stored page numbers always count that TOC page.

extern crate alloc;

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Write;

use quick_xml::escape::escape;

use crate::paginate::{Page, PageKind};
use crate::reattach::ContentUnit;

/// One entry in the table of contents
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TocEntry {
    /// Heading text.
    pub title: String,
    /// Heading level (1-6).
    pub level: u8,
    /// Page holding the heading, in TOC-shifted numbering.
    pub target_page_index: usize,
}

/// TOC configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TocOptions {
    /// Whether a TOC page is generated at all.
    pub enabled: bool,
    /// Deepest heading level listed.
    pub max_heading_level: u8,
    /// Heading shown on the TOC page.
    pub title: String,
}

impl Default for TocOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            max_heading_level: 6,
            title: String::from("Table of Contents"),
        }
    }
}

/// Entries derived from a document's heading blocks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableOfContents {
    /// TOC entries in document order.
    pub entries: Vec<TocEntry>,
}

impl TableOfContents {
    /// Check if the TOC has any entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Index of the last entry whose target is at or before `page_index`.
    pub fn entry_for_page(&self, page_index: usize) -> Option<usize> {
        self.entries
            .iter()
            .rposition(|e| e.target_page_index <= page_index && e.target_page_index > 0)
    }
}

/// Build TOC entries and prepend the TOC page.
///
/// `pages` must be the paginator output for `units`. When the TOC is
/// disabled the pages are returned unchanged with no entries.
pub fn insert_toc(
    units: &[ContentUnit],
    mut pages: Vec<Page>,
    options: &TocOptions,
) -> (Vec<Page>, TableOfContents) {
    if !options.enabled {
        return (pages, TableOfContents { entries: Vec::new() });
    }

    let mut entries = Vec::new();
    for block in units.iter().filter_map(|u| u.block.as_ref()) {
        let Some(level) = block.kind.heading_level() else {
            continue;
        };
        if level > options.max_heading_level {
            continue;
        }
        let Some(page) = page_for_block(&pages, block.original_index) else {
            continue;
        };
        entries.push(TocEntry {
            title: block.text(),
            level,
            target_page_index: page + 1,
        });
    }

    for page in &mut pages {
        page.page_index += 1;
    }
    pages.insert(
        0,
        Page {
            page_index: 0,
            kind: PageKind::Toc,
            html: render_toc_html(&options.title, &entries),
            source_blocks: None,
        },
    );

    (pages, TableOfContents { entries })
}

/// Position of the page containing block `index`, by binary search over
/// the ordered, non-overlapping block ranges.
fn page_for_block(pages: &[Page], index: usize) -> Option<usize> {
    let pos = pages.partition_point(|p| match p.source_blocks {
        Some(range) => range.last < index,
        None => false,
    });
    pages[pos..]
        .iter()
        .position(|p| p.contains_block(index))
        .map(|offset| pos + offset)
}

fn render_toc_html(title: &str, entries: &[TocEntry]) -> String {
    let mut html = format!("<div class=\"toc\"><h1>{}</h1>", escape(title));
    for (i, entry) in entries.iter().enumerate() {
        let _ = write!(
            html,
            "<p data-page=\"{}\" data-level=\"{}\">{}. {}</p>",
            entry.target_page_index,
            entry.level,
            i + 1,
            escape(entry.title.as_str())
        );
    }
    html.push_str("</div>");
    html
}
