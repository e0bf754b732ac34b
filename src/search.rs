//! Full-text page filtering with highlighting
//!
//! A page matches when its markup contains the query, ignoring case. Matched
//! pages are returned as highlighted copies; the source pages are never
//! modified, so clearing the query gives back exactly the original set.
//!
//! Highlights are only inserted in text between tags and never inside an
//! entity reference, so the copies stay well-formed.

extern crate alloc;

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use crate::paginate::{Page, PageKind};

/// Highlight markers and placeholder content
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchOptions {
    /// Markup inserted before each match.
    pub highlight_open: String,
    /// Markup inserted after each match.
    pub highlight_close: String,
    /// Body of the page shown when nothing matches.
    pub no_results_html: String,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            highlight_open: String::from("<mark class=\"search-highlight\">"),
            highlight_close: String::from("</mark>"),
            no_results_html: String::from("<p>No results found.</p>"),
        }
    }
}

/// Filtered view of a page set for one query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchResults {
    /// The query that produced this view.
    pub query: String,
    /// Highlighted matching pages, or a single no-results page.
    pub pages: Vec<Page>,
    /// Total highlighted occurrences across all pages.
    pub match_count: usize,
}

impl SearchResults {
    /// Whether any page matched.
    pub fn has_matches(&self) -> bool {
        self.pages.iter().any(|p| p.kind != PageKind::NoResults)
    }
}

/// Returns the query to search for, or `None` when it is blank.
pub fn active_query(query: &str) -> Option<&str> {
    if query.trim().is_empty() {
        None
    } else {
        Some(query)
    }
}

/// Filter `pages` down to those containing `query`.
///
/// Returns `None` for a blank query, meaning the unfiltered pages apply.
/// Matching pages keep their `page_index` so they still address the same
/// document page.
pub fn filter_pages(pages: &[Page], query: &str, options: &SearchOptions) -> Option<SearchResults> {
    let query = active_query(query)?;
    let needle: Vec<char> = query.chars().collect();

    let mut matched = Vec::new();
    let mut match_count = 0;
    for page in pages {
        if !contains_ignore_case(&page.html, &needle) {
            continue;
        }
        let (html, count) = highlight(&page.html, &needle, options);
        match_count += count;
        matched.push(Page {
            html,
            ..page.clone()
        });
    }

    if matched.is_empty() {
        matched = vec![Page {
            page_index: 0,
            kind: PageKind::NoResults,
            html: options.no_results_html.clone(),
            source_blocks: None,
        }];
    }

    Some(SearchResults {
        query: String::from(query),
        pages: matched,
        match_count,
    })
}

/// Whether `haystack` contains `needle`, ignoring case.
pub fn contains_ignore_case(haystack: &str, needle: &[char]) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack
        .char_indices()
        .any(|(i, _)| match_len_at(&haystack[i..], needle).is_some())
}

/// Wrap every case-insensitive occurrence of `needle` found in text runs.
/// Returns the new markup and the number of occurrences wrapped.
pub fn highlight(html: &str, needle: &[char], options: &SearchOptions) -> (String, usize) {
    let mut out = String::with_capacity(html.len() + 32);
    let mut count = 0;
    let mut text_start = 0;
    let mut rest_start = 0;

    while rest_start < html.len() {
        let rest = &html[rest_start..];
        let Some(ch) = rest.chars().next() else {
            break;
        };
        let opaque_len = match ch {
            '<' => rest.find('>').map(|end| end + 1),
            '&' => rest
                .find(';')
                .filter(|&end| end <= 12 && !rest[1..end].contains(char::is_whitespace))
                .map(|end| end + 1),
            _ => None,
        };
        match opaque_len {
            Some(len) => {
                count += highlight_text(&html[text_start..rest_start], needle, options, &mut out);
                out.push_str(&rest[..len]);
                rest_start += len;
                text_start = rest_start;
            }
            None => rest_start += ch.len_utf8(),
        }
    }
    count += highlight_text(&html[text_start..], needle, options, &mut out);
    (out, count)
}

fn highlight_text(text: &str, needle: &[char], options: &SearchOptions, out: &mut String) -> usize {
    if needle.is_empty() {
        out.push_str(text);
        return 0;
    }
    let mut count = 0;
    let mut copied = 0;
    let mut pos = 0;
    while pos < text.len() {
        match match_len_at(&text[pos..], needle) {
            Some(len) => {
                out.push_str(&text[copied..pos]);
                out.push_str(&options.highlight_open);
                out.push_str(&text[pos..pos + len]);
                out.push_str(&options.highlight_close);
                count += 1;
                pos += len;
                copied = pos;
            }
            None => {
                pos += text[pos..].chars().next().map_or(1, char::len_utf8);
            }
        }
    }
    out.push_str(&text[copied..]);
    count
}

/// Byte length of the match if `text` starts with `needle`, ignoring case.
fn match_len_at(text: &str, needle: &[char]) -> Option<usize> {
    let mut len = 0;
    let mut chars = text.chars();
    for &want in needle {
        let got = chars.next()?;
        if !chars_eq_ignore_case(got, want) {
            return None;
        }
        len += got.len_utf8();
    }
    Some(len)
}

fn chars_eq_ignore_case(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paginate::BlockRange;
    use alloc::string::ToString;

    fn page(index: usize, html: &str) -> Page {
        Page {
            page_index: index,
            kind: PageKind::Content,
            html: html.to_string(),
            source_blocks: Some(BlockRange::single(index)),
        }
    }

    fn needle(query: &str) -> Vec<char> {
        query.chars().collect()
    }

    #[test]
    fn test_blank_query_means_no_filter() {
        let pages = vec![page(0, "<p>a</p>")];
        assert!(filter_pages(&pages, "", &SearchOptions::default()).is_none());
        assert!(filter_pages(&pages, "   ", &SearchOptions::default()).is_none());
    }

    #[test]
    fn test_only_matching_pages_are_kept() {
        let pages: Vec<Page> = (0..6)
            .map(|i| {
                if i == 2 || i == 5 {
                    page(i, "<p>Here be a Dragon, a DRAGON.</p>")
                } else {
                    page(i, "<p>Nothing to see.</p>")
                }
            })
            .collect();
        let results = filter_pages(&pages, "dragon", &SearchOptions::default()).unwrap();
        assert_eq!(results.pages.len(), 2);
        assert_eq!(results.pages[0].page_index, 2);
        assert_eq!(results.pages[1].page_index, 5);
        assert_eq!(results.match_count, 4);
        assert_eq!(
            results.pages[0].html,
            "<p>Here be a <mark class=\"search-highlight\">Dragon</mark>, a \
             <mark class=\"search-highlight\">DRAGON</mark>.</p>"
        );
    }

    #[test]
    fn test_source_pages_are_not_mutated() {
        let pages = vec![page(0, "<p>dragon</p>")];
        let before = pages.clone();
        let _ = filter_pages(&pages, "dragon", &SearchOptions::default());
        assert_eq!(pages, before);
    }

    #[test]
    fn test_no_match_yields_single_placeholder() {
        let pages = vec![page(0, "<p>a</p>"), page(1, "<p>b</p>")];
        let results = filter_pages(&pages, "zebra", &SearchOptions::default()).unwrap();
        assert_eq!(results.pages.len(), 1);
        assert_eq!(results.pages[0].kind, PageKind::NoResults);
        assert_eq!(results.pages[0].html, "<p>No results found.</p>");
        assert!(!results.has_matches());
    }

    #[test]
    fn test_tags_are_not_highlighted() {
        let (html, count) = highlight(
            "<p class=\"p\">p</p>",
            &needle("p"),
            &SearchOptions::default(),
        );
        assert_eq!(count, 1);
        assert_eq!(
            html,
            "<p class=\"p\"><mark class=\"search-highlight\">p</mark></p>"
        );
    }

    #[test]
    fn test_entities_are_not_split() {
        let (html, count) = highlight("<p>a &amp; b</p>", &needle("amp"), &SearchOptions::default());
        assert_eq!(count, 0);
        assert_eq!(html, "<p>a &amp; b</p>");
    }

    #[test]
    fn test_markup_match_includes_page_without_highlight() {
        let pages = vec![page(0, "<p class=\"verse\">text</p>")];
        let results = filter_pages(&pages, "verse", &SearchOptions::default()).unwrap();
        assert!(results.has_matches());
        assert_eq!(results.match_count, 0);
        assert_eq!(results.pages[0].html, pages[0].html);
    }

    #[test]
    fn test_unicode_case_folding() {
        assert!(contains_ignore_case("<p>ÉCOLE</p>", &needle("école")));
        let (html, count) = highlight("Straße", &needle("STRASSE"), &SearchOptions::default());
        assert_eq!(count, 0);
        assert_eq!(html, "Straße");
    }

    #[test]
    fn test_query_with_regex_characters_is_literal() {
        let pages = vec![page(0, "<p>cost (USD)?</p>")];
        let results = filter_pages(&pages, "(usd)?", &SearchOptions::default()).unwrap();
        assert_eq!(results.match_count, 1);
    }

    #[test]
    fn test_custom_markers() {
        let options = SearchOptions {
            highlight_open: "[".to_string(),
            highlight_close: "]".to_string(),
            ..SearchOptions::default()
        };
        let (html, _) = highlight("ab ab", &needle("b"), &options);
        assert_eq!(html, "a[b] a[b]");
    }
}
