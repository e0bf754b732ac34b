//! Markup to content-block extraction
//!
//! Splits a book's markup into an ordered list of atomic blocks (headings,
//! paragraphs, list items, quotes) and a side list of images. Uses
//! quick_xml for SAX-style scanning and slices block markup straight out of
//! the input by byte offset, so every block keeps its exact source text.
//!
//! The scanner is lenient: end-tag names are not checked, stray end tags are
//! tolerated, HTML void elements are never treated as open containers and a
//! fragment quick_xml cannot tokenize is kept as text up to the next tag.
//! Anything it does not recognise outside a block is kept verbatim as an
//! [`BlockKind::Other`] block.

extern crate alloc;

use alloc::borrow::ToOwned;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

/// Structural role of a content block
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum BlockKind {
    /// Heading with level 1-6
    Heading(u8),
    /// Paragraph (`<p>`)
    Paragraph,
    /// List item (`<li>`)
    ListItem,
    /// Block quote (`<blockquote>`)
    Quote,
    /// Verbatim fragment: preformatted text, tables, rules, loose text
    Other,
}

impl BlockKind {
    /// Heading level, if this is a heading.
    pub fn heading_level(&self) -> Option<u8> {
        match self {
            BlockKind::Heading(level) => Some(*level),
            _ => None,
        }
    }
}

/// One atomic unit of content in document order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentBlock {
    /// Position in document order, contiguous from 0.
    pub original_index: usize,
    /// Structural role.
    pub kind: BlockKind,
    /// Source markup of the block with embedded images removed.
    pub markup: String,
}

impl ContentBlock {
    /// Whether this block is a heading.
    pub fn is_heading(&self) -> bool {
        matches!(self.kind, BlockKind::Heading(_))
    }

    /// Markup size in characters, the unit used for page budgets.
    pub fn char_len(&self) -> usize {
        self.markup.chars().count()
    }

    /// Visible text: tags stripped, entities resolved, whitespace collapsed.
    pub fn text(&self) -> String {
        plain_text(&self.markup)
    }
}

/// An image pulled out of the block stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageRef {
    /// Value of the `src` attribute (empty when absent).
    pub src: String,
    /// Source markup of the image element.
    pub markup: String,
    /// `original_index` of the block the image preceded; equals the block
    /// count for images with no following block.
    pub attached_before_index: usize,
}

/// Result of extracting one document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Blocks in document order.
    pub blocks: Vec<ContentBlock>,
    /// Images in document order.
    pub images: Vec<ImageRef>,
}

impl Extraction {
    /// Number of extracted blocks.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Iterate heading blocks in document order.
    pub fn headings(&self) -> impl Iterator<Item = &ContentBlock> {
        self.blocks.iter().filter(|b| b.is_heading())
    }
}

/// Hard caps applied while extracting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExtractLimits {
    /// Maximum accepted input size in bytes.
    pub max_input_bytes: usize,
    /// Maximum number of blocks produced.
    pub max_blocks: usize,
}

impl Default for ExtractLimits {
    fn default() -> Self {
        Self {
            max_input_bytes: 16 * 1024 * 1024,
            max_blocks: 200_000,
        }
    }
}

/// Error type for extraction failures
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExtractError {
    /// Input is empty or whitespace only
    Empty,
    /// Input contains no markup elements at all
    NotMarkup,
    /// Input exceeds `ExtractLimits::max_input_bytes`
    TooLarge {
        /// Input size in bytes.
        len: usize,
        /// Configured cap.
        max: usize,
    },
    /// Document exceeds `ExtractLimits::max_blocks`
    TooManyBlocks {
        /// Configured cap.
        max: usize,
    },
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractError::Empty => write!(f, "document is empty"),
            ExtractError::NotMarkup => write!(f, "document contains no markup"),
            ExtractError::TooLarge { len, max } => {
                write!(f, "document is {} bytes (limit {})", len, max)
            }
            ExtractError::TooManyBlocks { max } => {
                write!(f, "document has more than {} blocks", max)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ExtractError {}

/// Extract blocks and images from markup with default limits.
///
/// # Example
/// ```
/// use mu_pager::extract::{extract_blocks, BlockKind};
///
/// let doc = extract_blocks("<h1>One</h1><img src=\"a.png\"/><p>Two</p>").unwrap();
/// assert_eq!(doc.blocks.len(), 2);
/// assert_eq!(doc.blocks[0].kind, BlockKind::Heading(1));
/// assert_eq!(doc.images[0].attached_before_index, 1);
/// ```
pub fn extract_blocks(markup: &str) -> Result<Extraction, ExtractError> {
    extract_blocks_with_limits(markup, ExtractLimits::default())
}

/// Extract blocks and images from markup with explicit limits.
pub fn extract_blocks_with_limits(
    markup: &str,
    limits: ExtractLimits,
) -> Result<Extraction, ExtractError> {
    if markup.len() > limits.max_input_bytes {
        return Err(ExtractError::TooLarge {
            len: markup.len(),
            max: limits.max_input_bytes,
        });
    }
    if markup.trim().is_empty() {
        return Err(ExtractError::Empty);
    }

    let mut base = 0;
    let mut reader = lenient_reader(markup);
    let mut scan = Scanner::new(markup, limits);
    let mut saw_element = false;

    loop {
        let start = base + reader_offset(&reader);
        let event = reader.read_event();
        let end = base + reader_offset(&reader);
        match event {
            Ok(Event::Start(e)) => {
                saw_element = true;
                let name = element_name(&e);
                scan.on_start(&name, &e, start, end)?;
            }
            Ok(Event::Empty(e)) => {
                saw_element = true;
                let name = element_name(&e);
                scan.on_empty(&name, &e, start, end)?;
            }
            Ok(Event::End(e)) => {
                saw_element = true;
                let name = e.local_name().as_ref().to_ascii_lowercase();
                let name = String::from_utf8_lossy(&name).into_owned();
                scan.on_end(&name, start, end)?;
            }
            Ok(Event::Text(_)) | Ok(Event::CData(_)) | Ok(Event::GeneralRef(_)) => {
                scan.on_text(start, end);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {
                // Comments, declarations, doctype, processing instructions
            }
            Err(_) => {
                // Bytes up to the next tag are kept as text; scanning resumes there.
                let Some(first) = markup[start..].chars().next() else {
                    break;
                };
                let from = start + first.len_utf8();
                let resume = markup[from..].find('<').map_or(markup.len(), |i| from + i);
                scan.on_text(start, resume);
                if resume >= markup.len() {
                    break;
                }
                base = resume;
                reader = lenient_reader(&markup[base..]);
            }
        }
    }

    scan.finish(saw_element)
}

/// Strip tags, resolve entity references and collapse whitespace.
pub(crate) fn plain_text(markup: &str) -> String {
    let mut stripped = String::with_capacity(markup.len());
    let mut in_tag = false;
    for ch in markup.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => stripped.push(ch),
            _ => {}
        }
    }
    normalize_whitespace(&resolve_entities(&stripped))
}

/// Resolve `&name;` references one at a time, keeping unknown ones raw.
fn resolve_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let semi = tail.find(';').filter(|&i| i <= 12);
        match semi {
            Some(semi) => {
                let entity = &tail[..=semi];
                match unescape(entity) {
                    Ok(resolved) => out.push_str(&resolved),
                    Err(_) if entity == "&nbsp;" => out.push(' '),
                    Err(_) => out.push_str(entity),
                }
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Collapse runs of whitespace into single spaces and trim both ends.
fn normalize_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut prev_was_space = true;

    for ch in text.chars() {
        if ch.is_whitespace() {
            if !prev_was_space {
                result.push(' ');
                prev_was_space = true;
            }
        } else {
            result.push(ch);
            prev_was_space = false;
        }
    }

    if result.ends_with(' ') {
        result.pop();
    }

    result
}

/// How the scanner treats an element
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Role {
    /// Structural block selected for pagination
    Block(BlockKind),
    /// Element kept whole as an `Other` block
    Opaque,
    /// Wrapper whose tags are not content
    Container,
    /// Element skipped together with its children
    Skip,
    /// Image, pulled out into the side list
    Image,
    /// Thematic break, kept as its own `Other` block
    Rule,
    /// Line break, kept with the loose content around it
    Break,
    /// Metadata void element with no end tag
    Void,
    /// Anything else: inline formatting and unknown tags
    Inline,
}

fn classify(name: &str) -> Role {
    match name {
        "p" => Role::Block(BlockKind::Paragraph),
        "li" => Role::Block(BlockKind::ListItem),
        "blockquote" => Role::Block(BlockKind::Quote),
        "hr" => Role::Rule,
        h if h.len() == 2 && h.starts_with('h') => match h.as_bytes()[1] {
            level @ b'1'..=b'6' => Role::Block(BlockKind::Heading(level - b'0')),
            _ => Role::Inline,
        },
        "pre" | "table" | "dl" => Role::Opaque,
        "html" | "body" | "div" | "section" | "article" | "main" | "header" | "footer"
        | "nav" | "aside" | "figure" | "figcaption" | "ul" | "ol" | "center" | "hgroup"
        | "details" | "form" => Role::Container,
        "script" | "style" | "head" | "noscript" | "template" => Role::Skip,
        "img" => Role::Image,
        "br" | "wbr" => Role::Break,
        "meta" | "link" | "input" | "area" | "base" | "col" | "embed" | "source" | "track"
        | "param" => Role::Void,
        _ => Role::Inline,
    }
}

/// Byte range excised from a unit's markup (an embedded image)
type Excision = (usize, usize);

/// Block currently open on the element stack
struct OpenBlock {
    kind: BlockKind,
    index: usize,
    start: usize,
    /// Stack length right after the block element was pushed.
    depth: usize,
    excised: Vec<Excision>,
}

/// Run of loose content outside any block
struct LooseSpan {
    start: usize,
    end: usize,
    excised: Vec<Excision>,
}

struct Scanner<'a> {
    input: &'a str,
    limits: ExtractLimits,
    stack: Vec<String>,
    skip: Option<(String, usize)>,
    open: Option<OpenBlock>,
    loose: Option<LooseSpan>,
    pending_images: Vec<(String, String)>,
    blocks: Vec<ContentBlock>,
    images: Vec<ImageRef>,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str, limits: ExtractLimits) -> Self {
        Self {
            input,
            limits,
            stack: Vec::new(),
            skip: None,
            open: None,
            loose: None,
            pending_images: Vec::new(),
            blocks: Vec::new(),
            images: Vec::new(),
        }
    }

    fn on_start(
        &mut self,
        name: &str,
        e: &BytesStart<'_>,
        start: usize,
        end: usize,
    ) -> Result<(), ExtractError> {
        if let Some((skip_name, depth)) = self.skip.as_mut() {
            if skip_name == name {
                *depth += 1;
            }
            return Ok(());
        }

        match classify(name) {
            Role::Skip => {
                if self.open.is_none() {
                    self.flush_loose()?;
                }
                self.skip = Some((name.to_string(), 1));
            }
            Role::Image => self.on_image(e, start, end),
            Role::Rule => self.on_rule(start, end)?,
            Role::Break => {
                if self.open.is_none() {
                    self.extend_loose(start, end);
                }
            }
            Role::Void => self.extend_loose_if_active(end),
            Role::Block(kind) => {
                self.begin_block(name, kind, start)?;
            }
            Role::Opaque => {
                self.begin_block(name, BlockKind::Other, start)?;
            }
            Role::Container => {
                if self.open.is_none() {
                    self.flush_loose()?;
                }
                self.stack.push(name.to_string());
            }
            Role::Inline => {
                self.stack.push(name.to_string());
                if self.open.is_none() {
                    self.extend_loose(start, end);
                }
            }
        }
        Ok(())
    }

    fn on_empty(
        &mut self,
        name: &str,
        e: &BytesStart<'_>,
        start: usize,
        end: usize,
    ) -> Result<(), ExtractError> {
        if self.skip.is_some() {
            return Ok(());
        }

        match classify(name) {
            Role::Image => self.on_image(e, start, end),
            Role::Rule => self.on_rule(start, end)?,
            Role::Block(kind) => {
                if self.begin_block(name, kind, start)? {
                    self.close_block(end);
                }
            }
            Role::Opaque => {
                if self.begin_block(name, BlockKind::Other, start)? {
                    self.close_block(end);
                }
            }
            Role::Break | Role::Inline => {
                if self.open.is_none() {
                    self.extend_loose(start, end);
                }
            }
            _ => self.extend_loose_if_active(end),
        }
        Ok(())
    }

    fn on_end(&mut self, name: &str, start: usize, end: usize) -> Result<(), ExtractError> {
        if let Some((skip_name, depth)) = self.skip.as_mut() {
            if skip_name == name {
                *depth -= 1;
                if *depth == 0 {
                    self.skip = None;
                }
            }
            return Ok(());
        }

        let pos = self.stack.iter().rposition(|open| open == name);

        if let Some(block_depth) = self.open.as_ref().map(|b| b.depth) {
            match pos {
                Some(p) if p + 1 == block_depth => {
                    self.stack.truncate(p);
                    self.close_block(end);
                }
                Some(p) if p + 1 < block_depth => {
                    // An enclosing element closed first: the block ends here.
                    self.stack.truncate(p);
                    self.close_block(trim_end_offset(self.input, start));
                }
                Some(p) => self.stack.truncate(p),
                None => {}
            }
            return Ok(());
        }

        match pos {
            Some(p) => {
                self.stack.truncate(p);
                if classify(name) == Role::Container {
                    // Loose text never spans a container boundary.
                    self.flush_loose()?;
                } else {
                    self.extend_loose_if_active(end);
                }
            }
            None => self.extend_loose_if_active(end),
        }
        Ok(())
    }

    fn on_text(&mut self, start: usize, end: usize) {
        if self.skip.is_some() || self.open.is_some() {
            return;
        }
        if self.input[start..end].trim().is_empty() {
            return;
        }
        self.extend_loose(start, end);
    }

    fn on_image(&mut self, e: &BytesStart<'_>, start: usize, end: usize) {
        let src = attribute(e, "src").unwrap_or_default();
        let markup = self.input[start..end].to_owned();
        if let Some(block) = self.open.as_mut() {
            block.excised.push((start, end));
            self.images.push(ImageRef {
                src,
                markup,
                attached_before_index: block.index,
            });
            return;
        }
        if let Some(loose) = self.loose.as_mut() {
            loose.excised.push((start, end));
        }
        self.pending_images.push((src, markup));
    }

    fn on_rule(&mut self, start: usize, end: usize) -> Result<(), ExtractError> {
        if self.open.is_some() {
            return Ok(());
        }
        self.flush_loose()?;
        let markup = self.input[start..end].to_owned();
        self.push_block(BlockKind::Other, markup)?;
        Ok(())
    }

    /// Open a block, implicitly closing the current one where HTML would.
    /// Returns false when the element nests inside the current block.
    fn begin_block(
        &mut self,
        name: &str,
        kind: BlockKind,
        start: usize,
    ) -> Result<bool, ExtractError> {
        if let Some(open) = self.open.as_ref() {
            let closes_current = match open.kind {
                BlockKind::Paragraph | BlockKind::Heading(_) => true,
                BlockKind::ListItem => {
                    name == "li"
                        && !self.stack[open.depth..]
                            .iter()
                            .any(|el| el == "ul" || el == "ol")
                }
                _ => false,
            };
            if !closes_current {
                self.stack.push(name.to_string());
                return Ok(false);
            }
            let depth = open.depth;
            self.stack.truncate(depth - 1);
            self.close_block(trim_end_offset(self.input, start));
        }

        self.flush_loose()?;
        let index = self.reserve_index()?;
        self.stack.push(name.to_string());
        self.open = Some(OpenBlock {
            kind,
            index,
            start,
            depth: self.stack.len(),
            excised: Vec::new(),
        });
        Ok(true)
    }

    fn close_block(&mut self, end: usize) {
        if let Some(open) = self.open.take() {
            let markup = slice_excising(self.input, open.start, end, &open.excised);
            self.blocks.push(ContentBlock {
                original_index: open.index,
                kind: open.kind,
                markup,
            });
            if self.stack.len() >= open.depth {
                self.stack.truncate(open.depth - 1);
            }
        }
    }

    fn extend_loose(&mut self, start: usize, end: usize) {
        match self.loose.as_mut() {
            Some(loose) => loose.end = end,
            None => {
                self.loose = Some(LooseSpan {
                    start,
                    end,
                    excised: Vec::new(),
                })
            }
        }
    }

    fn extend_loose_if_active(&mut self, end: usize) {
        if self.open.is_none() {
            if let Some(loose) = self.loose.as_mut() {
                loose.end = end;
            }
        }
    }

    fn flush_loose(&mut self) -> Result<(), ExtractError> {
        if let Some(loose) = self.loose.take() {
            let markup = slice_excising(self.input, loose.start, loose.end, &loose.excised);
            if !markup.trim().is_empty() {
                self.push_block(BlockKind::Other, markup)?;
            }
        }
        Ok(())
    }

    /// Claim the next block index and hand it to images waiting for one.
    fn reserve_index(&mut self) -> Result<usize, ExtractError> {
        let index = self.blocks.len();
        if index >= self.limits.max_blocks {
            return Err(ExtractError::TooManyBlocks {
                max: self.limits.max_blocks,
            });
        }
        for (src, markup) in self.pending_images.drain(..) {
            self.images.push(ImageRef {
                src,
                markup,
                attached_before_index: index,
            });
        }
        Ok(index)
    }

    fn push_block(&mut self, kind: BlockKind, markup: String) -> Result<(), ExtractError> {
        let index = self.reserve_index()?;
        self.blocks.push(ContentBlock {
            original_index: index,
            kind,
            markup,
        });
        Ok(())
    }

    fn finish(mut self, saw_element: bool) -> Result<Extraction, ExtractError> {
        if self.open.is_some() {
            self.close_block(trim_end_offset(self.input, self.input.len()));
        }
        self.flush_loose()?;

        if !saw_element {
            return Err(ExtractError::NotMarkup);
        }

        let trailing = self.blocks.len();
        for (src, markup) in self.pending_images.drain(..) {
            self.images.push(ImageRef {
                src,
                markup,
                attached_before_index: trailing,
            });
        }

        Ok(Extraction {
            blocks: self.blocks,
            images: self.images,
        })
    }
}

/// Copy `input[start..end]`, leaving out excised ranges inside it.
fn slice_excising(input: &str, start: usize, end: usize, excised: &[Excision]) -> String {
    let mut out = String::with_capacity(end.saturating_sub(start));
    let mut cursor = start;
    for &(cut_start, cut_end) in excised {
        if cut_start < cursor || cut_end > end {
            continue;
        }
        out.push_str(&input[cursor..cut_start]);
        cursor = cut_end;
    }
    out.push_str(&input[cursor..end.max(cursor)]);
    out
}

/// Offset of `end` with trailing whitespace before it removed.
fn trim_end_offset(input: &str, end: usize) -> usize {
    input[..end].trim_end().len()
}

/// Reader configured for HTML: no end-name checks, stray end tags allowed.
fn lenient_reader(input: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(input);
    let config = reader.config_mut();
    config.trim_text(false);
    config.expand_empty_elements = false;
    config.check_end_names = false;
    config.allow_unmatched_ends = true;
    reader
}

fn reader_offset(reader: &Reader<&[u8]>) -> usize {
    usize::try_from(reader.buffer_position()).unwrap_or(usize::MAX)
}

/// Lowercased local element name (namespace prefix dropped)
fn element_name(e: &BytesStart<'_>) -> String {
    let name = e.local_name();
    String::from_utf8_lossy(name.as_ref()).to_ascii_lowercase()
}

/// Extract a named attribute value, tolerating HTML-style attributes
fn attribute(e: &BytesStart<'_>, name: &str) -> Option<String> {
    for attr in e.html_attributes().flatten() {
        if attr.key.local_name().as_ref().eq_ignore_ascii_case(name.as_bytes()) {
            let raw = String::from_utf8_lossy(&attr.value);
            return Some(resolve_entities(&raw));
        }
    }
    None
}
