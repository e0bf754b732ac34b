//! Re-inserting extracted images into the block stream
//!
//! Pairs every block with the images that preceded it in the source and
//! yields the ordered content stream the paginator consumes. The merge is
//! pure: block markup is never touched and repeated image sources are each
//! re-inserted.

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

use crate::extract::{ContentBlock, Extraction, ImageRef};

/// Atomic pagination unit: one block plus the images placed before it.
///
/// The final unit may carry images only, when images trail the last block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentUnit {
    /// Images to render immediately before the block, in source order.
    pub images: Vec<ImageRef>,
    /// The block, or `None` for the trailing image-only unit.
    pub block: Option<ContentBlock>,
}

impl ContentUnit {
    /// `original_index` of the unit's block, if any.
    pub fn block_index(&self) -> Option<usize> {
        self.block.as_ref().map(|b| b.original_index)
    }

    /// Serialized markup: images first, then the block.
    pub fn markup(&self) -> String {
        let mut out = String::with_capacity(self.byte_len());
        self.write_markup(&mut out);
        out
    }

    /// Append serialized markup to `out`.
    pub fn write_markup(&self, out: &mut String) {
        for image in &self.images {
            out.push_str(&image.markup);
        }
        if let Some(block) = &self.block {
            out.push_str(&block.markup);
        }
    }

    /// Size of the serialized markup in characters.
    pub fn char_len(&self) -> usize {
        self.images
            .iter()
            .map(|i| i.markup.chars().count())
            .sum::<usize>()
            + self.block.as_ref().map_or(0, |b| b.char_len())
    }

    fn byte_len(&self) -> usize {
        self.images.iter().map(|i| i.markup.len()).sum::<usize>()
            + self.block.as_ref().map_or(0, |b| b.markup.len())
    }
}

/// Merge images back in front of the blocks they preceded.
///
/// Images whose `attached_before_index` is at or past the block count form a
/// trailing image-only unit. Stable ordering is kept for images sharing a
/// target.
pub fn reattach_images(extraction: Extraction) -> Vec<ContentUnit> {
    let Extraction { blocks, images } = extraction;
    let block_count = blocks.len();

    let mut slots: Vec<Vec<ImageRef>> = Vec::with_capacity(block_count + 1);
    slots.resize_with(block_count + 1, Vec::new);
    for image in images {
        let slot = image.attached_before_index.min(block_count);
        slots[slot].push(image);
    }

    let trailing = slots.pop().unwrap_or_default();
    let mut units: Vec<ContentUnit> = blocks
        .into_iter()
        .zip(slots)
        .map(|(block, images)| ContentUnit {
            images,
            block: Some(block),
        })
        .collect();

    if !trailing.is_empty() {
        units.push(ContentUnit {
            images: trailing,
            block: None,
        });
    }
    units
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{extract_blocks, BlockKind};
    use alloc::string::ToString;
    use alloc::vec;

    fn image(src: &str, before: usize) -> ImageRef {
        ImageRef {
            src: src.to_string(),
            markup: format!("<img src=\"{}\"/>", src),
            attached_before_index: before,
        }
    }

    fn block(index: usize, markup: &str) -> ContentBlock {
        ContentBlock {
            original_index: index,
            kind: BlockKind::Paragraph,
            markup: markup.to_string(),
        }
    }

    #[test]
    fn test_images_land_before_their_block() {
        let extraction = Extraction {
            blocks: vec![block(0, "<p>a</p>"), block(1, "<p>b</p>")],
            images: vec![image("x", 1)],
        };
        let units = reattach_images(extraction);
        assert_eq!(units.len(), 2);
        assert!(units[0].images.is_empty());
        assert_eq!(units[1].markup(), "<img src=\"x\"/><p>b</p>");
    }

    #[test]
    fn test_same_target_keeps_source_order() {
        let extraction = Extraction {
            blocks: vec![block(0, "<p>a</p>")],
            images: vec![image("first", 0), image("second", 0)],
        };
        let units = reattach_images(extraction);
        assert_eq!(
            units[0].markup(),
            "<img src=\"first\"/><img src=\"second\"/><p>a</p>"
        );
    }

    #[test]
    fn test_repeated_sources_are_not_deduplicated() {
        let extraction = Extraction {
            blocks: vec![block(0, "<p>a</p>"), block(1, "<p>b</p>")],
            images: vec![image("same", 0), image("same", 1)],
        };
        let units = reattach_images(extraction);
        let total: usize = units.iter().map(|u| u.images.len()).sum();
        assert_eq!(total, 2);
    }

    #[test]
    fn test_trailing_images_form_final_unit() {
        let extraction = Extraction {
            blocks: vec![block(0, "<p>a</p>")],
            images: vec![image("end", 1)],
        };
        let units = reattach_images(extraction);
        assert_eq!(units.len(), 2);
        assert_eq!(units[1].block_index(), None);
        assert_eq!(units[1].markup(), "<img src=\"end\"/>");
    }

    #[test]
    fn test_block_markup_is_untouched() {
        let doc = extract_blocks("<p>one</p><img src=\"i\"/><h2>two</h2>").unwrap();
        let blocks = doc.blocks.clone();
        let units = reattach_images(doc);
        for (unit, original) in units.iter().zip(&blocks) {
            assert_eq!(unit.block.as_ref(), Some(original));
        }
    }

    #[test]
    fn test_char_len_counts_images_and_block() {
        let extraction = Extraction {
            blocks: vec![block(0, "<p>é</p>")],
            images: vec![image("x", 0)],
        };
        let units = reattach_images(extraction);
        assert_eq!(units[0].char_len(), "<img src=\"x\"/>".len() + 8);
    }
}
