//! Neighbor grouping: a simpler layout strategy with no notion of columns.
//!
//! Blocks are sorted top to bottom, then each unused block in turn seeds a
//! group and pulls in every later unused block that sits right above or
//! below it with the same left edge. This is good enough for pulling the text
//! out of a single receipt, and it's what `ocr` and `text` used to print.

use crate::{geometry::BoundingBox, ocr::TextBlock};

/// Default maximum horizontal offset between left edges in a group.
pub const DEFAULT_EPSILON_X: i32 = 5;

/// Default maximum vertical gap between neighbors in a group.
pub const DEFAULT_EPSILON_Y: i32 = 200;

/// A group of neighboring blocks.
#[derive(Debug)]
pub struct TextGroup<'a> {
    pub blocks: Vec<&'a TextBlock>,
}

impl TextGroup<'_> {
    /// The smallest box containing every block in the group.
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::union(self.blocks.iter().map(|b| &b.bounding_box)).unwrap_or_default()
    }
}

/// Group neighboring blocks.
pub fn group_blocks(blocks: &[TextBlock], epsilon_x: i32, epsilon_y: i32) -> Vec<TextGroup<'_>> {
    let mut sorted = blocks
        .iter()
        .map(|block| (block, block.bounding_box.normalized()))
        .collect::<Vec<_>>();
    sorted.sort_by(|(_, a), (_, b)| a.top.cmp(&b.top).then(a.left.cmp(&b.left)));
    let (sorted, boxes): (Vec<_>, Vec<_>) = sorted.into_iter().unzip();

    let mut used = vec![false; sorted.len()];
    let mut groups = vec![];
    for seed in 0..sorted.len() {
        if used[seed] {
            continue;
        }
        used[seed] = true;
        let mut group = vec![sorted[seed]];
        for candidate in (seed + 1)..sorted.len() {
            if !used[candidate] && boxes[seed].is_neighbor(&boxes[candidate], epsilon_x, epsilon_y)
            {
                used[candidate] = true;
                group.push(sorted[candidate]);
            }
        }
        groups.push(TextGroup { blocks: group });
    }
    groups
}

/// Reconstruct page text, one block per line and a blank line after each
/// group.
pub fn reconstruct(blocks: &[TextBlock], epsilon_x: i32, epsilon_y: i32) -> String {
    let mut output = String::new();
    for group in group_blocks(blocks, epsilon_x, epsilon_y) {
        tracing::trace!(bounding_box = ?group.bounding_box(), len = group.blocks.len(), "Text group");
        for block in &group.blocks {
            output.push_str(&block.text);
            output.push('\n');
        }
        output.push('\n');
    }
    output
}
