//! Column-major reading order.
//!
//! OCR services return text blocks in whatever order they like. To get
//! something a human (or a regex) can read, we:
//!
//! 1. Cluster blocks into columns by their left edge.
//! 2. Order the blocks in each column into lines, top to bottom, and left to
//!    right within a line.
//! 3. Order the columns the same way, using each column's first block.
//! 4. Join blocks on the same line with a space, and separate lines with a
//!    blank line.
//!
//! This is a heuristic. It works well for letters and invoices, which are
//! mostly one or two columns of left-aligned text, and badly for tables.
//!
//! The clustering is greedy, but we run it over blocks sorted by position, so
//! the output depends only on the geometry and never on the order the OCR
//! service happened to return the blocks in.

use std::cmp::Ordering;

use crate::{geometry::BoundingBox, ocr::TextBlock};

/// Default maximum distance between a block's left edge and a column's key.
pub const DEFAULT_MERGE_DISTANCE: f64 = 150.0;

/// Default maximum distance between the tops of two blocks on the same line.
pub const DEFAULT_LINE_DISTANCE: f64 = 10.0;

/// A cluster of blocks that share a left edge, more or less.
#[derive(Debug)]
pub struct Column<'a> {
    /// The left edge of the block that opened this column.
    pub key: i32,

    /// Blocks in reading order, once [`Column::sort_blocks`] has been called.
    pub blocks: Vec<(&'a TextBlock, BoundingBox)>,
}

impl<'a> Column<'a> {
    /// The bounding box of the first block in reading order.
    fn leading_box(&self) -> BoundingBox {
        self.blocks[0].1
    }

    /// Put our blocks in reading order.
    fn sort_blocks(&mut self, line_distance: f64) {
        let blocks = std::mem::take(&mut self.blocks);
        self.blocks = order_into_lines(blocks, |(_, bb)| *bb, line_distance);
    }
}

/// Reconstruct the reading-order text of a page.
pub fn reconstruct(blocks: &[TextBlock], merge_distance: f64, line_distance: f64) -> String {
    let columns = columns(blocks, merge_distance, line_distance);

    let mut output = String::new();
    for column in &columns {
        let mut previous: Option<&BoundingBox> = None;
        for (block, bb) in &column.blocks {
            if let Some(prev) = previous {
                if (prev.top_distance(bb) as f64) < line_distance {
                    output.push(' ');
                } else {
                    output.push_str("\n\n");
                }
            }
            output.push_str(&block.text);
            previous = Some(bb);
        }
        output.push('\n');
    }
    output
}

/// Cluster `blocks` into columns and put everything in reading order.
pub fn columns(blocks: &[TextBlock], merge_distance: f64, line_distance: f64) -> Vec<Column<'_>> {
    // Sort by position first, so the greedy clustering below always sees the
    // blocks in the same order. Text is the final tie-breaker for blocks with
    // identical boxes.
    let mut sorted = blocks
        .iter()
        .map(|block| (block, block.bounding_box.normalized()))
        .collect::<Vec<_>>();
    sorted.sort_by(|(a, a_bb), (b, b_bb)| {
        (a_bb.left, a_bb.top, a_bb.bottom, a_bb.right, &a.text).cmp(&(
            b_bb.left,
            b_bb.top,
            b_bb.bottom,
            b_bb.right,
            &b.text,
        ))
    });

    // Blocks arrive with increasing left edges, and each column is keyed by
    // the left edge of the block that opened it. So the only column a block
    // can join is the most recently opened one.
    let mut columns: Vec<Column<'_>> = vec![];
    for (block, bb) in sorted {
        match columns.last_mut() {
            Some(column) if ((bb.left - column.key).abs() as f64) < merge_distance => {
                column.blocks.push((block, bb));
            }
            _ => columns.push(Column {
                key: bb.left,
                blocks: vec![(block, bb)],
            }),
        }
    }

    for column in &mut columns {
        column.sort_blocks(line_distance);
    }
    order_into_lines(columns, Column::leading_box, line_distance)
}

/// Sort items into reading order: top to bottom, and left to right within a
/// line.
///
/// A line starts at the topmost remaining item and takes in every item whose
/// top is within `line_distance` of it. Comparing "is it on the same line?"
/// pairwise isn't transitive, so we can't hand it to `sort_by` directly.
fn order_into_lines<T>(
    mut items: Vec<T>,
    bounding_box: impl Fn(&T) -> BoundingBox,
    line_distance: f64,
) -> Vec<T> {
    items.sort_by(|a, b| by_top_then_left(&bounding_box(a), &bounding_box(b)));

    let mut ordered = Vec::with_capacity(items.len());
    let mut line: Vec<T> = vec![];
    let mut line_start: Option<BoundingBox> = None;
    for item in items {
        let bb = bounding_box(&item);
        match line_start {
            Some(start) if start.same_line(&bb, line_distance) => {}
            _ => {
                flush_line(&mut line, &mut ordered, &bounding_box);
                line_start = Some(bb);
            }
        }
        line.push(item);
    }
    flush_line(&mut line, &mut ordered, &bounding_box);
    ordered
}

/// Sort one line left to right and append it to `ordered`.
fn flush_line<T>(line: &mut Vec<T>, ordered: &mut Vec<T>, bounding_box: &impl Fn(&T) -> BoundingBox) {
    line.sort_by(|a, b| {
        let (a, b) = (bounding_box(a), bounding_box(b));
        a.left.cmp(&b.left).then(a.top.cmp(&b.top))
    });
    ordered.append(line);
}

fn by_top_then_left(a: &BoundingBox, b: &BoundingBox) -> Ordering {
    a.top.cmp(&b.top).then(a.left.cmp(&b.left))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn block(text: &str, top: i32, left: i32) -> TextBlock {
        TextBlock::new(text, BoundingBox::new(top, top + 20, left, left + 80))
    }

    fn reconstruct_default(blocks: &[TextBlock]) -> String {
        reconstruct(blocks, DEFAULT_MERGE_DISTANCE, DEFAULT_LINE_DISTANCE)
    }

    #[test]
    fn distant_left_edges_make_separate_columns() {
        let blocks = [block("a", 0, 0), block("b", 0, 200)];
        let columns = columns(&blocks, 150.0, 10.0);
        assert_eq!(columns.len(), 2);
        assert_eq!(reconstruct(&blocks, 150.0, 10.0), "a\nb\n");
    }

    #[test]
    fn close_left_edges_share_a_column() {
        let blocks = [block("a", 0, 0), block("b", 0, 100)];
        let columns = columns(&blocks, 150.0, 10.0);
        assert_eq!(columns.len(), 1);
        assert_eq!(reconstruct(&blocks, 150.0, 10.0), "a b\n");
    }

    #[test]
    fn nearby_tops_are_joined_with_a_space() {
        let blocks = [block("Hello", 0, 0), block("world", 5, 90)];
        assert_eq!(reconstruct(&blocks, 150.0, 10.0), "Hello world\n");
    }

    #[test]
    fn distant_tops_get_a_paragraph_break() {
        let blocks = [block("Hello", 0, 0), block("world", 50, 0)];
        assert_eq!(reconstruct(&blocks, 150.0, 10.0), "Hello\n\nworld\n");
    }

    #[test]
    fn same_line_is_read_left_to_right() {
        let blocks = [
            block("third", 40, 0),
            block("second", 2, 100),
            block("first", 0, 10),
        ];
        assert_eq!(reconstruct_default(&blocks), "first second\n\nthird\n");
    }

    #[test]
    fn side_by_side_columns_read_left_to_right() {
        let blocks = [
            block("Right top", 0, 600),
            block("Left top", 3, 0),
            block("Right bottom", 100, 600),
            block("Left bottom", 100, 0),
        ];
        assert_eq!(
            reconstruct_default(&blocks),
            "Left top\n\nLeft bottom\nRight top\n\nRight bottom\n"
        );
    }

    #[test]
    fn offset_columns_read_top_to_bottom() {
        let blocks = [block("Footer", 900, 0), block("Header", 0, 600)];
        assert_eq!(reconstruct_default(&blocks), "Header\nFooter\n");
    }

    #[test]
    fn output_ignores_input_order() {
        let mut blocks = vec![
            block("Muster AG", 0, 0),
            block("Bahnhofstrasse 1", 30, 5),
            block("8001 Zürich", 60, 3),
            block("Rechnung", 200, 400),
            block("Datum: 01.02.2024", 230, 410),
            block("Betrag", 400, 140),
        ];
        let expected = reconstruct_default(&blocks);
        blocks.reverse();
        assert_eq!(reconstruct_default(&blocks), expected);
        blocks.swap(0, 3);
        blocks.swap(1, 4);
        assert_eq!(reconstruct_default(&blocks), expected);
    }

    #[test]
    fn columns_chain_from_their_first_block() {
        // 0 opens a column; 100 joins it; 200 is too far from the key (0), even
        // though it's close to 100.
        let blocks = [block("a", 0, 0), block("b", 50, 100), block("c", 100, 200)];
        let columns = columns(&blocks, 150.0, 10.0);
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].key, 0);
        assert_eq!(columns[1].key, 200);
    }

    #[test]
    fn tolerates_inverted_boxes() {
        let blocks = [
            TextBlock::new("upside", BoundingBox::new(20, 0, 80, 0)),
            block("down", 50, 0),
        ];
        assert_eq!(reconstruct_default(&blocks), "upside\n\ndown\n");
    }

    #[test]
    fn empty_page_is_empty_text() {
        assert_eq!(reconstruct_default(&[]), "");
    }
}
