//! Turning OCR text blocks back into page text.
//!
//! We support two strategies. [`columns`] is the one we index with; it tries
//! to recover multi-column reading order. [`groups`] is older and simpler,
//! and is mostly useful for eyeballing OCR output on the command line.

use clap::{Args, ValueEnum};

use crate::ocr::TextBlock;

pub mod columns;
pub mod groups;

/// How to reconstruct page text.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LayoutStrategy {
    /// Column-major reading order. See [`columns`].
    Columns {
        merge_distance: f64,
        line_distance: f64,
    },

    /// Neighbor grouping. See [`groups`].
    Groups { epsilon_x: i32, epsilon_y: i32 },
}

impl Default for LayoutStrategy {
    fn default() -> Self {
        Self::Columns {
            merge_distance: columns::DEFAULT_MERGE_DISTANCE,
            line_distance: columns::DEFAULT_LINE_DISTANCE,
        }
    }
}

impl LayoutStrategy {
    /// Reconstruct the text of a page from its blocks.
    pub fn reconstruct(&self, blocks: &[TextBlock]) -> String {
        match *self {
            Self::Columns {
                merge_distance,
                line_distance,
            } => columns::reconstruct(blocks, merge_distance, line_distance),
            Self::Groups {
                epsilon_x,
                epsilon_y,
            } => groups::reconstruct(blocks, epsilon_x, epsilon_y),
        }
    }
}

/// Which [`LayoutStrategy`] to use, as a command-line value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LayoutKind {
    /// Column-major reading order.
    #[default]
    Columns,

    /// Neighbor grouping.
    Groups,
}

/// Command-line options for text reconstruction.
#[derive(Args, Clone, Debug)]
pub struct LayoutOpts {
    /// How to put OCR text blocks back in reading order.
    #[clap(long = "layout", value_enum, default_value_t = LayoutKind::default())]
    pub kind: LayoutKind,

    /// Blocks whose left edges are closer than this (in pixels) share a column.
    #[clap(long, default_value_t = columns::DEFAULT_MERGE_DISTANCE)]
    pub merge_distance: f64,

    /// Blocks whose tops are this close (in pixels) are on the same line.
    #[clap(long, default_value_t = columns::DEFAULT_LINE_DISTANCE)]
    pub line_distance: f64,

    /// For `--layout groups`: maximum horizontal offset between neighbors.
    #[clap(long, default_value_t = groups::DEFAULT_EPSILON_X)]
    pub epsilon_x: i32,

    /// For `--layout groups`: maximum vertical gap between neighbors.
    #[clap(long, default_value_t = groups::DEFAULT_EPSILON_Y)]
    pub epsilon_y: i32,
}

impl LayoutOpts {
    /// Build the strategy these options describe.
    pub fn to_strategy(&self) -> LayoutStrategy {
        match self.kind {
            LayoutKind::Columns => LayoutStrategy::Columns {
                merge_distance: self.merge_distance,
                line_distance: self.line_distance,
            },
            LayoutKind::Groups => LayoutStrategy::Groups {
                epsilon_x: self.epsilon_x,
                epsilon_y: self.epsilon_y,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox;

    #[test]
    fn strategies_differ_on_side_by_side_text() {
        let blocks = [
            TextBlock::new("a", BoundingBox::new(0, 20, 0, 50)),
            TextBlock::new("b", BoundingBox::new(0, 20, 60, 100)),
        ];
        assert_eq!(LayoutStrategy::default().reconstruct(&blocks), "a b\n");
        let groups = LayoutStrategy::Groups {
            epsilon_x: 5,
            epsilon_y: 200,
        };
        assert_eq!(groups.reconstruct(&blocks), "a\n\nb\n\n");
    }
}
