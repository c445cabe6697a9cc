//! Layout data model: glyphs, rows, and the tables reconstructed from them.
//!
//! Coordinates follow the PDF convention: origin at the bottom-left of the
//! page, y grows upwards. A glyph's `(x, y)` is the bottom-left corner of its
//! bounding box.

use serde::{Deserialize, Serialize};

/// A positioned run of text on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Glyph {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// 0-indexed page the glyph belongs to.
    pub page: usize,
}

impl Glyph {
    pub fn new(text: impl Into<String>, x: f32, y: f32, width: f32, height: f32, page: usize) -> Self {
        Self {
            text: text.into(),
            x,
            y,
            width,
            height,
            page,
        }
    }

    /// Right edge of the glyph box.
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    /// Top edge of the glyph box.
    pub fn top(&self) -> f32 {
        self.y + self.height
    }
}

/// Glyphs sharing a baseline, ordered left-to-right.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub glyphs: Vec<Glyph>,
}

impl Row {
    /// Baseline of the row: the y of the glyph that opened it.
    pub fn y(&self) -> f32 {
        self.glyphs.first().map(|g| g.y).unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    /// Texts of the row's glyphs joined with a single space.
    pub fn text(&self) -> String {
        self.glyphs
            .iter()
            .map(|g| g.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Axis-aligned bounds of a table, in page units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl BoundingBox {
    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }
}

/// One addressed cell of a [`Table`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
    pub text: String,
}

/// A table reconstructed from a run of aligned rows.
///
/// Every cell address is unique and lies within `[0, rows) × [0, columns)`.
/// Tables are immutable once built; construct them through
/// [`crate::pipeline::tables::detect_tables`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// 0-indexed page the table was found on.
    pub page: usize,
    pub bbox: BoundingBox,
    pub rows: usize,
    pub columns: usize,
    /// Cells in row-major order.
    pub cells: Vec<Cell>,
    /// Rows joined by `\n`, cells within a row joined by `\t`.
    pub raw_text: String,
}

impl Table {
    /// Look up the cell at `(row, col)`; `None` for positions a short row never filled.
    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.cells.iter().find(|c| c.row == row && c.col == col)
    }

    /// Cell texts of one row, padded with empty strings up to `columns`.
    pub fn row_texts(&self, row: usize) -> Vec<&str> {
        (0..self.columns)
            .map(|col| self.cell(row, col).map(|c| c.text.as_str()).unwrap_or(""))
            .collect()
    }
}

/// Everything the document reader hands over for one page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageContent {
    /// 0-indexed page number.
    pub index: usize,
    pub glyphs: Vec<Glyph>,
    /// Plain concatenated page text, used verbatim in the prompt.
    pub text: String,
}

/// A bounded slice of the full text, analyzed by one model call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// 0-indexed position of the chunk in the source text.
    pub index: usize,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glyph_edges() {
        let g = Glyph::new("Total", 10.0, 700.0, 25.0, 9.0, 0);
        assert_eq!(g.right(), 35.0);
        assert_eq!(g.top(), 709.0);
    }

    #[test]
    fn row_text_and_baseline() {
        let row = Row {
            glyphs: vec![
                Glyph::new("Control", 10.0, 500.0, 30.0, 8.0, 0),
                Glyph::new("CC6.1", 60.0, 501.0, 20.0, 8.0, 0),
            ],
        };
        assert_eq!(row.y(), 500.0);
        assert_eq!(row.text(), "Control CC6.1");
        assert_eq!(Row::default().y(), 0.0);
    }

    #[test]
    fn row_texts_pads_short_rows() {
        let table = Table {
            page: 0,
            bbox: BoundingBox {
                min_x: 0.0,
                min_y: 0.0,
                max_x: 1.0,
                max_y: 1.0,
            },
            rows: 1,
            columns: 3,
            cells: vec![Cell {
                row: 0,
                col: 0,
                text: "A".into(),
            }],
            raw_text: "A".into(),
        };
        assert_eq!(table.row_texts(0), vec!["A", "", ""]);
        assert!(table.cell(0, 2).is_none());
    }
}
