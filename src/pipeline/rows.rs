//! Row grouping: cluster a page's glyphs into visual text lines.
//!
//! A glyph joins the first open row whose opening glyph has a baseline
//! within `tolerance` of its own; otherwise it opens a new row. Rows are then
//! ordered top-of-page first (descending y, bottom-left origin) and each row
//! left-to-right. O(glyphs × rows), which is fine for a single page.

use crate::document::{Glyph, Row};
use std::cmp::Ordering;
use tracing::debug;

/// Group one page's unordered glyphs into ordered rows. Never fails; an
/// empty input yields no rows.
pub fn group_rows(glyphs: &[Glyph], tolerance: f32) -> Vec<Row> {
    let mut rows: Vec<Row> = Vec::new();

    for glyph in glyphs {
        match rows
            .iter_mut()
            .find(|row| (row.y() - glyph.y).abs() <= tolerance)
        {
            Some(row) => row.glyphs.push(glyph.clone()),
            None => rows.push(Row {
                glyphs: vec![glyph.clone()],
            }),
        }
    }

    rows.sort_by(|a, b| b.y().partial_cmp(&a.y()).unwrap_or(Ordering::Equal));
    for row in &mut rows {
        row.glyphs
            .sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(Ordering::Equal));
    }

    debug!("Grouped {} glyphs into {} rows", glyphs.len(), rows.len());
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn g(text: &str, x: f32, y: f32) -> Glyph {
        Glyph::new(text, x, y, 10.0, 8.0, 0)
    }

    #[test]
    fn empty_input_yields_no_rows() {
        assert!(group_rows(&[], 3.0).is_empty());
    }

    #[test]
    fn rows_are_top_down_and_left_to_right() {
        let glyphs = vec![
            g("b2", 50.0, 100.0),
            g("a1", 10.0, 200.0),
            g("b1", 10.0, 101.5),
            g("a2", 50.0, 199.0),
        ];
        let rows = group_rows(&glyphs, 3.0);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].text(), "a1 a2");
        assert_eq!(rows[1].text(), "b1 b2");
    }

    #[test]
    fn tolerance_is_measured_from_the_opening_glyph() {
        // 100 → 102.5 joins; 105 is 5 away from the opener and starts a new row
        // even though it is only 2.5 from the previous member.
        let glyphs = vec![g("a", 0.0, 100.0), g("b", 20.0, 102.5), g("c", 40.0, 105.0)];
        let rows = group_rows(&glyphs, 3.0);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].text(), "c");
        assert_eq!(rows[1].text(), "a b");
    }

    #[test]
    fn exact_tolerance_boundary_joins() {
        let glyphs = vec![g("a", 0.0, 100.0), g("b", 20.0, 103.0)];
        assert_eq!(group_rows(&glyphs, 3.0).len(), 1);
    }
}
