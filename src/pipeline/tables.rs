//! Table detection: find runs of aligned rows and turn them into [`Table`]s.
//!
//! ## Row test
//!
//! A row is tabular when it has at least `min_cols` glyphs *and* the gaps
//! between consecutive glyph x-origins are regular: at least
//! `gap_consistency` of the gaps must lie within `gap_deviation` (relative)
//! of the mean gap. Prose has irregular word spacing and fails; aligned
//! columns pass.
//!
//! ## Runs
//!
//! Rows are scanned top-down. Two consecutive tabular rows open a run, which
//! extends while rows stay tabular. A run of at least `min_rows` rows becomes
//! a [`TableCandidate`]; scanning resumes after the run, so candidates never
//! overlap.
//!
//! ## Cell placement
//!
//! Cells are addressed by `(row within the run, ordinal within the row)`.
//! Columns are *not* aligned across rows by x-position: a row with a blank
//! leading column shifts all its cells left. The heuristic favours
//! precision; a missed table costs less downstream than a false one.

use crate::config::TableDetectionConfig;
use crate::document::{BoundingBox, Cell, Row, Table};
use tracing::debug;

/// A run of consecutive tabular rows, `start..end` (end exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableCandidate {
    pub start: usize,
    pub end: usize,
}

impl TableCandidate {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// Whether a single row looks like a table row.
pub fn is_table_row(row: &Row, config: &TableDetectionConfig) -> bool {
    if row.len() < config.min_cols {
        return false;
    }

    let gaps: Vec<f32> = row.glyphs.windows(2).map(|w| w[1].x - w[0].x).collect();
    let mean = gaps.iter().sum::<f32>() / gaps.len() as f32;
    if mean <= f32::EPSILON {
        return false;
    }

    let consistent = gaps
        .iter()
        .filter(|gap| ((*gap - mean) / mean).abs() <= config.gap_deviation)
        .count();
    consistent as f32 / gaps.len() as f32 >= config.gap_consistency
}

/// Find non-overlapping runs of tabular rows at least `min_rows` long.
pub fn find_candidates(rows: &[Row], config: &TableDetectionConfig) -> Vec<TableCandidate> {
    let tabular: Vec<bool> = rows.iter().map(|r| is_table_row(r, config)).collect();
    let mut candidates = Vec::new();
    let mut i = 0;

    while i + 1 < rows.len() {
        if !(tabular[i] && tabular[i + 1]) {
            i += 1;
            continue;
        }

        let mut end = i + 2;
        while end < rows.len() && tabular[end] {
            end += 1;
        }

        let candidate = TableCandidate { start: i, end };
        if candidate.len() >= config.min_rows {
            candidates.push(candidate);
        } else {
            debug!("Discarding {}-row run at row {}", candidate.len(), i);
        }
        i = end;
    }

    candidates
}

/// Build a table from a candidate, or `None` when it is under the size thresholds.
pub fn materialize(
    rows: &[Row],
    candidate: TableCandidate,
    page: usize,
    config: &TableDetectionConfig,
) -> Option<Table> {
    let members = rows.get(candidate.start..candidate.end)?;
    let row_count = members.len();
    let columns = members.iter().map(Row::len).max().unwrap_or(0);
    if row_count < config.min_rows || columns < config.min_cols {
        return None;
    }

    let mut bbox = BoundingBox {
        min_x: f32::MAX,
        min_y: f32::MAX,
        max_x: f32::MIN,
        max_y: f32::MIN,
    };
    let mut cells = Vec::new();
    let mut lines = Vec::with_capacity(row_count);

    for (r, row) in members.iter().enumerate() {
        for (c, glyph) in row.glyphs.iter().enumerate() {
            bbox.min_x = bbox.min_x.min(glyph.x);
            bbox.min_y = bbox.min_y.min(glyph.y);
            bbox.max_x = bbox.max_x.max(glyph.right());
            bbox.max_y = bbox.max_y.max(glyph.y);
            cells.push(Cell {
                row: r,
                col: c,
                text: glyph.text.clone(),
            });
        }
        lines.push(
            row.glyphs
                .iter()
                .map(|g| g.text.as_str())
                .collect::<Vec<_>>()
                .join("\t"),
        );
    }

    Some(Table {
        page,
        bbox,
        rows: row_count,
        columns,
        cells,
        raw_text: lines.join("\n"),
    })
}

/// Detect every table among one page's rows.
pub fn detect_tables(rows: &[Row], page: usize, config: &TableDetectionConfig) -> Vec<Table> {
    let tables: Vec<Table> = find_candidates(rows, config)
        .into_iter()
        .filter_map(|c| materialize(rows, c, page, config))
        .collect();

    if !tables.is_empty() {
        debug!("Page {}: {} tables detected", page + 1, tables.len());
    }
    tables
}
