//! Table serialization: render detected tables as prompt-ready markup.
//!
//! The block is appended to the extracted page text so the model sees the
//! table structure that plain text extraction flattens away:
//!
//! ```text
//! === DETECTED TABLES ===
//!
//! [Table 1 | Page 3 | 4 rows × 3 columns]
//! <table>
//! <tr><th>Control</th><th>Test</th><th>Result</th></tr>
//! <tr><td>CC6.1</td><td>Inspected MFA</td><td>No exceptions</td></tr>
//! </table>
//!
//! === END DETECTED TABLES ===
//! ```
//!
//! The first row is rendered as the header row (`<th>`), the rest as data
//! rows (`<td>`). Short rows are padded with empty cells up to the column count.

use crate::document::Table;

/// Literal marker opening the tables section.
pub const TABLES_HEADER: &str = "=== DETECTED TABLES ===";

/// Literal marker closing the tables section.
pub const TABLES_FOOTER: &str = "=== END DETECTED TABLES ===";

/// Render one table with its identifier/page header. `number` is 1-indexed.
pub fn serialize_table(table: &Table, number: usize) -> String {
    let mut out = format!(
        "[Table {} | Page {} | {} rows × {} columns]\n<table>\n",
        number,
        table.page + 1,
        table.rows,
        table.columns
    );

    for row in 0..table.rows {
        let tag = if row == 0 { "th" } else { "td" };
        out.push_str("<tr>");
        for text in table.row_texts(row) {
            out.push_str(&format!("<{tag}>{}</{tag}>", escape(text)));
        }
        out.push_str("</tr>\n");
    }

    out.push_str("</table>\n");
    out
}

/// Render the whole tables section, or an empty string when there are no tables.
pub fn serialize_tables(tables: &[Table]) -> String {
    if tables.is_empty() {
        return String::new();
    }

    let body = tables
        .iter()
        .enumerate()
        .map(|(i, t)| serialize_table(t, i + 1))
        .collect::<Vec<_>>()
        .join("\n");

    format!("{TABLES_HEADER}\n\n{body}\n{TABLES_FOOTER}\n")
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{BoundingBox, Cell};

    fn table(rows: &[&[&str]], page: usize) -> Table {
        let columns = rows.iter().map(|r| r.len()).max().unwrap_or(0);
        let cells = rows
            .iter()
            .enumerate()
            .flat_map(|(r, row)| {
                row.iter().enumerate().map(move |(c, text)| Cell {
                    row: r,
                    col: c,
                    text: text.to_string(),
                })
            })
            .collect();
        Table {
            page,
            bbox: BoundingBox {
                min_x: 0.0,
                min_y: 0.0,
                max_x: 100.0,
                max_y: 100.0,
            },
            rows: rows.len(),
            columns,
            cells,
            raw_text: String::new(),
        }
    }

    #[test]
    fn header_row_uses_th() {
        let t = table(&[&["Control", "Result"], &["CC6.1", "Pass"]], 2);
        let out = serialize_table(&t, 1);
        assert!(out.starts_with("[Table 1 | Page 3 | 2 rows × 2 columns]\n<table>\n"));
        assert!(out.contains("<tr><th>Control</th><th>Result</th></tr>"));
        assert!(out.contains("<tr><td>CC6.1</td><td>Pass</td></tr>"));
        assert!(out.ends_with("</table>\n"));
    }

    #[test]
    fn short_rows_are_padded_and_text_escaped() {
        let t = table(&[&["A", "B", "C"], &["x < y & z"]], 0);
        let out = serialize_table(&t, 1);
        assert!(out.contains("<tr><td>x &lt; y &amp; z</td><td></td><td></td></tr>"));
    }

    #[test]
    fn section_markers_and_numbering() {
        let tables = vec![table(&[&["a"]], 0), table(&[&["b"]], 4)];
        let out = serialize_tables(&tables);
        assert!(out.starts_with(TABLES_HEADER));
        assert!(out.trim_end().ends_with(TABLES_FOOTER));
        assert!(out.contains("[Table 1 | Page 1 |"));
        assert!(out.contains("[Table 2 | Page 5 |"));
    }

    #[test]
    fn no_tables_no_section() {
        assert_eq!(serialize_tables(&[]), "");
    }
}
