//! Public entry points.
//!
//! ```text
//! PDF ─▶ reader ─▶ rows ─▶ tables ─▶ serialize ─┐
//!          │                                    ├─▶ document text ─▶ chunk ─▶ llm ─▶ merge
//!          └──────────── page text ─────────────┘
//! ```
//!
//! [`extract_tables`] is pure geometry and never calls a model.
//! [`analyze`] takes already-extracted text; [`analyze_document`] runs the
//! whole chain from a PDF path.

use crate::config::{AnalysisConfig, TableDetectionConfig};
use crate::document::{Glyph, PageContent, Table};
use crate::error::AnalysisError;
use crate::pipeline::transport::{resolve_transport, ModelTransport};
use crate::pipeline::{chunk, llm, reader, rows, serialize, tables};
use crate::progress::ProgressReporter;
use crate::prompts::page_marker;
use crate::record::{SourceInfo, StructuredRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Result of analysing a whole PDF.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentAnalysis {
    pub record: StructuredRecord,
    pub tables: Vec<Table>,
    pub page_count: usize,
}

/// Detect tables in a set of glyphs. Glyphs may span several pages; each
/// page is grouped and scanned on its own, in page order.
pub fn extract_tables(glyphs: &[Glyph], config: &TableDetectionConfig) -> Vec<Table> {
    let mut by_page: BTreeMap<usize, Vec<Glyph>> = BTreeMap::new();
    for glyph in glyphs {
        by_page.entry(glyph.page).or_default().push(glyph.clone());
    }

    by_page
        .into_iter()
        .flat_map(|(page, glyphs)| {
            let rows = rows::group_rows(&glyphs, config.row_tolerance);
            tables::detect_tables(&rows, page, config)
        })
        .collect()
}

/// Prompt text for a document: each page's text under a `--- Page N ---`
/// marker, followed by the detected-tables section when there is one.
pub fn build_document_text(pages: &[PageContent], tables: &[Table]) -> String {
    let mut text = pages
        .iter()
        .map(|p| format!("{}\n{}", page_marker(p.index + 1), p.text.trim_end()))
        .collect::<Vec<_>>()
        .join("\n\n");

    let section = serialize::serialize_tables(tables);
    if !section.is_empty() {
        text.push_str("\n\n");
        text.push_str(&section);
    }
    text
}

/// Analyse extracted text with the configured model.
///
/// # Errors
/// - [`AnalysisError::EmptyInput`] for blank text
/// - [`AnalysisError::ProviderNotConfigured`] when no transport can be resolved
/// - [`AnalysisError::Transport`] when a single-call analysis fails
/// - [`AnalysisError::NoValidResults`] when every chunk of a split analysis fails
pub async fn analyze(text: &str, config: &AnalysisConfig) -> Result<StructuredRecord, AnalysisError> {
    if text.trim().is_empty() {
        return Err(AnalysisError::EmptyInput);
    }
    let transport = resolve_transport(config)?;
    analyze_with_transport(transport.as_ref(), text, config).await
}

/// Like [`analyze`], with an explicit transport.
pub async fn analyze_with_transport(
    transport: &dyn ModelTransport,
    text: &str,
    config: &AnalysisConfig,
) -> Result<StructuredRecord, AnalysisError> {
    let progress = ProgressReporter::new(config.progress_callback.clone());
    progress.report(0, "Starting analysis");
    let record = run_analysis(transport, text, config, &progress, (0, 95)).await?;
    progress.report(100, "Analysis complete");
    Ok(record)
}

async fn run_analysis(
    transport: &dyn ModelTransport,
    text: &str,
    config: &AnalysisConfig,
    progress: &ProgressReporter,
    range: (u8, u8),
) -> Result<StructuredRecord, AnalysisError> {
    if text.trim().is_empty() {
        return Err(AnalysisError::EmptyInput);
    }

    let chunks = chunk::split_text(text, config.char_budget());
    if chunks.len() == 1 {
        info!(
            "Analyzing {} chars (~{} tokens) in a single call",
            text.chars().count(),
            chunk::estimate_tokens(text)
        );
        progress.report(range.0, "Analyzing document");
        let mut record = llm::analyze_chunk(transport, text, None, config).await?;
        record.source = SourceInfo {
            chunks_total: 1,
            chunks_analyzed: 1,
            chunks_skipped: 0,
        };
        progress.report(range.1, "Document analyzed");
        return Ok(record);
    }

    info!(
        "Input of ~{} tokens exceeds budget of {}; analyzing {} chunks",
        chunk::estimate_tokens(text),
        config.token_budget,
        chunks.len()
    );
    chunk::analyze_chunks(transport, &chunks, config, progress, range).await
}

/// Read a PDF and return its detected tables. No model is called.
pub async fn read_tables(
    pdf_path: impl AsRef<Path>,
    config: &AnalysisConfig,
) -> Result<Vec<Table>, AnalysisError> {
    let pages = reader::read_pages(pdf_path.as_ref(), config.password.as_deref()).await?;
    Ok(tables_for_pages(&pages, &config.tables))
}

fn tables_for_pages(pages: &[PageContent], config: &TableDetectionConfig) -> Vec<Table> {
    let glyphs: Vec<Glyph> = pages.iter().flat_map(|p| p.glyphs.iter().cloned()).collect();
    extract_tables(&glyphs, config)
}

/// Analyse a PDF end to end.
///
/// # Errors
/// Everything [`analyze`] returns, plus the reader's input errors
/// ([`AnalysisError::FileNotFound`], [`AnalysisError::NotAPdf`], password and
/// corruption errors).
pub async fn analyze_document(
    pdf_path: impl AsRef<Path>,
    config: &AnalysisConfig,
) -> Result<DocumentAnalysis, AnalysisError> {
    let pdf_path = pdf_path.as_ref();
    info!("Starting analysis: {}", pdf_path.display());
    let progress = ProgressReporter::new(config.progress_callback.clone());
    progress.report(0, "Reading PDF");

    let transport = resolve_transport(config)?;
    let pages = reader::read_pages(pdf_path, config.password.as_deref()).await?;
    progress.report(5, &format!("Read {} pages", pages.len()));

    let tables = tables_for_pages(&pages, &config.tables);
    info!("Detected {} tables across {} pages", tables.len(), pages.len());
    progress.report(10, &format!("Detected {} tables", tables.len()));

    let text = build_document_text(&pages, &tables);
    let record = run_analysis(transport.as_ref(), &text, config, &progress, (10, 95)).await?;
    progress.report(100, "Analysis complete");

    Ok(DocumentAnalysis {
        record,
        tables,
        page_count: pages.len(),
    })
}

/// Analyse PDF bytes held in memory.
///
/// pdfium needs a path, so the bytes go to a managed [`tempfile`] that is
/// removed when this returns.
pub async fn analyze_pdf_bytes(
    bytes: &[u8],
    config: &AnalysisConfig,
) -> Result<DocumentAnalysis, AnalysisError> {
    let mut tmp = tempfile::NamedTempFile::new()
        .map_err(|e| AnalysisError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .map_err(|e| AnalysisError::Internal(format!("tempfile write: {e}")))?;
    analyze_document(tmp.path(), config).await
}

/// Analyse a PDF and write the record as pretty JSON to `output_path`.
///
/// Uses atomic write (temp file + rename) so readers never see a partial file.
pub async fn analyze_to_file(
    pdf_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &AnalysisConfig,
) -> Result<DocumentAnalysis, AnalysisError> {
    let analysis = analyze_document(pdf_path, config).await?;
    let json = serde_json::to_string_pretty(&analysis.record)
        .map_err(|e| AnalysisError::Internal(format!("serialize record: {e}")))?;
    write_atomic(output_path.as_ref(), json.as_bytes()).await?;
    Ok(analysis)
}

/// Write `contents` to `path` via a sibling temp file and rename.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), AnalysisError> {
    let write_failed = |source: std::io::Error| AnalysisError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = std::path::PathBuf::from(tmp_name);

    tokio::fs::write(&tmp_path, contents).await.map_err(write_failed)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_failed)?;
    Ok(())
}

/// Synchronous wrapper around [`analyze_document`].
///
/// Creates a temporary tokio runtime internally.
pub fn analyze_document_sync(
    pdf_path: impl AsRef<Path>,
    config: &AnalysisConfig,
) -> Result<DocumentAnalysis, AnalysisError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| AnalysisError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(analyze_document(pdf_path, config))
}
