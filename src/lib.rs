//! # soc-lens
//!
//! Extract tables and structured findings from SOC 1 / SOC 2 assurance
//! reports with a large language model.
//!
//! ## Why this crate?
//!
//! Plain PDF text extraction flattens the tests-of-controls tables that
//! carry most of a SOC report's findings, and models asked for JSON do not
//! always return JSON. This crate rebuilds tables from glyph geometry before
//! prompting, and recovers a typed [`StructuredRecord`] from whatever the
//! model returns: wrapped in prose, fenced, truncated, or not JSON at all.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Read       glyphs + page text via pdfium (spawn_blocking)
//!  ├─ 2. Tables     rows by baseline, runs of evenly spaced rows → tables
//!  ├─ 3. Prompt     page-marked text + === DETECTED TABLES === section
//!  ├─ 4. Chunk      split over the token budget, analyse chunks in order
//!  ├─ 5. Model      one call per chunk, timeout + retry/backoff
//!  ├─ 6. Recover    envelope → text → JSON strategies → prose fallback → stub
//!  └─ 7. Merge      first summary wins, findings deduplicated by id
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use soc_lens::{analyze_document, AnalysisConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = AnalysisConfig::default();
//!     let analysis = analyze_document("soc2-type2.pdf", &config).await?;
//!     let summary = &analysis.record.executive_summary;
//!     println!("{} audited by {}: {:?}", summary.service_organization, summary.auditor, summary.opinion);
//!     for f in &analysis.record.control_failures {
//!         println!("{} (pages {:?}): {}", f.id, f.evidence_pages, f.description);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Failure model
//!
//! An unparseable response is never an error: it comes back as a record
//! with [`ParseMethod::Stub`] and low confidence. Errors are reserved for
//! "could not complete at all": unreadable input, no provider, a failed
//! single call, or every chunk failing ([`AnalysisError::NoValidResults`]).
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `soc-lens` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! soc-lens = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod document;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod record;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{
    analyze, analyze_document, analyze_document_sync, analyze_pdf_bytes, analyze_to_file,
    analyze_with_transport, build_document_text, extract_tables, read_tables, DocumentAnalysis,
};
pub use config::{AnalysisConfig, AnalysisConfigBuilder, TableDetectionConfig};
pub use document::{BoundingBox, Cell, Chunk, Glyph, PageContent, Row, Table};
pub use error::{AnalysisError, TransportError};
pub use pipeline::transport::{HttpTransport, ModelRequest, ModelTransport, ProviderTransport};
pub use progress::{AnalysisProgressCallback, NoopProgressCallback, ProgressCallback};
pub use record::{
    Confidence, ExecutiveSummary, Finding, FindingCategory, Opinion, ParseMethod, Severity,
    SourceInfo, StructuredRecord,
};
