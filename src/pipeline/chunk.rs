//! Chunk coordination: split oversized text, analyse chunks one after
//! another, merge the partial records.
//!
//! ## Splitting
//!
//! Chunks are contiguous slices of the input, so concatenating them gives
//! back the original text exactly. Boundaries are chosen coarsest first:
//! blank-line paragraphs are packed into a chunk until the next one would
//! overflow the budget; a single paragraph over budget is re-packed by
//! sentences, a sentence by words, and a word by characters. Every chunk is
//! therefore within budget. Sizes are counted in characters, not bytes.
//!
//! ## Merging
//!
//! Finding lists are concatenated in chunk order; the first chunk with a
//! specified executive summary provides it; each category is deduplicated by
//! declared identifier, keeping the first occurrence. Findings without a
//! declared identifier are never treated as duplicates, and neither are the
//! labels the text fallback makes up: those restart in every chunk, so
//! extracted findings are renumbered across the merge instead.

use crate::config::AnalysisConfig;
use crate::document::Chunk;
use crate::error::{AnalysisError, TransportError};
use crate::pipeline::{fallback, llm};
use crate::pipeline::transport::ModelTransport;
use crate::progress::ProgressReporter;
use crate::record::{Confidence, FindingCategory, ParseMethod, SourceInfo, StructuredRecord};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use tracing::{info, warn};

/// Characters per token used to turn token budgets into character budgets.
pub const CHARS_PER_TOKEN: usize = 4;

/// Rough token count of `text`.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

// ── Splitting ────────────────────────────────────────────────────────────

static PARAGRAPH_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t\r]*\n\s*").unwrap());
static SENTENCE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[.!?]["')\]]*\s+"#).unwrap());
static WORD_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Granularity {
    Paragraph,
    Sentence,
    Word,
    Char,
}

impl Granularity {
    fn finer(self) -> Option<Self> {
        match self {
            Granularity::Paragraph => Some(Granularity::Sentence),
            Granularity::Sentence => Some(Granularity::Word),
            Granularity::Word => Some(Granularity::Char),
            Granularity::Char => None,
        }
    }

    /// Contiguous segments covering `text`, each ending after its separator.
    fn segments(self, text: &str) -> Vec<&str> {
        let re = match self {
            Granularity::Paragraph => &*PARAGRAPH_BREAK,
            Granularity::Sentence => &*SENTENCE_BREAK,
            Granularity::Word => &*WORD_BREAK,
            Granularity::Char => {
                return text
                    .char_indices()
                    .map(|(i, c)| &text[i..i + c.len_utf8()])
                    .collect()
            }
        };

        let mut segments = Vec::new();
        let mut last = 0;
        for m in re.find_iter(text) {
            if m.end() > last {
                segments.push(&text[last..m.end()]);
                last = m.end();
            }
        }
        if last < text.len() {
            segments.push(&text[last..]);
        }
        segments
    }
}

/// Split `text` into chunks of at most `max_chars` characters.
///
/// Text within budget comes back as a single chunk equal to the input.
pub fn split_text(text: &str, max_chars: usize) -> Vec<Chunk> {
    let max_chars = max_chars.max(1);
    let pieces = if text.chars().count() <= max_chars {
        vec![text]
    } else {
        let mut pieces = Vec::new();
        pack(text, max_chars, Granularity::Paragraph, &mut pieces);
        pieces
    };

    pieces
        .into_iter()
        .enumerate()
        .map(|(index, t)| Chunk {
            index,
            text: t.to_string(),
        })
        .collect()
}

fn pack<'a>(text: &'a str, max_chars: usize, level: Granularity, out: &mut Vec<&'a str>) {
    let mut start = 0;
    let mut cursor = 0;
    let mut current = 0;

    for segment in level.segments(text) {
        let len = segment.chars().count();
        if current > 0 && current + len > max_chars {
            out.push(&text[start..cursor]);
            start = cursor;
            current = 0;
        }

        if len > max_chars {
            match level.finer() {
                Some(finer) => pack(segment, max_chars, finer, out),
                None => out.push(segment),
            }
            start = cursor + segment.len();
        } else {
            current += len;
        }
        cursor += segment.len();
    }

    if start < text.len() {
        out.push(&text[start..]);
    }
}

// ── Per-chunk execution ──────────────────────────────────────────────────

/// A chunk whose analysis call failed and was skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkFailure {
    /// 0-based chunk index.
    pub index: usize,
    pub error: TransportError,
}

/// Analyse chunks sequentially and merge the results.
///
/// Failed chunks are logged, reported to the progress callback and skipped.
/// Progress moves from `start` to `end` as chunks complete.
pub(crate) async fn analyze_chunks(
    transport: &dyn ModelTransport,
    chunks: &[Chunk],
    config: &AnalysisConfig,
    progress: &ProgressReporter,
    (start, end): (u8, u8),
) -> Result<StructuredRecord, AnalysisError> {
    let total = chunks.len();
    let mut partials = Vec::with_capacity(total);
    let mut failures = Vec::new();

    for chunk in chunks {
        let number = chunk.index + 1;
        progress.report_fraction(start, end, chunk.index, total, &format!("Analyzing chunk {number}/{total}"));

        match llm::analyze_chunk(transport, &chunk.text, Some((number, total)), config).await {
            Ok(record) => partials.push(record),
            Err(error) => {
                warn!("Chunk {}/{} failed, skipping: {}", number, total, error);
                progress.chunk_error(number, total, &error.to_string());
                failures.push(ChunkFailure {
                    index: chunk.index,
                    error,
                });
            }
        }
        progress.report_fraction(start, end, number, total, &format!("Chunk {number}/{total} done"));
    }

    merge(partials, &failures)
}

// ── Merging ──────────────────────────────────────────────────────────────

/// Merge per-chunk records in chunk order.
///
/// Fails with [`AnalysisError::NoValidResults`] when no chunk produced a record.
pub fn merge(
    partials: Vec<StructuredRecord>,
    failures: &[ChunkFailure],
) -> Result<StructuredRecord, AnalysisError> {
    let chunks_total = partials.len() + failures.len();
    if partials.is_empty() {
        let first_error = failures
            .first()
            .map(|f| format!("chunk {}: {}", f.index + 1, f.error))
            .unwrap_or_else(|| "no chunks were analyzed".to_string());
        return Err(AnalysisError::NoValidResults {
            chunks: chunks_total,
            first_error,
        });
    }

    let mut merged = StructuredRecord {
        parse_method: ParseMethod::Merged,
        confidence: lowest_confidence(&partials),
        source: SourceInfo {
            chunks_total,
            chunks_analyzed: partials.len(),
            chunks_skipped: failures.len(),
        },
        ..StructuredRecord::default()
    };

    if let Some(summary) = partials
        .iter()
        .map(|p| &p.executive_summary)
        .find(|s| s.is_specified())
    {
        merged.executive_summary = summary.clone();
    }

    for category in FindingCategory::ALL {
        let mut seen: HashSet<String> = HashSet::new();
        let mut dropped = 0usize;
        let mut extracted = 0usize;
        let target = merged.findings_mut(category);
        for partial in &partials {
            let declared = partial.parse_method.declares_ids();
            for finding in partial.findings(category) {
                if declared && finding.has_declared_id() && !seen.insert(finding.id.clone()) {
                    dropped += 1;
                    continue;
                }
                let mut finding = finding.clone();
                if partial.parse_method == ParseMethod::NaturalLanguage {
                    extracted += 1;
                    finding.id = fallback::synthetic_id(category, extracted);
                }
                target.push(finding);
            }
        }
        if dropped > 0 {
            info!("Dropped {} duplicate {} entries", dropped, category.key());
        }
    }

    info!(
        "Merged {}/{} chunks: {} control failures, {} exclusions, {} carve-outs",
        merged.source.chunks_analyzed,
        chunks_total,
        merged.control_failures.len(),
        merged.exclusions.len(),
        merged.carve_outs.len()
    );
    Ok(merged)
}

/// The weakest confidence among the partials; a merge is only as sure as
/// its least certain chunk.
fn lowest_confidence(partials: &[StructuredRecord]) -> Confidence {
    let rank = |c: Confidence| match c {
        Confidence::High => 3,
        Confidence::Medium => 2,
        Confidence::Low => 1,
        Confidence::Unknown => 0,
    };
    partials
        .iter()
        .map(|p| p.confidence)
        .min_by_key(|c| rank(*c))
        .unwrap_or_default()
}
