//! Last-resort extraction when the model output contains no usable JSON.
//!
//! ## Natural-language extraction
//!
//! Summary fields are pulled with ordered, label-anchored patterns
//! (`Service Organization: …`, `Auditor: …`, `for the period …`). Findings
//! come from a sentence scan: a sentence mentioning a category keyword becomes
//! a low-confidence finding in that category, with evidence pages taken from
//! explicit `page N` mentions or from the nearest preceding page marker.
//!
//! ## Stub
//!
//! When even that finds nothing, [`stub_record`] preserves a preview of the
//! raw response so the caller can see what the model said.

use crate::record::{
    Confidence, ExecutiveSummary, Finding, FindingCategory, Opinion, ParseMethod, Severity,
    StructuredRecord,
};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Confidence marker carried by stub records and their single entry.
pub const STUB_CONFIDENCE: Confidence = Confidence::Low;

/// Identifier of the stub record's single entry.
pub const STUB_FINDING_ID: &str = "UNPARSED-RESPONSE";

/// Characters of raw response kept in the stub preview.
pub const PREVIEW_CHARS: usize = 500;

/// Cap on natural-language findings per category.
pub const MAX_NL_FINDINGS: usize = 10;

const MAX_SENTENCE_CHARS: usize = 500;

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
}

static SERVICE_ORG_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?im)^[\s*#>\-]*service[\s_]+organi[sz]ation(?:[\s_]+name)?\**\s*[:\-–]\s*(.+?)\s*$",
        r"(?im)^[\s*#>\-]*(?:company|organi[sz]ation)(?:\s+name)?\**\s*[:\-–]\s*(.+?)\s*$",
    ])
});

static AUDITOR_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?im)^[\s*#>\-]*(?:independent\s+)?(?:service\s+)?auditor(?:'s)?(?:\s+name)?\**\s*[:\-–]\s*(.+?)\s*$",
        r"(?im)^[\s*#>\-]*audit(?:ing)?\s+firm\**\s*[:\-–]\s*(.+?)\s*$",
    ])
});

static PERIOD_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?im)^[\s*#>\-]*(?:report(?:ing)?\s+|review\s+|audit\s+)?period(?:\s+covered)?\**\s*[:\-–]\s*(.+?)\s*$",
        r"(?i)\bfor\s+the\s+period\s+(?:from\s+)?([a-z]+\s+\d{1,2},?\s+\d{4}\s+(?:to|through)\s+[a-z]+\s+\d{1,2},?\s+\d{4})",
        r"(?i)\bas\s+of\s+([a-z]+\s+\d{1,2},?\s+\d{4})",
    ])
});

static REPORT_TYPE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[r"(?i)\b(SOC\s*[123](?:\s*,?\s*Type\s*(?:II|I|2|1)\b)?)"])
});

static OPINION_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[\s*#>\-]*(?:auditor'?s?\s+)?opinion(?:\s+type)?\**\s*[:\-–]\s*(.+?)\s*$").unwrap()
});

/// Keyword scan used when no opinion label is present. Order matters:
/// `unqualified` must win over its substring `qualified`.
static OPINION_KEYWORDS: Lazy<Vec<(Regex, Opinion)>> = Lazy::new(|| {
    vec![
        (Regex::new(r"(?i)\b(?:unqualified|unmodified)\s+opinion\b").unwrap(), Opinion::Unqualified),
        (Regex::new(r"(?i)\badverse\s+opinion\b").unwrap(), Opinion::Adverse),
        (Regex::new(r"(?i)\bdisclaim(?:er|s|ed)?\b(?:\s+of)?\s+(?:an\s+)?opinion\b").unwrap(), Opinion::Disclaimer),
        (Regex::new(r"(?i)\bqualified\s+opinion\b").unwrap(), Opinion::Qualified),
    ]
});

static NEGATED_FINDING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bno\s+(?:exceptions?|deviations?|deficienc(?:y|ies)|control\s+failures?)\b").unwrap()
});

static PAGE_MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:page|p\.)\s*(\d{1,4})\b").unwrap());

static PAGE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^--- Page (\d+) ---\s*$").unwrap());

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

fn keywords(category: FindingCategory) -> &'static [&'static str] {
    match category {
        FindingCategory::ControlFailure => &[
            "control failure",
            "exception noted",
            "exceptions noted",
            "exception was noted",
            "deviation",
            "not operating effectively",
            "did not operate effectively",
            "deficienc",
        ],
        FindingCategory::Exclusion => &[
            "exclusion",
            "excluded",
            "out of scope",
            "outside the scope",
            "not included in the scope",
        ],
        FindingCategory::CarveOut => &[
            "carve-out",
            "carve out",
            "carved out",
            "carved-out",
            "subservice organization",
        ],
    }
}

/// Pull a low-confidence record out of prose. `None` when nothing was found.
pub fn extract_natural_language(text: &str) -> Option<StructuredRecord> {
    let mut record = StructuredRecord {
        executive_summary: extract_summary(text),
        confidence: Confidence::Low,
        parse_method: ParseMethod::NaturalLanguage,
        ..StructuredRecord::default()
    };

    let markers: Vec<(usize, u32)> = PAGE_MARKER
        .captures_iter(text)
        .filter_map(|caps| {
            let pos = caps.get(0)?.start();
            caps[1].parse().ok().map(|page| (pos, page))
        })
        .collect();

    for (offset, sentence) in sentences(text) {
        if NEGATED_FINDING.is_match(sentence) {
            continue;
        }
        let lower = sentence.to_lowercase();
        let Some(category) = FindingCategory::ALL
            .into_iter()
            .find(|c| keywords(*c).iter().any(|k| lower.contains(k)))
        else {
            continue;
        };

        let description = tidy(sentence);
        let findings = record.findings_mut(category);
        if findings.len() >= MAX_NL_FINDINGS || findings.iter().any(|f| f.description == description) {
            continue;
        }

        let mut evidence_pages: Vec<u32> = Vec::new();
        for page in PAGE_MENTION
            .captures_iter(sentence)
            .filter_map(|caps| caps[1].parse::<u32>().ok())
        {
            if page > 0 && !evidence_pages.contains(&page) {
                evidence_pages.push(page);
            }
        }
        if evidence_pages.is_empty() {
            if let Some((_, page)) = markers.iter().rev().find(|(pos, _)| *pos <= offset) {
                evidence_pages.push(*page);
            }
        }

        let id = synthetic_id(category, findings.len() + 1);
        findings.push(Finding {
            id,
            description,
            severity: Severity::Unknown,
            evidence_pages,
            confidence: Confidence::Low,
        });
    }

    if record.is_empty() {
        return None;
    }
    debug!(
        "Natural-language extraction: {} control failures, {} exclusions, {} carve-outs",
        record.control_failures.len(),
        record.exclusions.len(),
        record.carve_outs.len()
    );
    Some(record)
}

fn extract_summary(text: &str) -> ExecutiveSummary {
    let mut summary = ExecutiveSummary::default();
    if let Some(v) = first_capture(&SERVICE_ORG_PATTERNS, text) {
        summary.service_organization = v;
    }
    if let Some(v) = first_capture(&AUDITOR_PATTERNS, text) {
        summary.auditor = v;
    }
    if let Some(v) = first_capture(&PERIOD_PATTERNS, text) {
        summary.report_period = v;
    }
    if let Some(v) = first_capture(&REPORT_TYPE_PATTERNS, text) {
        summary.report_type = WHITESPACE.replace_all(&v, " ").into_owned();
    }

    summary.opinion = OPINION_LABEL
        .captures(text)
        .map(|caps| Opinion::from_text(&caps[1]))
        .filter(|o| *o != Opinion::Unknown)
        .or_else(|| {
            OPINION_KEYWORDS
                .iter()
                .find(|(re, _)| re.is_match(text))
                .map(|(_, opinion)| *opinion)
        })
        .unwrap_or_default();

    summary
}

fn first_capture(patterns: &[Regex], text: &str) -> Option<String> {
    patterns.iter().find_map(|re| {
        re.captures(text)
            .map(|caps| caps[1].trim_matches(|c: char| c == '*' || c.is_whitespace()).to_string())
            .filter(|v| !v.is_empty())
    })
}

/// Split on sentence punctuation followed by whitespace, and on newlines.
/// Yields `(byte offset, sentence)` pairs with surrounding whitespace trimmed.
fn sentences(text: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let boundary = match c {
            '\n' => Some(i),
            '.' | '!' | '?' => match chars.peek() {
                Some((_, next)) if next.is_whitespace() => Some(i + c.len_utf8()),
                None => Some(i + c.len_utf8()),
                _ => None,
            },
            _ => None,
        };
        if let Some(end) = boundary {
            push_sentence(&mut out, text, start, end);
            start = end;
        }
    }
    push_sentence(&mut out, text, start, text.len());
    out
}

fn push_sentence<'a>(out: &mut Vec<(usize, &'a str)>, text: &'a str, start: usize, end: usize) {
    let raw = &text[start..end];
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        let leading = raw.len() - raw.trim_start().len();
        out.push((start + leading, trimmed));
    }
}

fn tidy(sentence: &str) -> String {
    let collapsed = WHITESPACE.replace_all(sentence, " ");
    let collapsed = collapsed.trim_start_matches(|c: char| matches!(c, '-' | '*' | '•' | ' '));
    truncate_chars(collapsed, MAX_SENTENCE_CHARS)
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

/// Label for the `n`th (1-indexed) extracted finding of a category, e.g.
/// `CF-NL-2`. Only unique within one record; see
/// [`ParseMethod::declares_ids`].
pub fn synthetic_id(category: FindingCategory, n: usize) -> String {
    format!("{}-NL-{}", category.prefix(), n)
}

/// Minimal record preserving a preview of an unparseable response.
pub fn stub_record(raw: &str) -> StructuredRecord {
    let preview = truncate_chars(raw.trim(), PREVIEW_CHARS);
    let description = if preview.is_empty() {
        "The model returned an empty response.".to_string()
    } else {
        format!("The model response could not be parsed. Response preview: {preview}")
    };

    StructuredRecord {
        control_failures: vec![Finding {
            id: STUB_FINDING_ID.to_string(),
            description,
            severity: Severity::Unknown,
            evidence_pages: Vec::new(),
            confidence: STUB_CONFIDENCE,
        }],
        confidence: STUB_CONFIDENCE,
        parse_method: ParseMethod::Stub,
        ..StructuredRecord::default()
    }
}
