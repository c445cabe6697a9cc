//! Structured-result parsing: recover a [`StructuredRecord`] from whatever
//! text the model produced.
//!
//! The parser is an ordered list of [`Strategy`] values. Each strategy turns
//! the text into zero or more candidate JSON strings; the first candidate
//! that parses as a JSON *object* wins and later strategies are skipped.
//!
//! | # | strategy            | candidate(s)                                             |
//! |---|---------------------|----------------------------------------------------------|
//! | 1 | brace extraction    | first `{` through last `}`                               |
//! | 2 | whole text          | the text unmodified                                      |
//! | 3 | fenced block        | interior of each ```` ``` ```` / ```` ```json ```` block |
//! | 4 | trim and repair     | the brace span with smart quotes / control chars fixed, then the same span with truncated strings and brackets closed |
//! | 5 | aggressive repair   | *local models only*: blank lines collapsed and trailing commas stripped; then also bare keys and bare scalar values quoted, outside string literals |
//!
//! When every structural strategy fails, [`crate::pipeline::fallback`]
//! takes over: label-anchored natural-language extraction, then a stub
//! record. [`parse_structured`] therefore always returns a record.

use crate::pipeline::fallback;
use crate::record::{Confidence, ParseMethod, StructuredRecord};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// One structural parsing strategy.
pub struct Strategy {
    pub method: ParseMethod,
    extract: fn(&str) -> Vec<String>,
}

/// Structural strategies in the order they are tried. The last entry runs
/// only for lower-reliability local models.
static STRATEGIES: [Strategy; 5] = [
    Strategy {
        method: ParseMethod::BraceExtraction,
        extract: brace_span_candidate,
    },
    Strategy {
        method: ParseMethod::WholeText,
        extract: whole_text_candidate,
    },
    Strategy {
        method: ParseMethod::FencedBlock,
        extract: fenced_block_candidates,
    },
    Strategy {
        method: ParseMethod::TrimAndRepair,
        extract: trim_and_repair_candidates,
    },
    Strategy {
        method: ParseMethod::AggressiveRepair,
        extract: aggressive_repair_candidates,
    },
];

/// Parse normalized model output into a record. Never fails.
///
/// `aggressive` enables strategy 5; pass `true` for local models whose JSON
/// is routinely malformed.
pub fn parse_structured(text: &str, aggressive: bool) -> StructuredRecord {
    if let Some((method, map)) = run_strategies(text, aggressive) {
        debug!("Parsed model output via {:?}", method);
        let mut record = StructuredRecord::from_json(&map);
        record.parse_method = method;
        record.confidence = Confidence::High;
        return record;
    }

    warn!(
        "No structural strategy parsed the response ({} chars); falling back to text extraction",
        text.len()
    );
    fallback::extract_natural_language(text).unwrap_or_else(|| {
        warn!("Natural-language extraction found nothing; returning stub record");
        fallback::stub_record(text)
    })
}

/// Try each strategy in order; return the first JSON object found.
pub fn run_strategies(text: &str, aggressive: bool) -> Option<(ParseMethod, Map<String, Value>)> {
    let enabled = if aggressive {
        STRATEGIES.len()
    } else {
        STRATEGIES.len() - 1
    };

    STRATEGIES[..enabled].iter().find_map(|strategy| {
        (strategy.extract)(text)
            .iter()
            .find_map(|candidate| parse_object(candidate))
            .map(|map| (strategy.method, map))
    })
}

/// Strict parse; only JSON objects count as success.
fn parse_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

// ── Strategy 1: brace extraction ─────────────────────────────────────────

fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn brace_span_candidate(text: &str) -> Vec<String> {
    brace_span(text).map(str::to_string).into_iter().collect()
}

// ── Strategy 2: whole text ───────────────────────────────────────────────

fn whole_text_candidate(text: &str) -> Vec<String> {
    vec![text.to_string()]
}

// ── Strategy 3: fenced block ─────────────────────────────────────────────

static RE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json|JSON)?[ \t]*\r?\n?(.*?)```").unwrap());

fn fenced_block_candidates(text: &str) -> Vec<String> {
    RE_FENCE
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

// ── Strategy 4: trim and repair ──────────────────────────────────────────

fn trim_and_repair_candidates(text: &str) -> Vec<String> {
    let Some(start) = text.find('{') else {
        return Vec::new();
    };
    let span = brace_span(text).unwrap_or(&text[start..]);
    let tail = &text[start..];

    let cleaned = clean_characters(span);
    vec![
        cleaned.clone(),
        close_truncated(&clean_characters(tail)),
        close_truncated(&cleaned),
    ]
}

/// Replace typographic quotes and drop control characters JSON rejects.
fn clean_characters(s: &str) -> String {
    s.chars()
        .filter_map(|c| match c {
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{00AB}' | '\u{00BB}' => Some('"'),
            '\u{2018}' | '\u{2019}' => Some('\''),
            '\u{FEFF}' | '\u{200B}' => None,
            '\n' | '\r' | '\t' => Some(c),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect()
}

/// Close an unterminated string and any open brackets/braces, dropping a
/// dangling separator first, so that output cut off mid-object still parses.
pub(crate) fn close_truncated(s: &str) -> String {
    let mut closers: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in s.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => closers.push('}'),
            '[' => closers.push(']'),
            '}' | ']' => {
                closers.pop();
            }
            _ => {}
        }
    }

    let mut out = s.trim_end().to_string();
    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }

    loop {
        let trimmed_len = out.trim_end().len();
        out.truncate(trimmed_len);
        if out.ends_with(',') {
            out.pop();
            continue;
        }
        if out.ends_with(':') {
            out.push_str(" null");
        }
        break;
    }

    out.extend(closers.iter().rev());
    out
}

// ── Strategy 5: aggressive repair ────────────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t\r]*\n").unwrap());
static RE_TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*([}\]])").unwrap());
static RE_BARE_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([{,]\s*)([A-Za-z_][A-Za-z0-9_\-]*)\s*:").unwrap());
static RE_BARE_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(:\s*)([A-Za-z][^,}\]\n"]*?)(\s*[,}\]\n])"#).unwrap());

fn aggressive_repair_candidates(text: &str) -> Vec<String> {
    let Some(start) = text.find('{') else {
        return Vec::new();
    };
    let span = clean_characters(brace_span(text).unwrap_or(&text[start..]));
    let closed = close_truncated(&clean_characters(&text[start..]));

    // Structural fixes alone first; quoting bare tokens is the riskier rewrite.
    vec![
        strip_separators(&span),
        aggressive_repair(&span),
        strip_separators(&closed),
        aggressive_repair(&closed),
    ]
}

/// Collapse blank lines and drop trailing commas before `}` / `]`.
fn strip_separators(s: &str) -> String {
    let mut out = s.to_string();
    // Collapse repeatedly: adjacent blank lines share a newline between matches.
    while RE_BLANK_LINES.is_match(&out) {
        out = RE_BLANK_LINES.replace_all(&out, "\n").into_owned();
    }
    rewrite_outside_strings(&out, |segment| {
        RE_TRAILING_COMMA.replace_all(segment, "$1").into_owned()
    })
}

/// Rewrite JSON-ish text into strict JSON: [`strip_separators`], then quote
/// bare keys and bare scalar values. String literals are never rewritten.
pub(crate) fn aggressive_repair(s: &str) -> String {
    rewrite_outside_strings(&strip_separators(s), |segment| {
        let keyed = RE_BARE_KEY.replace_all(segment, "$1\"$2\":");
        RE_BARE_VALUE
            .replace_all(&keyed, |caps: &regex::Captures<'_>| {
                let value = caps[2].trim_end();
                if matches!(value, "true" | "false" | "null") {
                    caps[0].to_string()
                } else {
                    format!("{}\"{}\"{}", &caps[1], value, &caps[3])
                }
            })
            .into_owned()
    })
}

/// Apply `rewrite` to each stretch of `s` outside double-quoted string
/// literals; the literals themselves are copied through untouched. An
/// unterminated literal runs to the end of the input.
fn rewrite_outside_strings(s: &str, rewrite: impl Fn(&str) -> String) -> String {
    let mut out = String::with_capacity(s.len() + 16);
    let mut segment_start = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
                out.push_str(&s[segment_start..=i]);
                segment_start = i + 1;
            }
        } else if c == '"' {
            out.push_str(&rewrite(&s[segment_start..i]));
            in_string = true;
            segment_start = i;
        }
    }

    let tail = &s[segment_start..];
    if in_string {
        out.push_str(tail);
    } else {
        out.push_str(&rewrite(tail));
    }
    out
}
