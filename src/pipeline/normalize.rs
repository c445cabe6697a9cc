//! Response normalization: pull the text payload out of a model response
//! envelope whose exact shape this crate does not control.
//!
//! Envelopes are classified into [`ResponseEnvelope`], one variant per known
//! shape, tried in priority order:
//!
//! 1. `MessageContent` — string `content` on the primary message
//!    (`choices[0].message.content`, or a top-level `message.content`)
//! 2. `ChoiceContent`  — string `content` / `text` / `response` on the choice
//!    (or on the envelope itself when there are no choices)
//! 3. `ContentParts`   — an array of parts; each part's `text`, or the part
//!    itself when it is a string, concatenated
//! 4. `MessageFields`  — the message has other non-empty fields
//!    (tool calls, refusals, …): a bounded dump of the message
//! 5. `Opaque`         — a bounded dump of the whole envelope
//!
//! Dumps are bounded by [`DumpLimits`]: nesting depth, string length and
//! array length are capped with visible markers. `serde_json::Value` is an
//! owned tree and cannot contain cycles, so depth is the only recursion bound
//! needed. Normalization never fails; the worst case is an empty string.

use serde_json::{Map, Value};
use tracing::debug;

/// Marker substituted for containers nested deeper than the depth cap.
pub const DEPTH_MARKER: &str = "[Max depth reached]";

/// Marker appended to truncated strings.
pub const TRUNCATION_MARKER: &str = "…[truncated]";

/// Caps applied when dumping an envelope as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpLimits {
    pub max_depth: usize,
    pub max_string_chars: usize,
    pub max_array_items: usize,
}

impl Default for DumpLimits {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_string_chars: 1000,
            max_array_items: 100,
        }
    }
}

/// The known response shapes, in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseEnvelope {
    MessageContent(String),
    ChoiceContent(String),
    ContentParts(Vec<String>),
    MessageFields(String),
    Opaque(String),
}

impl ResponseEnvelope {
    /// Classify an arbitrary envelope. Exhaustive: every input maps to a variant.
    pub fn classify(envelope: &Value) -> Self {
        if let Value::String(s) = envelope {
            return ResponseEnvelope::ChoiceContent(s.trim().to_string());
        }

        let choice = envelope
            .get("choices")
            .and_then(|c| c.get(0))
            .filter(|c| c.is_object())
            .unwrap_or(envelope);
        let message = choice
            .get("message")
            .or_else(|| envelope.get("message"))
            .and_then(Value::as_object);

        if let Some(text) = message.and_then(|m| m.get("content")).and_then(non_empty_str) {
            return ResponseEnvelope::MessageContent(text);
        }

        if let Some(text) = ["content", "text", "response"]
            .iter()
            .find_map(|k| choice.get(*k).and_then(non_empty_str))
        {
            return ResponseEnvelope::ChoiceContent(text);
        }

        let parts_source = message
            .and_then(|m| m.get("content"))
            .filter(|c| c.is_array())
            .or_else(|| choice.get("content").filter(|c| c.is_array()))
            .or_else(|| envelope.get("content").filter(|c| c.is_array()));
        if let Some(Value::Array(parts)) = parts_source {
            let texts = part_texts(parts);
            if texts.iter().any(|t| !t.trim().is_empty()) {
                return ResponseEnvelope::ContentParts(texts);
            }
        }

        if let Some(message) = message {
            if has_other_fields(message) {
                return ResponseEnvelope::MessageFields(safe_dump(
                    &Value::Object(message.clone()),
                    DumpLimits::default(),
                ));
            }
        }

        ResponseEnvelope::Opaque(safe_dump(envelope, DumpLimits::default()))
    }

    /// The textual payload carried by this envelope.
    pub fn into_text(self) -> String {
        match self {
            ResponseEnvelope::MessageContent(s)
            | ResponseEnvelope::ChoiceContent(s)
            | ResponseEnvelope::MessageFields(s)
            | ResponseEnvelope::Opaque(s) => s,
            ResponseEnvelope::ContentParts(parts) => parts.concat(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ResponseEnvelope::MessageContent(_) => "message content",
            ResponseEnvelope::ChoiceContent(_) => "choice content",
            ResponseEnvelope::ContentParts(_) => "content parts",
            ResponseEnvelope::MessageFields(_) => "message dump",
            ResponseEnvelope::Opaque(_) => "envelope dump",
        }
    }
}

/// Best-effort text content of a response envelope.
pub fn normalize_response(envelope: &Value) -> String {
    let classified = ResponseEnvelope::classify(envelope);
    debug!("Normalized response via {}", classified.kind());
    classified.into_text()
}

/// Dump a value as pretty JSON within `limits`. Returns an empty string if
/// serialization fails.
pub fn safe_dump(value: &Value, limits: DumpLimits) -> String {
    serde_json::to_string_pretty(&prune(value, 0, &limits)).unwrap_or_default()
}

fn prune(value: &Value, depth: usize, limits: &DumpLimits) -> Value {
    match value {
        Value::Object(_) | Value::Array(_) if depth > limits.max_depth => {
            Value::String(DEPTH_MARKER.to_string())
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), prune(v, depth + 1, limits)))
                .collect(),
        ),
        Value::Array(items) => {
            let mut pruned: Vec<Value> = items
                .iter()
                .take(limits.max_array_items)
                .map(|v| prune(v, depth + 1, limits))
                .collect();
            if items.len() > limits.max_array_items {
                pruned.push(Value::String(format!(
                    "[… {} more items]",
                    items.len() - limits.max_array_items
                )));
            }
            Value::Array(pruned)
        }
        Value::String(s) if s.chars().count() > limits.max_string_chars => {
            let head: String = s.chars().take(limits.max_string_chars).collect();
            Value::String(format!("{head}{TRUNCATION_MARKER}"))
        }
        other => other.clone(),
    }
}

fn non_empty_str(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn part_texts(parts: &[Value]) -> Vec<String> {
    parts
        .iter()
        .filter_map(|part| match part {
            Value::String(s) => Some(s.clone()),
            Value::Object(obj) => obj.get("text").and_then(Value::as_str).map(str::to_string),
            _ => None,
        })
        .collect()
}

fn has_other_fields(message: &Map<String, Value>) -> bool {
    message
        .iter()
        .filter(|(k, _)| k.as_str() != "role" && k.as_str() != "content")
        .any(|(_, v)| match v {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
            Value::Bool(_) | Value::Number(_) => true,
        })
}
