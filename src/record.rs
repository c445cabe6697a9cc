//! The structured record produced by an analysis.
//!
//! The schema is never partial: every field that the model (or the fallback
//! extractors) did not supply carries an explicit [`NOT_SPECIFIED`] /
//! `unknown` default, so downstream consumers can serialise and display a
//! record without null checks.
//!
//! [`StructuredRecord::from_json`] is the lenient reader used by the parser:
//! it accepts the snake_case field names this crate serialises as well as
//! the common camelCase / synonym spellings models tend to produce.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Placeholder for every text field without ground truth.
pub const NOT_SPECIFIED: &str = "Not specified";

/// How much a value can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
    #[default]
    Unknown,
}

impl Confidence {
    fn from_text(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "high" => Confidence::High,
            "medium" | "moderate" => Confidence::Medium,
            "low" => Confidence::Low,
            _ => Confidence::Unknown,
        }
    }
}

/// The auditor's opinion on the description and controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Opinion {
    Unqualified,
    Qualified,
    Adverse,
    Disclaimer,
    #[default]
    Unknown,
}

impl Opinion {
    /// Classify free text by keyword. `unqualified` is tested before
    /// `qualified` because the latter is a substring of the former.
    pub fn from_text(s: &str) -> Self {
        let lower = s.to_lowercase();
        if lower.contains("unqualified") || lower.contains("unmodified") || lower.contains("clean") {
            Opinion::Unqualified
        } else if lower.contains("adverse") {
            Opinion::Adverse
        } else if lower.contains("disclaim") {
            Opinion::Disclaimer
        } else if lower.contains("qualified") || lower.contains("modified") {
            Opinion::Qualified
        } else {
            Opinion::Unknown
        }
    }
}

/// Impact of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
    #[default]
    Unknown,
}

impl Severity {
    fn from_text(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "high" | "critical" | "major" => Severity::High,
            "medium" | "moderate" => Severity::Medium,
            "low" | "minor" => Severity::Low,
            _ => Severity::Unknown,
        }
    }
}

/// Which strategy produced the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseMethod {
    BraceExtraction,
    WholeText,
    FencedBlock,
    TrimAndRepair,
    AggressiveRepair,
    NaturalLanguage,
    #[default]
    Stub,
    /// Result of merging several chunk records.
    Merged,
}

impl ParseMethod {
    /// Whether finding ids in a record parsed this way came from the model.
    /// Fallback records carry labels made up during extraction.
    pub fn declares_ids(self) -> bool {
        !matches!(self, ParseMethod::NaturalLanguage | ParseMethod::Stub)
    }
}

/// The finding categories, in the order they appear in a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FindingCategory {
    ControlFailure,
    Exclusion,
    CarveOut,
}

impl FindingCategory {
    pub const ALL: [FindingCategory; 3] = [
        FindingCategory::ControlFailure,
        FindingCategory::Exclusion,
        FindingCategory::CarveOut,
    ];

    /// JSON key the category is serialised under.
    pub fn key(self) -> &'static str {
        match self {
            FindingCategory::ControlFailure => "control_failures",
            FindingCategory::Exclusion => "exclusions",
            FindingCategory::CarveOut => "carve_outs",
        }
    }

    /// Spellings accepted when reading model output.
    fn aliases(self) -> &'static [&'static str] {
        match self {
            FindingCategory::ControlFailure => &[
                "control_failures",
                "controlFailures",
                "control_exceptions",
                "exceptions",
                "deviations",
            ],
            FindingCategory::Exclusion => &["exclusions", "scope_exclusions", "scopeExclusions"],
            FindingCategory::CarveOut => &[
                "carve_outs",
                "carveOuts",
                "carve-outs",
                "carveouts",
                "subservice_organizations",
            ],
        }
    }

    /// Short prefix for synthesised identifiers.
    pub fn prefix(self) -> &'static str {
        match self {
            FindingCategory::ControlFailure => "CF",
            FindingCategory::Exclusion => "EX",
            FindingCategory::CarveOut => "CO",
        }
    }
}

/// Headline facts about the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutiveSummary {
    pub service_organization: String,
    pub auditor: String,
    pub report_period: String,
    pub report_type: String,
    pub opinion: Opinion,
    pub overview: String,
}

impl Default for ExecutiveSummary {
    fn default() -> Self {
        Self {
            service_organization: NOT_SPECIFIED.to_string(),
            auditor: NOT_SPECIFIED.to_string(),
            report_period: NOT_SPECIFIED.to_string(),
            report_type: NOT_SPECIFIED.to_string(),
            opinion: Opinion::Unknown,
            overview: NOT_SPECIFIED.to_string(),
        }
    }
}

impl ExecutiveSummary {
    /// True when at least one field carries real information.
    pub fn is_specified(&self) -> bool {
        *self != ExecutiveSummary::default()
    }

    fn from_json(value: &Value) -> Self {
        let mut summary = ExecutiveSummary::default();
        match value {
            Value::Object(map) => {
                let text = |keys: &[&str]| lookup(map, keys).and_then(as_text);
                if let Some(v) = text(&["service_organization", "serviceOrganization", "service_org", "company"]) {
                    summary.service_organization = v;
                }
                if let Some(v) = text(&["auditor", "service_auditor", "auditor_name", "audit_firm"]) {
                    summary.auditor = v;
                }
                if let Some(v) = text(&["report_period", "reportPeriod", "period"]) {
                    summary.report_period = v;
                }
                if let Some(v) = text(&["report_type", "reportType", "type"]) {
                    summary.report_type = v;
                }
                if let Some(v) = text(&["opinion", "auditor_opinion", "opinion_type"]) {
                    summary.opinion = Opinion::from_text(&v);
                }
                if let Some(v) = text(&["overview", "overall_assessment", "summary"]) {
                    summary.overview = v;
                }
            }
            other => {
                if let Some(v) = as_text(other) {
                    summary.overview = v;
                }
            }
        }
        summary
    }
}

/// One categorised finding with its evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Identifier declared by the source; [`NOT_SPECIFIED`] when none was given.
    pub id: String,
    pub description: String,
    pub severity: Severity,
    /// 1-indexed page numbers backing the finding.
    pub evidence_pages: Vec<u32>,
    pub confidence: Confidence,
}

impl Default for Finding {
    fn default() -> Self {
        Self {
            id: NOT_SPECIFIED.to_string(),
            description: NOT_SPECIFIED.to_string(),
            severity: Severity::Unknown,
            evidence_pages: Vec::new(),
            confidence: Confidence::Unknown,
        }
    }
}

impl Finding {
    /// Whether the identifier came from the source rather than the default.
    pub fn has_declared_id(&self) -> bool {
        self.id != NOT_SPECIFIED
    }

    fn from_json(value: &Value) -> Option<Self> {
        let mut finding = Finding::default();
        match value {
            Value::Object(map) => {
                let text = |keys: &[&str]| lookup(map, keys).and_then(as_text);
                if let Some(v) = text(&["id", "identifier", "control_id", "ref", "reference"]) {
                    finding.id = v;
                }
                if let Some(v) = text(&["description", "desc", "details", "finding", "text", "name"]) {
                    finding.description = v;
                }
                if let Some(v) = text(&["severity", "impact", "risk"]) {
                    finding.severity = Severity::from_text(&v);
                }
                if let Some(v) = lookup(map, &["evidence_pages", "evidencePages", "pages", "page_numbers", "evidence"]) {
                    finding.evidence_pages = parse_pages(v);
                }
                if let Some(v) = text(&["confidence"]) {
                    finding.confidence = Confidence::from_text(&v);
                }
                if finding == Finding::default() {
                    return None;
                }
            }
            other => {
                finding.description = as_text(other)?;
            }
        }
        Some(finding)
    }
}

/// Bookkeeping about where a record came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Chunks the input was split into (1 for a single-call analysis).
    pub chunks_total: usize,
    /// Chunks whose analysis returned a record.
    pub chunks_analyzed: usize,
    /// Chunks skipped after a transport failure.
    pub chunks_skipped: usize,
}

/// The canonical typed output of an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredRecord {
    pub executive_summary: ExecutiveSummary,
    pub control_failures: Vec<Finding>,
    pub exclusions: Vec<Finding>,
    pub carve_outs: Vec<Finding>,
    pub confidence: Confidence,
    pub parse_method: ParseMethod,
    pub source: SourceInfo,
}

impl Default for StructuredRecord {
    fn default() -> Self {
        Self {
            executive_summary: ExecutiveSummary::default(),
            control_failures: Vec::new(),
            exclusions: Vec::new(),
            carve_outs: Vec::new(),
            confidence: Confidence::Unknown,
            parse_method: ParseMethod::Stub,
            source: SourceInfo::default(),
        }
    }
}

impl StructuredRecord {
    pub fn findings(&self, category: FindingCategory) -> &[Finding] {
        match category {
            FindingCategory::ControlFailure => &self.control_failures,
            FindingCategory::Exclusion => &self.exclusions,
            FindingCategory::CarveOut => &self.carve_outs,
        }
    }

    pub fn findings_mut(&mut self, category: FindingCategory) -> &mut Vec<Finding> {
        match category {
            FindingCategory::ControlFailure => &mut self.control_failures,
            FindingCategory::Exclusion => &mut self.exclusions,
            FindingCategory::CarveOut => &mut self.carve_outs,
        }
    }

    /// True when nothing beyond the defaults was populated.
    pub fn is_empty(&self) -> bool {
        !self.executive_summary.is_specified()
            && FindingCategory::ALL
                .iter()
                .all(|c| self.findings(*c).is_empty())
    }

    /// Build a record from a parsed JSON object, tolerating synonym keys and
    /// loosely typed values. Unknown keys are ignored; missing ones default.
    ///
    /// A top-level object that is itself the summary (no nested summary key,
    /// but carrying e.g. `service_organization`) is accepted too.
    pub fn from_json(map: &Map<String, Value>) -> Self {
        let mut record = StructuredRecord::default();

        record.executive_summary = match lookup(map, &["executive_summary", "executiveSummary", "summary"]) {
            Some(v) => ExecutiveSummary::from_json(v),
            None => ExecutiveSummary::from_json(&Value::Object(map.clone())),
        };

        for category in FindingCategory::ALL {
            if let Some(Value::Array(items)) = lookup(map, category.aliases()) {
                *record.findings_mut(category) = items.iter().filter_map(Finding::from_json).collect();
            }
        }

        record
    }

    /// Serialise to a JSON value (infallible for this plain-data type).
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// First value present under any of `keys`.
fn lookup<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| map.get(*k))
}

/// Scalar → trimmed non-empty text. Arrays of scalars are joined with ", ".
fn as_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(as_text)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Null | Value::Object(_) => return None,
    };
    if text.is_empty() || text.eq_ignore_ascii_case("null") {
        None
    } else {
        Some(text)
    }
}

static RE_PAGE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

/// Accept `[12, 14]`, `["p. 12", "14"]`, `"12, 14"` or `12`; order-preserving, deduplicated.
pub(crate) fn parse_pages(value: &Value) -> Vec<u32> {
    let mut pages: Vec<u32> = Vec::new();
    let mut push = |p: u32| {
        if p > 0 && !pages.contains(&p) {
            pages.push(p);
        }
    };
    match value {
        Value::Number(n) => {
            if let Some(p) = n.as_u64().and_then(|p| u32::try_from(p).ok()) {
                push(p);
            }
        }
        Value::String(s) => {
            for m in RE_PAGE_NUMBER.find_iter(s) {
                if let Ok(p) = m.as_str().parse() {
                    push(p);
                }
            }
        }
        Value::Array(items) => {
            for p in items.iter().flat_map(parse_pages) {
                push(p);
            }
        }
        _ => {}
    }
    pages
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_are_explicit() {
        let record = StructuredRecord::default();
        let v = record.to_json();
        assert_eq!(v["executive_summary"]["auditor"], NOT_SPECIFIED);
        assert_eq!(v["executive_summary"]["opinion"], "unknown");
        assert_eq!(v["control_failures"], json!([]));
        assert!(record.is_empty());
    }

    #[test]
    fn opinion_keywords() {
        assert_eq!(Opinion::from_text("Unqualified opinion"), Opinion::Unqualified);
        assert_eq!(Opinion::from_text("QUALIFIED"), Opinion::Qualified);
        assert_eq!(Opinion::from_text("an adverse opinion"), Opinion::Adverse);
        assert_eq!(Opinion::from_text("Disclaimer of opinion"), Opinion::Disclaimer);
        assert_eq!(Opinion::from_text("n/a"), Opinion::Unknown);
    }

    #[test]
    fn reads_synonym_keys_and_loose_values() {
        let v = json!({
            "executiveSummary": {
                "serviceOrganization": "Acme Cloud",
                "audit_firm": "Smith & Co LLP",
                "opinion": "Qualified"
            },
            "exceptions": [
                {"control_id": "CC6.1", "details": "MFA not enforced", "pages": "p. 42, 43", "severity": "major"},
                "Termination tickets missing"
            ],
            "carveOuts": [{"name": "AWS", "evidence": 12}]
        });
        let record = StructuredRecord::from_json(v.as_object().unwrap());
        assert_eq!(record.executive_summary.service_organization, "Acme Cloud");
        assert_eq!(record.executive_summary.auditor, "Smith & Co LLP");
        assert_eq!(record.executive_summary.opinion, Opinion::Qualified);
        assert_eq!(record.executive_summary.report_period, NOT_SPECIFIED);

        assert_eq!(record.control_failures.len(), 2);
        let first = &record.control_failures[0];
        assert_eq!(first.id, "CC6.1");
        assert_eq!(first.evidence_pages, vec![42, 43]);
        assert_eq!(first.severity, Severity::High);
        let second = &record.control_failures[1];
        assert!(!second.has_declared_id());
        assert_eq!(second.description, "Termination tickets missing");

        assert_eq!(record.carve_outs[0].description, "AWS");
        assert_eq!(record.carve_outs[0].evidence_pages, vec![12]);
    }

    #[test]
    fn json_round_trip_preserves_fields() {
        let mut record = StructuredRecord::default();
        record.executive_summary.service_organization = "Acme".into();
        record.executive_summary.opinion = Opinion::Adverse;
        record.exclusions.push(Finding {
            id: "EX-1".into(),
            description: "Payroll system out of scope".into(),
            severity: Severity::Medium,
            evidence_pages: vec![3, 9],
            confidence: Confidence::High,
        });
        let v = record.to_json();
        let back = StructuredRecord::from_json(v.as_object().unwrap());
        assert_eq!(back.executive_summary, record.executive_summary);
        assert_eq!(back.exclusions, record.exclusions);
    }

    #[test]
    fn empty_finding_objects_are_dropped() {
        let v = json!({"exclusions": [{}, {"unrelated": 1}, null]});
        let record = StructuredRecord::from_json(v.as_object().unwrap());
        assert!(record.exclusions.is_empty());
    }

    #[test]
    fn parse_pages_variants() {
        assert_eq!(parse_pages(&json!([3, "5", "p. 7"])), vec![3, 5, 7]);
        assert_eq!(parse_pages(&json!("12, 12, 14")), vec![12, 14]);
        assert_eq!(parse_pages(&json!(0)), Vec::<u32>::new());
        assert_eq!(parse_pages(&json!(null)), Vec::<u32>::new());
    }
}
