//! Prompts for SOC report analysis.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — changing the requested schema or a rule
//!    means editing exactly one place, and the parser's key aliases in
//!    [`crate::record`] are checked against it by the tests below.
//!
//! 2. **Testability** — unit tests can import and inspect prompts directly
//!    without calling a real model.
//!
//! Callers can override the system prompt via
//! [`crate::config::AnalysisConfig::system_prompt`]; the constants here are
//! used only when no override is provided.

/// Default system prompt for analysing a SOC 1 / SOC 2 report.
///
/// This prompt is used when `AnalysisConfig::system_prompt` is `None`.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an expert IT auditor reviewing a SOC 1 or SOC 2 assurance report. Extract the facts a vendor-risk reviewer needs.

Follow these rules precisely:

1. EXECUTIVE SUMMARY
   - service_organization: the company whose system is examined
   - auditor: the independent service auditor (firm name)
   - report_period: the period or point in time covered, as written in the report
   - report_type: e.g. "SOC 2 Type II", "SOC 1 Type I"
   - opinion: one of "unqualified", "qualified", "adverse", "disclaimer"
   - overview: two or three sentences on scope and overall result

2. CONTROL FAILURES
   - Every exception or deviation the auditor noted in tests of controls
   - Include the control reference in the description when one is given

3. EXCLUSIONS
   - Systems, locations, services or trust services criteria stated to be out of scope

4. CARVE-OUTS
   - Subservice organizations presented using the carve-out method

5. EVIDENCE
   - evidence_pages lists the page numbers where the finding is stated
   - The text marks each page with a line "--- Page N ---"; use N
   - Tables detected on the pages are appended in a "=== DETECTED TABLES ===" section

6. WHEN INFORMATION IS MISSING
   - Use "Not specified" for any summary field the text does not state
   - Use empty lists for categories with no findings
   - Never invent findings

7. OUTPUT FORMAT
   - Output ONLY one JSON object with exactly this shape:
{
  "executive_summary": {
    "service_organization": "string",
    "auditor": "string",
    "report_period": "string",
    "report_type": "string",
    "opinion": "unqualified | qualified | adverse | disclaimer",
    "overview": "string"
  },
  "control_failures": [
    {"id": "CF-1", "description": "string", "severity": "high | medium | low", "evidence_pages": [1], "confidence": "high | medium | low"}
  ],
  "exclusions": [
    {"id": "EX-1", "description": "string", "severity": "high | medium | low", "evidence_pages": [1], "confidence": "high | medium | low"}
  ],
  "carve_outs": [
    {"id": "CO-1", "description": "string", "severity": "high | medium | low", "evidence_pages": [1], "confidence": "high | medium | low"}
  ]
}
   - Do NOT wrap the JSON in code fences
   - Do NOT add commentary before or after the JSON"#;

/// Appended for local models, which drift from strict JSON more often.
pub const LOCAL_MODEL_SUFFIX: &str = r#"

8. STRICT JSON
   Every key and every string value MUST be in double quotes.
   No trailing commas. No comments. Start your answer with { and end it with }."#;

/// Line that opens each page's text in the analysed document.
pub fn page_marker(page_num: usize) -> String {
    format!("--- Page {} ---", page_num)
}

/// System prompt for one call: the override if set, else the default
/// (plus the strict-JSON rule for local models).
pub fn system_prompt(custom: Option<&str>, local_model: bool) -> String {
    match custom {
        Some(prompt) => prompt.to_string(),
        None if local_model => format!("{DEFAULT_SYSTEM_PROMPT}{LOCAL_MODEL_SUFFIX}"),
        None => DEFAULT_SYSTEM_PROMPT.to_string(),
    }
}

/// Build the user message for a document or one chunk of it.
///
/// `chunk` is `(number, total)`, 1-indexed, for multi-chunk analyses.
pub fn build_user_message(text: &str, chunk: Option<(usize, usize)>) -> String {
    match chunk {
        Some((number, total)) => format!(
            "This is part {number} of {total} of the report. Report only what this part states; \
             use \"Not specified\" for summary fields it does not mention.\n\n\"\"\"\n{text}\n\"\"\""
        ),
        None => format!("Analyze the following report.\n\n\"\"\"\n{text}\n\"\"\""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FindingCategory, NOT_SPECIFIED};

    #[test]
    fn default_prompt_names_every_category_key() {
        for category in FindingCategory::ALL {
            assert!(
                DEFAULT_SYSTEM_PROMPT.contains(&format!("\"{}\"", category.key())),
                "missing {}",
                category.key()
            );
        }
        assert!(DEFAULT_SYSTEM_PROMPT.contains("\"executive_summary\""));
        assert!(DEFAULT_SYSTEM_PROMPT.contains(NOT_SPECIFIED));
    }

    #[test]
    fn page_marker_matches_prompt() {
        assert_eq!(page_marker(7), "--- Page 7 ---");
        assert!(DEFAULT_SYSTEM_PROMPT.contains("--- Page N ---"));
    }

    #[test]
    fn override_wins_and_local_models_get_suffix() {
        assert_eq!(system_prompt(Some("custom"), true), "custom");
        assert!(system_prompt(None, true).ends_with(LOCAL_MODEL_SUFFIX));
        assert_eq!(system_prompt(None, false), DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn chunk_messages_carry_position() {
        let msg = build_user_message("body", Some((2, 5)));
        assert!(msg.starts_with("This is part 2 of 5"));
        assert!(msg.contains("\"\"\"\nbody\n\"\"\""));
        assert!(build_user_message("body", None).starts_with("Analyze the following report."));
    }
}
