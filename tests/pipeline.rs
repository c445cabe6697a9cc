//! Integration tests for the analysis pipeline.
//!
//! These drive the public API end to end against an in-memory
//! `ModelTransport` that replays scripted envelopes and errors, so they need
//! neither network access nor an API key.

use async_trait::async_trait;
use serde_json::{json, Value};
use soc_lens::{
    analyze, analyze_with_transport, extract_tables, AnalysisConfig, AnalysisError,
    AnalysisProgressCallback, Confidence, Glyph, ModelRequest, ModelTransport, Opinion,
    ParseMethod, SourceInfo, TableDetectionConfig, TransportError,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Replays scripted results in order and records every request.
#[derive(Default)]
struct ScriptedTransport {
    script: Mutex<VecDeque<Result<Value, TransportError>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedTransport {
    fn new(script: Vec<Result<Value, TransportError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn user_messages(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.user.clone())
            .collect()
    }
}

#[async_trait]
impl ModelTransport for ScriptedTransport {
    async fn complete(&self, request: &ModelRequest) -> Result<Value, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Other("script exhausted".into())))
    }
}

#[derive(Default)]
struct Recorder {
    percents: Mutex<Vec<u8>>,
    chunk_errors: Mutex<Vec<(usize, usize)>>,
}

impl AnalysisProgressCallback for Recorder {
    fn on_progress(&self, percent: u8, _message: &str) {
        self.percents.lock().unwrap().push(percent);
    }

    fn on_chunk_error(&self, chunk: usize, total: usize, _error: &str) {
        self.chunk_errors.lock().unwrap().push((chunk, total));
    }
}

/// OpenAI-style envelope around `content`.
fn envelope(content: &str) -> Value {
    json!({"choices": [{"message": {"role": "assistant", "content": content}}]})
}

fn chunk_response(
    summary_auditor: Option<&str>,
    exclusions: &[(&str, &str)],
    failures: &[(&str, &str)],
) -> Value {
    let list = |items: &[(&str, &str)]| {
        items
            .iter()
            .map(|(id, d)| json!({"id": id, "description": d, "evidence_pages": [3]}))
            .collect::<Vec<_>>()
    };
    let mut body = json!({
        "exclusions": list(exclusions),
        "control_failures": list(failures),
        "carve_outs": [],
    });
    if let Some(auditor) = summary_auditor {
        body["executive_summary"] = json!({
            "service_organization": "Acme Cloud Inc.",
            "auditor": auditor,
            "report_type": "SOC 2 Type II",
            "opinion": "unqualified",
        });
    }
    envelope(&body.to_string())
}

/// Three paragraphs of ~290 characters; with a 100-token (400-char) budget
/// each paragraph becomes its own chunk.
fn three_chunk_text() -> String {
    (0..3)
        .map(|i| format!("Paragraph {i}. {}", "word ".repeat(55).trim_end()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn small_budget_config(
    transport: Arc<ScriptedTransport>,
    recorder: Option<Arc<Recorder>>,
) -> AnalysisConfig {
    let mut builder = AnalysisConfig::builder()
        .transport(transport)
        .token_budget(100)
        .max_retries(0);
    if let Some(r) = recorder {
        builder = builder.progress_callback(r);
    }
    builder.build().unwrap()
}

fn assert_monotonic(percents: &[u8]) {
    assert!(!percents.is_empty());
    assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{percents:?}");
    assert_eq!(*percents.last().unwrap(), 100);
}

// ── Single call ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn single_call_returns_parsed_record() {
    let transport = ScriptedTransport::new(vec![Ok(chunk_response(
        Some("Baker & Tilly LLP"),
        &[("EX-1", "Payroll platform excluded")],
        &[],
    ))]);
    let recorder = Arc::new(Recorder::default());
    let config = AnalysisConfig::builder()
        .transport(transport.clone())
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    let record = analyze("Independent Service Auditor's Report ...", &config)
        .await
        .unwrap();

    assert_eq!(record.executive_summary.auditor, "Baker & Tilly LLP");
    assert_eq!(record.executive_summary.opinion, Opinion::Unqualified);
    assert_eq!(record.exclusions.len(), 1);
    assert_eq!(record.exclusions[0].evidence_pages, vec![3]);
    assert_eq!(record.confidence, Confidence::High);
    assert_eq!(
        record.source,
        SourceInfo {
            chunks_total: 1,
            chunks_analyzed: 1,
            chunks_skipped: 0
        }
    );
    assert_eq!(transport.user_messages().len(), 1);
    assert!(transport.user_messages()[0].starts_with("Analyze the following report."));
    assert_monotonic(&recorder.percents.lock().unwrap());
}

#[tokio::test]
async fn single_call_transport_error_propagates() {
    let transport = ScriptedTransport::new(vec![Err(TransportError::ConnectionRefused(
        "localhost:11434".into(),
    ))]);
    let config = AnalysisConfig::builder().transport(transport).build().unwrap();

    match analyze("short text", &config).await {
        Err(AnalysisError::Transport(TransportError::ConnectionRefused(_))) => {}
        other => panic!("expected transport error, got {other:?}"),
    }
}

#[tokio::test]
async fn unparseable_response_is_a_stub_not_an_error() {
    let transport =
        ScriptedTransport::new(vec![Ok(envelope("I could not find a report in this text."))]);
    let config = AnalysisConfig::builder().transport(transport).build().unwrap();

    let record = analyze("some text", &config).await.unwrap();
    assert_eq!(record.parse_method, ParseMethod::Stub);
    assert_eq!(record.confidence, Confidence::Low);
    assert_eq!(record.control_failures.len(), 1);
    assert!(record.control_failures[0]
        .description
        .contains("I could not find a report"));
}

#[tokio::test]
async fn prose_wrapped_response_from_anthropic_shape() {
    let body = r#"Here is the analysis:
{"executive_summary": {"auditor": "EY", "opinion": "qualified"}, "carve_outs": [{"id": "CO-1", "description": "AWS data centers", "evidence_pages": "12, 13"}]}
Hope this helps."#;
    let transport = ScriptedTransport::new(vec![Ok(json!({
        "content": [{"type": "text", "text": body}]
    }))]);

    let config = AnalysisConfig::builder()
        .transport(transport.clone())
        .build()
        .unwrap();
    let record = analyze_with_transport(transport.as_ref(), "text", &config)
        .await
        .unwrap();

    assert_eq!(record.parse_method, ParseMethod::BraceExtraction);
    assert_eq!(record.executive_summary.opinion, Opinion::Qualified);
    assert_eq!(record.carve_outs[0].evidence_pages, vec![12, 13]);
}

#[tokio::test]
async fn blank_input_is_rejected_before_any_call() {
    let transport = ScriptedTransport::new(vec![]);
    let config = AnalysisConfig::builder()
        .transport(transport.clone())
        .build()
        .unwrap();
    assert!(matches!(
        analyze("   ", &config).await,
        Err(AnalysisError::EmptyInput)
    ));
    assert!(transport.user_messages().is_empty());
}

// ── Multi chunk ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_chunk_is_skipped_and_duplicates_dropped() {
    let transport = ScriptedTransport::new(vec![
        Ok(chunk_response(Some("Deloitte"), &[("EX-1", "first")], &[])),
        Err(TransportError::ConnectionRefused("gone".into())),
        Ok(chunk_response(
            Some("Someone else"),
            &[("EX-1", "second"), ("EX-2", "other")],
            &[("CF-1", "Access review missed")],
        )),
    ]);
    let recorder = Arc::new(Recorder::default());
    let config = small_budget_config(transport.clone(), Some(recorder.clone()));

    let record = analyze(&three_chunk_text(), &config).await.unwrap();

    let users = transport.user_messages();
    assert_eq!(users.len(), 3);
    assert!(users[0].starts_with("This is part 1 of 3"));
    assert!(users[2].starts_with("This is part 3 of 3"));

    assert_eq!(record.parse_method, ParseMethod::Merged);
    assert_eq!(record.executive_summary.auditor, "Deloitte");
    let ids: Vec<&str> = record.exclusions.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, vec!["EX-1", "EX-2"]);
    assert_eq!(record.exclusions[0].description, "first");
    assert_eq!(record.control_failures.len(), 1);
    assert_eq!(
        record.source,
        SourceInfo {
            chunks_total: 3,
            chunks_analyzed: 2,
            chunks_skipped: 1
        }
    );

    assert_eq!(*recorder.chunk_errors.lock().unwrap(), vec![(2, 3)]);
    assert_monotonic(&recorder.percents.lock().unwrap());
}

#[tokio::test]
async fn every_chunk_failing_is_no_valid_results() {
    let transport = ScriptedTransport::new(vec![
        Err(TransportError::Http {
            status: 401,
            body: Some("invalid api key".into()),
        }),
        Err(TransportError::ConnectionRefused("gone".into())),
        Err(TransportError::Other("boom".into())),
    ]);
    let config = small_budget_config(transport, None);

    match analyze(&three_chunk_text(), &config).await {
        Err(AnalysisError::NoValidResults { chunks, first_error }) => {
            assert_eq!(chunks, 3);
            assert!(first_error.contains("chunk 1"));
            assert!(first_error.contains("401"));
        }
        other => panic!("expected NoValidResults, got {other:?}"),
    }
}

#[tokio::test]
async fn retryable_chunk_error_is_retried_before_skipping() {
    let transport = ScriptedTransport::new(vec![
        Err(TransportError::Http { status: 503, body: None }),
        Ok(chunk_response(None, &[("EX-1", "retried")], &[])),
        Ok(chunk_response(None, &[], &[])),
        Ok(chunk_response(None, &[], &[])),
    ]);
    let config = AnalysisConfig::builder()
        .transport(transport.clone())
        .token_budget(100)
        .max_retries(1)
        .retry_backoff_ms(1)
        .build()
        .unwrap();

    let record = analyze(&three_chunk_text(), &config).await.unwrap();
    assert_eq!(transport.user_messages().len(), 4);
    assert_eq!(record.exclusions[0].description, "retried");
    assert_eq!(record.source.chunks_skipped, 0);
}

// ── Tables ───────────────────────────────────────────────────────────────────

#[test]
fn extract_tables_on_a_synthetic_page() {
    let mut glyphs = Vec::new();
    for r in 0..4 {
        for c in 0..4 {
            glyphs.push(Glyph::new(
                format!("R{r}C{c}"),
                60.0 + 110.0 * c as f32,
                720.0 - 16.0 * r as f32,
                35.0,
                8.0,
                0,
            ));
        }
    }
    // Shuffle deterministically: extraction must not depend on input order.
    glyphs.reverse();
    glyphs.swap(3, 11);

    let tables = extract_tables(&glyphs, &TableDetectionConfig::default());
    assert_eq!(tables.len(), 1);
    let t = &tables[0];
    assert_eq!((t.rows, t.columns), (4, 4));
    for cell in &t.cells {
        assert_eq!(cell.text, format!("R{}C{}", cell.row, cell.col));
    }
}
