//! One analysis call: prompt, send, retry, normalize, parse.
//!
//! All prompt wording lives in [`crate::prompts`] and all response
//! interpretation in [`crate::pipeline::normalize`] /
//! [`crate::pipeline::parse`], so this module is only about getting a
//! response back.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 5xx, resets and timeouts are transient. Exponential backoff
//! (`retry_backoff_ms * 2^(attempt-1)`) avoids hammering a rate-limited
//! endpoint: with 500 ms base and 2 retries the waits are 500 ms then 1 s.
//! A single wait never exceeds one minute, however many retries are allowed.
//! Refused connections and 4xx errors fail immediately, since repeating the
//! same request cannot fix a stopped server or a bad key.

use crate::config::AnalysisConfig;
use crate::error::TransportError;
use crate::pipeline::normalize::normalize_response;
use crate::pipeline::parse::parse_structured;
use crate::pipeline::transport::{ModelRequest, ModelTransport};
use crate::prompts::{build_user_message, system_prompt};
use crate::record::StructuredRecord;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Analyse one piece of text with the model.
///
/// `chunk` is `(number, total)` for multi-chunk analyses. Only transport
/// failures surface as errors; an unusable response still yields a record
/// (possibly a stub).
pub async fn analyze_chunk(
    transport: &dyn ModelTransport,
    text: &str,
    chunk: Option<(usize, usize)>,
    config: &AnalysisConfig,
) -> Result<StructuredRecord, TransportError> {
    let request = build_request(text, chunk, config);
    let label = chunk
        .map(|(n, total)| format!("chunk {n}/{total}"))
        .unwrap_or_else(|| "document".to_string());

    let start = Instant::now();
    let envelope = call_with_retry(transport, &request, config, &label).await?;
    let response_text = normalize_response(&envelope);
    debug!(
        "{}: {} response chars in {:?}",
        label,
        response_text.len(),
        start.elapsed()
    );

    Ok(parse_structured(&response_text, config.is_local_model()))
}

pub(crate) fn build_request(
    text: &str,
    chunk: Option<(usize, usize)>,
    config: &AnalysisConfig,
) -> ModelRequest {
    ModelRequest {
        system: system_prompt(config.system_prompt.as_deref(), config.is_local_model()),
        user: build_user_message(text, chunk),
        model: config.model.clone(),
        temperature: config.temperature,
        max_tokens: config.max_tokens,
    }
}

/// Upper bound on a single retry delay.
const MAX_BACKOFF_MS: u64 = 60_000;

/// Delay before retry `attempt` (1-indexed): `base × 2^(attempt-1)`, capped.
fn backoff_ms(base: u64, attempt: u32) -> u64 {
    let factor = 2u64
        .checked_pow(attempt.saturating_sub(1))
        .unwrap_or(u64::MAX);
    base.saturating_mul(factor).min(MAX_BACKOFF_MS)
}

async fn call_with_retry(
    transport: &dyn ModelTransport,
    request: &ModelRequest,
    config: &AnalysisConfig,
    label: &str,
) -> Result<serde_json::Value, TransportError> {
    let limit = Duration::from_secs(config.api_timeout_secs);
    let mut attempt = 0u32;

    loop {
        if attempt > 0 {
            let backoff = backoff_ms(config.retry_backoff_ms, attempt);
            warn!(
                "{}: retry {}/{} after {}ms",
                label, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        let result = match timeout(limit, transport.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                secs: config.api_timeout_secs,
            }),
        };

        match result {
            Ok(envelope) => return Ok(envelope),
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                warn!("{}: attempt {} failed: {}", label, attempt + 1, e);
                attempt += 1;
            }
            Err(e) => {
                warn!("{}: giving up after {} attempt(s): {}", label, attempt + 1, e);
                return Err(e);
            }
        }
    }
}
