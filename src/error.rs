//! Error types for the soc-lens library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`AnalysisError`] — **Fatal**: the analysis cannot complete at all
//!   (unreadable input, provider not configured, every chunk failed).
//!   Returned as `Err(AnalysisError)` from the top-level entry points.
//!
//! * [`TransportError`] — **Per call**: a single remote model exchange
//!   failed. A single-call analysis propagates it wrapped in
//!   [`AnalysisError::Transport`]; a multi-chunk analysis logs it and skips
//!   the chunk.
//!
//! Parse failures are deliberately absent from both: an unparseable model
//! response is represented in-band as a low-confidence stub record (see
//! [`crate::pipeline::fallback`]).

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the soc-lens library.
#[derive(Debug, Error)]
pub enum AnalysisError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// There is no text to analyze.
    #[error("Nothing to analyze: the extracted text is empty")]
    EmptyInput,

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// pdfium failed while reading the text layer of a page.
    #[error("Text extraction failed for page {page}: {detail}")]
    TextExtractionFailed { page: usize, detail: String },

    // ── Model errors ──────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The single analysis call failed at the transport level.
    #[error("Model call failed: {0}")]
    Transport(#[from] TransportError),

    /// Every chunk of a multi-chunk analysis failed; there is no partial result.
    #[error("No valid results: all {chunks} chunks failed.\nFirst error: {first_error}")]
    NoValidResults { chunks: usize, first_error: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A failed exchange with the remote model, classified by cause.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum TransportError {
    /// Nothing is listening at the endpoint (local model server not running).
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    /// The peer dropped the connection mid-exchange.
    #[error("connection reset: {0}")]
    ConnectionReset(String),

    /// The call did not complete within the configured timeout.
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The endpoint answered with a non-success status.
    #[error("HTTP {status}{}", body_suffix(.body))]
    Http { status: u16, body: Option<String> },

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Whether retrying the same request could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::ConnectionReset(_) | TransportError::Timeout { .. } => true,
            TransportError::Http { status, .. } => *status == 429 || *status >= 500,
            TransportError::ConnectionRefused(_) | TransportError::Other(_) => false,
        }
    }

    /// Map a free-form error message from a provider library onto the taxonomy.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("connection refused") || lower.contains("econnrefused") {
            TransportError::ConnectionRefused(message)
        } else if lower.contains("connection reset") || lower.contains("econnreset") {
            TransportError::ConnectionReset(message)
        } else if lower.contains("timed out") || lower.contains("timeout") {
            TransportError::Timeout { secs: 0 }
        } else if let Some(status) = extract_status(&lower) {
            TransportError::Http {
                status,
                body: Some(message),
            }
        } else {
            TransportError::Other(message)
        }
    }
}

fn body_suffix(body: &Option<String>) -> String {
    body.as_deref().map(|b| format!(": {b}")).unwrap_or_default()
}

/// Find a 4xx/5xx status code in an error message such as "status 429" or "HTTP 503".
fn extract_status(lower: &str) -> Option<u16> {
    ["status", "http"].iter().find_map(|label| {
        let idx = lower.find(label)?;
        let rest = lower[idx + label.len()..].trim_start_matches([' ', ':', '=']);
        let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
        digits
            .parse::<u16>()
            .ok()
            .filter(|code| (400..600).contains(code))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_valid_results_display() {
        let e = AnalysisError::NoValidResults {
            chunks: 4,
            first_error: "HTTP 503".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("all 4 chunks"), "got: {msg}");
        assert!(msg.contains("HTTP 503"));
    }

    #[test]
    fn transport_wraps_into_analysis_error() {
        let e: AnalysisError = TransportError::Timeout { secs: 30 }.into();
        assert!(matches!(e, AnalysisError::Transport(TransportError::Timeout { secs: 30 })));
        assert!(e.to_string().contains("30s"));
    }

    #[test]
    fn http_display_with_and_without_body() {
        let with_body = TransportError::Http {
            status: 500,
            body: Some("overloaded".into()),
        };
        assert_eq!(with_body.to_string(), "HTTP 500: overloaded");
        let bare = TransportError::Http {
            status: 404,
            body: None,
        };
        assert_eq!(bare.to_string(), "HTTP 404");
    }

    #[test]
    fn retryable_classification() {
        assert!(TransportError::Timeout { secs: 1 }.is_retryable());
        assert!(TransportError::ConnectionReset("x".into()).is_retryable());
        assert!(TransportError::Http { status: 429, body: None }.is_retryable());
        assert!(TransportError::Http { status: 502, body: None }.is_retryable());
        assert!(!TransportError::Http { status: 401, body: None }.is_retryable());
        assert!(!TransportError::ConnectionRefused("x".into()).is_retryable());
    }

    #[test]
    fn classify_free_form_messages() {
        assert!(matches!(
            TransportError::classify("error sending request: Connection refused (os error 111)"),
            TransportError::ConnectionRefused(_)
        ));
        assert!(matches!(
            TransportError::classify("Connection reset by peer"),
            TransportError::ConnectionReset(_)
        ));
        assert!(matches!(
            TransportError::classify("operation timed out"),
            TransportError::Timeout { .. }
        ));
        assert!(matches!(
            TransportError::classify("API error: status 429 Too Many Requests"),
            TransportError::Http { status: 429, .. }
        ));
        assert!(matches!(
            TransportError::classify("invalid model"),
            TransportError::Other(_)
        ));
    }
}
