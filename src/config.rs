//! Configuration types for report analysis.
//!
//! All analysis behaviour is controlled through [`AnalysisConfig`], built
//! via its [`AnalysisConfigBuilder`]. Table-detection thresholds live in a
//! nested [`TableDetectionConfig`] because [`crate::analyze::extract_tables`]
//! needs them without any model settings.

use crate::error::AnalysisError;
use crate::pipeline::transport::ModelTransport;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Thresholds for the geometric table heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TableDetectionConfig {
    /// Max baseline difference (page units) for two glyphs to share a row. Default: 3.0.
    pub row_tolerance: f32,

    /// Minimum glyphs for a row to count as a table row, and minimum
    /// columns for a table to be accepted. Default: 3.
    pub min_cols: usize,

    /// Minimum consecutive table rows for a table. Default: 3.
    pub min_rows: usize,

    /// Fraction of column gaps that must sit near the mean gap. Default: 0.9.
    pub gap_consistency: f32,

    /// Allowed relative deviation of a gap from the mean gap. Default: 0.5.
    pub gap_deviation: f32,
}

impl Default for TableDetectionConfig {
    fn default() -> Self {
        Self {
            row_tolerance: 3.0,
            min_cols: 3,
            min_rows: 3,
            gap_consistency: 0.9,
            gap_deviation: 0.5,
        }
    }
}

impl TableDetectionConfig {
    fn validate(&self) -> Result<(), AnalysisError> {
        if self.row_tolerance.is_nan() || self.row_tolerance < 0.0 {
            return Err(AnalysisError::InvalidConfig(format!(
                "row tolerance must be ≥ 0, got {}",
                self.row_tolerance
            )));
        }
        // A row needs two glyphs before it has a gap to measure.
        if self.min_cols < 2 || self.min_rows < 1 {
            return Err(AnalysisError::InvalidConfig(format!(
                "table minimums must be ≥ 2 columns and ≥ 1 row, got {}×{}",
                self.min_rows, self.min_cols
            )));
        }
        if !self.gap_deviation.is_finite() || self.gap_deviation <= 0.0 {
            return Err(AnalysisError::InvalidConfig(format!(
                "gap deviation must be a positive fraction of the mean gap, got {}",
                self.gap_deviation
            )));
        }
        if !(self.gap_consistency > 0.0 && self.gap_consistency <= 1.0) {
            return Err(AnalysisError::InvalidConfig(format!(
                "gap consistency must be in (0, 1], got {}",
                self.gap_consistency
            )));
        }
        Ok(())
    }
}

/// Configuration for a report analysis.
///
/// # Example
/// ```rust
/// use soc_lens::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .model("gpt-4.1-mini")
///     .token_budget(8000)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// Model identifier, e.g. "gpt-4.1-mini", "llama3.1:8b".
    /// If None, uses the provider default.
    pub model: Option<String>,

    /// edgequake-llm provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// OpenAI-compatible chat-completions URL. When set, requests go through
    /// [`crate::pipeline::transport::HttpTransport`].
    pub endpoint: Option<String>,

    /// Pre-constructed transport. Takes precedence over everything else.
    pub transport: Option<Arc<dyn ModelTransport>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate per call. Default: 4096.
    pub max_tokens: usize,

    /// Input budget per call in approximate tokens (characters ÷ 4). Default: 12000.
    ///
    /// Text above this budget is split into chunks analysed one after another.
    pub token_budget: usize,

    /// Retries per call for retryable transport errors. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Treat the model as a lower-reliability local model and enable the
    /// aggressive JSON repair strategy. Default: false (auto-on for ollama / lmstudio).
    pub local_model: bool,

    /// Custom system prompt. If None, uses the built-in one.
    pub system_prompt: Option<String>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Geometric table heuristic thresholds.
    pub tables: TableDetectionConfig,

    /// Optional progress sink.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            endpoint: None,
            transport: None,
            temperature: 0.1,
            max_tokens: 4096,
            token_budget: 12_000,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            local_model: false,
            system_prompt: None,
            password: None,
            tables: TableDetectionConfig::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("endpoint", &self.endpoint)
            .field("transport", &self.transport.as_ref().map(|_| "<dyn ModelTransport>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("token_budget", &self.token_budget)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("local_model", &self.local_model)
            .field("tables", &self.tables)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn AnalysisProgressCallback>"),
            )
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }

    /// Character budget per call derived from the token budget.
    pub fn char_budget(&self) -> usize {
        self.token_budget * crate::pipeline::chunk::CHARS_PER_TOKEN
    }

    /// Whether responses should get the aggressive repair pass.
    pub fn is_local_model(&self) -> bool {
        self.local_model
            || matches!(
                self.provider_name.as_deref(),
                Some("ollama") | Some("lmstudio") | Some("lm-studio")
            )
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = Some(url.into());
        self
    }

    pub fn transport(mut self, transport: Arc<dyn ModelTransport>) -> Self {
        self.config.transport = Some(transport);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn token_budget(mut self, n: usize) -> Self {
        self.config.token_budget = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn local_model(mut self, v: bool) -> Self {
        self.config.local_model = v;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn tables(mut self, tables: TableDetectionConfig) -> Self {
        self.config.tables = tables;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, AnalysisError> {
        let c = &self.config;
        if c.token_budget < 100 {
            return Err(AnalysisError::InvalidConfig(format!(
                "token budget must be ≥ 100, got {}",
                c.token_budget
            )));
        }
        if c.max_tokens == 0 {
            return Err(AnalysisError::InvalidConfig("max tokens must be ≥ 1".into()));
        }
        c.tables.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = AnalysisConfig::default();
        assert_eq!(c.token_budget, 12_000);
        assert_eq!(c.char_budget(), 48_000);
        assert_eq!(c.tables.min_cols, 3);
        assert_eq!(c.tables.min_rows, 3);
        assert!((c.tables.gap_consistency - 0.9).abs() < f32::EPSILON);
        assert!(!c.is_local_model());
    }

    #[test]
    fn builder_rejects_tiny_budget() {
        let err = AnalysisConfig::builder().token_budget(10).build().unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_bad_table_thresholds() {
        let tables = TableDetectionConfig {
            gap_consistency: 1.5,
            ..Default::default()
        };
        assert!(AnalysisConfig::builder().tables(tables).build().is_err());
    }

    #[test]
    fn builder_rejects_non_positive_gap_deviation() {
        for gap_deviation in [-0.5, 0.0, f32::NAN, f32::INFINITY] {
            let tables = TableDetectionConfig {
                gap_deviation,
                ..Default::default()
            };
            let err = AnalysisConfig::builder().tables(tables).build().unwrap_err();
            assert!(matches!(err, AnalysisError::InvalidConfig(_)), "{gap_deviation}");
        }
    }

    #[test]
    fn builder_rejects_single_column_tables() {
        let tables = TableDetectionConfig {
            min_cols: 1,
            ..Default::default()
        };
        assert!(AnalysisConfig::builder().tables(tables).build().is_err());
        let tables = TableDetectionConfig {
            min_cols: 2,
            min_rows: 1,
            ..Default::default()
        };
        assert!(AnalysisConfig::builder().tables(tables).build().is_ok());
    }

    #[test]
    fn ollama_counts_as_local() {
        let c = AnalysisConfig::builder()
            .provider_name("ollama")
            .build()
            .unwrap();
        assert!(c.is_local_model());
        let c = AnalysisConfig::builder().local_model(true).build().unwrap();
        assert!(c.is_local_model());
    }

    #[test]
    fn temperature_is_clamped() {
        let c = AnalysisConfig::builder().temperature(9.0).build().unwrap();
        assert_eq!(c.temperature, 2.0);
    }
}
