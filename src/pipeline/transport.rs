//! Remote model transports.
//!
//! A [`ModelTransport`] performs exactly one request/response exchange and
//! hands back the raw response envelope as JSON. It does not retry, time out
//! or interpret the payload: retries and timeouts live in
//! [`crate::pipeline::llm`], interpretation in
//! [`crate::pipeline::normalize`].
//!
//! ## Why a trait here?
//!
//! The envelope shape depends on who answers (OpenAI-style chat completions,
//! an Ollama server, a provider SDK). Keeping the exchange behind a trait
//! lets tests script responses and failures without a network, and lets
//! callers bring their own client.
//!
//! Two implementations ship with the crate:
//!
//! * [`HttpTransport`] posts to any OpenAI-compatible chat-completions URL.
//! * [`ProviderTransport`] wraps an `edgequake-llm` provider.

use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, TransportError};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use serde_json::{json, Value};
use std::error::Error as _;
use std::sync::Arc;
use tracing::{debug, info};

/// Model used when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// Longest error body kept on [`TransportError::Http`].
const MAX_ERROR_BODY_CHARS: usize = 2000;

/// One model call's inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub system: String,
    pub user: String,
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// A single request/response exchange with a remote model.
#[async_trait]
pub trait ModelTransport: Send + Sync {
    /// Send `request` and return the response envelope, whatever its shape.
    async fn complete(&self, request: &ModelRequest) -> Result<Value, TransportError>;
}

// ── HTTP ─────────────────────────────────────────────────────────────────

/// OpenAI-compatible chat-completions client.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    /// Like [`HttpTransport::new`], reading the bearer key from
    /// `SOC_LENS_API_KEY`, then `OPENAI_API_KEY`. Local servers need none.
    pub fn from_env(endpoint: impl Into<String>) -> Result<Self, TransportError> {
        let api_key = std::env::var("SOC_LENS_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .ok();
        Self::new(endpoint, api_key)
    }

    fn body(request: &ModelRequest) -> Value {
        let mut body = json!({
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user},
            ],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        if let Some(model) = &request.model {
            body["model"] = json!(model);
        }
        body
    }
}

#[async_trait]
impl ModelTransport for HttpTransport {
    async fn complete(&self, request: &ModelRequest) -> Result<Value, TransportError> {
        let mut builder = self.client.post(&self.endpoint).json(&Self::body(request));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(classify_reqwest)?;
        let status = response.status();
        let text = response.text().await.map_err(classify_reqwest)?;

        if !status.is_success() {
            let body = text.trim();
            return Err(TransportError::Http {
                status: status.as_u16(),
                body: (!body.is_empty()).then(|| body.chars().take(MAX_ERROR_BODY_CHARS).collect()),
            });
        }

        debug!("HTTP {} from {} ({} bytes)", status.as_u16(), self.endpoint, text.len());
        // A non-JSON success body is still a response; let the normalizer see it.
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

/// Map a reqwest failure onto the transport taxonomy, using the full source
/// chain since "connection refused" is usually buried in the io error.
fn classify_reqwest(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        return TransportError::Timeout { secs: 0 };
    }
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    TransportError::classify(message)
}

// ── edgequake-llm provider ───────────────────────────────────────────────

/// Adapter from an `edgequake-llm` provider to [`ModelTransport`].
///
/// The provider's typed response is re-wrapped as a chat-completions
/// envelope so every transport feeds the same normalizer.
pub struct ProviderTransport {
    provider: Arc<dyn LLMProvider>,
}

impl ProviderTransport {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ModelTransport for ProviderTransport {
    async fn complete(&self, request: &ModelRequest) -> Result<Value, TransportError> {
        let messages = vec![
            ChatMessage::system(request.system.as_str()),
            ChatMessage::user(request.user.as_str()),
        ];
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| TransportError::classify(e.to_string()))?;

        debug!(
            "{} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        Ok(json!({
            "choices": [{"message": {"role": "assistant", "content": response.content}}],
            "usage": {
                "prompt_tokens": response.prompt_tokens,
                "completion_tokens": response.completion_tokens,
            },
        }))
    }
}

// ── Resolution ───────────────────────────────────────────────────────────

fn named_provider(name: &str, model: &str) -> Result<Arc<dyn ModelTransport>, AnalysisError> {
    let provider = ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        AnalysisError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: format!("{e}"),
        }
    })?;
    info!("Using provider '{}' with model '{}'", name, model);
    Ok(Arc::new(ProviderTransport::new(provider)))
}

/// Resolve the transport, from most-specific to least-specific:
///
/// 1. **Pre-built transport** (`config.transport`), used as-is.
/// 2. **Endpoint** (`config.endpoint`): [`HttpTransport`] against that URL.
/// 3. **Named provider + model** (`config.provider_name`).
/// 4. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`.
/// 5. **OpenAI** when `OPENAI_API_KEY` is set.
/// 6. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_transport(config: &AnalysisConfig) -> Result<Arc<dyn ModelTransport>, AnalysisError> {
    if let Some(transport) = &config.transport {
        return Ok(Arc::clone(transport));
    }

    if let Some(endpoint) = &config.endpoint {
        info!("Using HTTP endpoint {}", endpoint);
        let transport = HttpTransport::from_env(endpoint.as_str())?;
        return Ok(Arc::new(transport));
    }

    if let Some(name) = &config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return named_provider(name, model);
    }

    if let (Ok(provider), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !provider.is_empty() && !model.is_empty() {
            return named_provider(&provider, &model);
        }
    }

    if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return named_provider("openai", model);
    }

    let (provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| AnalysisError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, pass --endpoint, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;
    Ok(Arc::new(ProviderTransport::new(provider)))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl ModelTransport for Echo {
        async fn complete(&self, request: &ModelRequest) -> Result<Value, TransportError> {
            Ok(json!({"response": request.user}))
        }
    }

    fn request() -> ModelRequest {
        ModelRequest {
            system: "sys".into(),
            user: "hello".into(),
            model: Some("llama3.1:8b".into()),
            temperature: 0.1,
            max_tokens: 256,
        }
    }

    #[test]
    fn http_body_is_chat_completions_shaped() {
        let body = HttpTransport::body(&request());
        assert_eq!(body["model"], "llama3.1:8b");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hello");
        assert_eq!(body["max_tokens"], 256);

        let no_model = ModelRequest {
            model: None,
            ..request()
        };
        assert!(HttpTransport::body(&no_model).get("model").is_none());
    }

    #[test]
    fn empty_api_key_is_ignored() {
        let t = HttpTransport::new("http://localhost:11434/v1/chat/completions", Some(String::new())).unwrap();
        assert!(t.api_key.is_none());
    }

    #[tokio::test]
    async fn prebuilt_transport_takes_precedence() {
        let config = AnalysisConfig::builder()
            .transport(Arc::new(Echo))
            .endpoint("http://127.0.0.1:9/unused")
            .provider_name("openai")
            .build()
            .unwrap();
        let transport = resolve_transport(&config).unwrap();
        let value = transport.complete(&request()).await.unwrap();
        assert_eq!(value["response"], "hello");
    }

    #[tokio::test]
    async fn refused_connection_is_classified() {
        // Port 9 (discard) is closed on test machines.
        let t = HttpTransport::new("http://127.0.0.1:9/v1/chat/completions", None).unwrap();
        match t.complete(&request()).await {
            Err(TransportError::ConnectionRefused(_)) => {}
            other => panic!("expected connection refused, got {other:?}"),
        }
    }
}
