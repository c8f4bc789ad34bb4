use crate::fallback::{DEFAULT_GEMINI_FALLBACK_MODELS, build_model_list};
use crate::providers::{self, ProviderReply};
use crate::usage::{LlmCall, UsageRegistry};
use async_trait::async_trait;
use chrono::Utc;
use docgen_core::{DocgenError, Provider, Result};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Appended to the prompt in JSON mode in addition to the provider-native
/// response-format hint. Callers still run `safe_json_parse` on the
/// result; providers occasionally include prose anyway.
const JSON_MODE_SUFFIX: &str = "Respond with valid JSON only.";

/// One uniform text-generation call.
#[derive(Debug, Clone)]
pub struct LlmCallRequest {
    pub provider: Provider,
    pub model: String,
    pub system_prompt: Option<String>,
    pub user_prompt: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub json_mode: bool,
    pub step_name: String,
    pub api_key: String,
    /// Optional PNG attachment for vision calls, base64-encoded.
    /// Only the Gemini backend forwards it.
    pub inline_image_base64: Option<String>,
}

impl LlmCallRequest {
    pub fn new(provider: Provider, model: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            system_prompt: None,
            user_prompt: user_prompt.into(),
            max_output_tokens: 2000,
            temperature: 0.7,
            json_mode: false,
            step_name: "llm_call".into(),
            api_key: String::new(),
            inline_image_base64: None,
        }
    }

    pub fn with_inline_image(mut self, base64_png: impl Into<String>) -> Self {
        self.inline_image_base64 = Some(base64_png.into());
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_step_name(mut self, step: impl Into<String>) -> Self {
        self.step_name = step.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = key.into();
        self
    }

    pub fn with_max_output_tokens(mut self, max: u32) -> Self {
        self.max_output_tokens = max;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 1.0);
        self
    }

    pub fn with_json_mode(mut self, json_mode: bool) -> Self {
        self.json_mode = json_mode;
        self
    }
}

/// Token and timing accounting for one call. Token counts stay `None`
/// when the provider reports none.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CallUsage {
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub duration_ms: u64,
}

/// Successful call result.
#[derive(Debug, Clone)]
pub struct LlmCallOutcome {
    pub text: String,
    /// The model that actually answered (differs from the request after
    /// fallback).
    pub model_used: String,
    pub usage: CallUsage,
}

/// Uniform call interface over text-generation providers.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    async fn complete(&self, req: LlmCallRequest) -> Result<LlmCallOutcome>;
}

/// Receives `(step_name, prompt, response, metadata)` for every call.
pub trait ObservabilitySink: Send + Sync {
    fn record(&self, step_name: &str, prompt: &str, response: &str, metadata: &serde_json::Value);
}

/// Default sink: structured log lines.
pub struct TracingSink;

impl ObservabilitySink for TracingSink {
    fn record(&self, step_name: &str, prompt: &str, response: &str, metadata: &serde_json::Value) {
        tracing::debug!(
            step = step_name,
            prompt_chars = prompt.len(),
            response_chars = response.len(),
            %metadata,
            "llm call observed"
        );
    }
}

fn digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let out = hasher.finalize();
    let mut hex = String::with_capacity(16);
    for byte in &out[..8] {
        use std::fmt::Write;
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

/// REST-backed gateway over Gemini, OpenAI, and Anthropic.
///
/// Synchronous from the caller's perspective; safe to share across
/// concurrent workflow executions. Gemini calls fall back through
/// [`DEFAULT_GEMINI_FALLBACK_MODELS`] on transient overload; other
/// providers get a single attempt.
pub struct HttpLlmGateway {
    client: reqwest::Client,
    usage: Arc<UsageRegistry>,
    sink: Arc<dyn ObservabilitySink>,
    timeout: Duration,
}

impl HttpLlmGateway {
    pub fn new(usage: Arc<UsageRegistry>) -> Self {
        Self {
            client: reqwest::Client::new(),
            usage,
            sink: Arc::new(TracingSink),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ObservabilitySink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn effective_prompt(req: &LlmCallRequest) -> String {
        if req.json_mode {
            format!("{}\n\n{}", req.user_prompt, JSON_MODE_SUFFIX)
        } else {
            req.user_prompt.clone()
        }
    }

    async fn call_once(&self, req: &LlmCallRequest, model: &str, prompt: &str) -> Result<LlmCallOutcome> {
        let started = Instant::now();
        let reply: Result<ProviderReply> = match req.provider {
            Provider::Gemini => {
                providers::gemini(&self.client, req, model, prompt, self.timeout).await
            }
            Provider::Openai => {
                providers::openai(&self.client, req, model, prompt, self.timeout).await
            }
            Provider::Anthropic => {
                providers::anthropic(&self.client, req, model, prompt, self.timeout).await
            }
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        let (response_text, input_tokens, output_tokens) = match &reply {
            Ok(reply) => (reply.text.clone(), reply.input_tokens, reply.output_tokens),
            Err(_) => (String::new(), None, None),
        };

        self.usage.record(LlmCall {
            step_name: req.step_name.clone(),
            provider: req.provider.as_str().to_string(),
            model: model.to_string(),
            prompt_digest: digest(prompt),
            response_digest: digest(&response_text),
            input_tokens,
            output_tokens,
            duration_ms,
            timestamp: Utc::now(),
        });
        self.sink.record(
            &req.step_name,
            prompt,
            &response_text,
            &json!({"provider": req.provider.as_str(), "model": model, "duration_ms": duration_ms}),
        );

        reply.map(|reply| LlmCallOutcome {
            text: reply.text,
            model_used: model.to_string(),
            usage: CallUsage { input_tokens, output_tokens, duration_ms },
        })
    }
}

#[async_trait]
impl LlmGateway for HttpLlmGateway {
    async fn complete(&self, req: LlmCallRequest) -> Result<LlmCallOutcome> {
        if req.api_key.is_empty() {
            return Err(DocgenError::Auth(format!(
                "no API key for provider {}",
                req.provider
            )));
        }
        let prompt = Self::effective_prompt(&req);

        if req.provider != Provider::Gemini {
            return self.call_once(&req, &req.model, &prompt).await;
        }

        let models = build_model_list(&req.model, DEFAULT_GEMINI_FALLBACK_MODELS);
        let mut last_error: Option<DocgenError> = None;
        for model in &models {
            match self.call_once(&req, model, &prompt).await {
                Ok(outcome) => {
                    if model != &req.model {
                        tracing::info!(requested = %req.model, used = %model, "model fallback succeeded");
                    }
                    return Ok(outcome);
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!(model = %model, error = %e, "model overloaded, trying next");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| DocgenError::LlmUnavailable("no models available".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_mode_appends_instruction() {
        let req = LlmCallRequest::new(Provider::Gemini, "m0", "summarize this").with_json_mode(true);
        let prompt = HttpLlmGateway::effective_prompt(&req);
        assert!(prompt.ends_with(JSON_MODE_SUFFIX));

        let req = LlmCallRequest::new(Provider::Gemini, "m0", "summarize this");
        assert_eq!(HttpLlmGateway::effective_prompt(&req), "summarize this");
    }

    #[test]
    fn test_temperature_clamped() {
        let req = LlmCallRequest::new(Provider::Openai, "m", "p").with_temperature(3.0);
        assert_eq!(req.temperature, 1.0);
    }

    #[tokio::test]
    async fn test_missing_key_is_auth_error() {
        let gateway = HttpLlmGateway::new(Arc::new(UsageRegistry::new()));
        let err = gateway
            .complete(LlmCallRequest::new(Provider::Gemini, "m0", "hello"))
            .await
            .unwrap_err();
        assert_eq!(err.code().as_str(), "AUTH");
    }

    #[test]
    fn test_digest_is_short_hex() {
        let d = digest("prompt text");
        assert_eq!(d.len(), 16);
        assert!(d.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
