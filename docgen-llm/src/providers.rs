//! Thin REST bindings for the three supported text providers.
//!
//! Each function maps one request onto the provider's wire format and
//! classifies failures: overload-shaped errors become
//! [`DocgenError::LlmTransient`] so the gateway can fall back, everything
//! else aborts.

use crate::fallback::is_transient_message;
use crate::gateway::LlmCallRequest;
use docgen_core::{DocgenError, Result};
use serde_json::{Value, json};
use std::time::Duration;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Raw provider result before usage accounting.
pub struct ProviderReply {
    pub text: String,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
}

fn classify_http_failure(status: u16, body: &str) -> DocgenError {
    let message = format!("{status}: {body}");
    if status == 503 || status == 429 || is_transient_message(&message) {
        DocgenError::LlmTransient(message)
    } else if status == 401 || status == 403 {
        DocgenError::Auth(message)
    } else {
        DocgenError::Internal(message)
    }
}

fn transport_error(e: reqwest::Error) -> DocgenError {
    let message = e.to_string();
    if is_transient_message(&message) {
        DocgenError::LlmTransient(message)
    } else {
        DocgenError::Internal(format!("provider request failed: {message}"))
    }
}

async fn post_json(
    client: &reqwest::Client,
    url: &str,
    headers: &[(&str, &str)],
    body: Value,
    timeout: Duration,
) -> Result<Value> {
    let mut request = client.post(url).timeout(timeout).json(&body);
    for (name, value) in headers {
        request = request.header(*name, *value);
    }
    let response = request.send().await.map_err(transport_error)?;
    let status = response.status().as_u16();
    let text = response.text().await.map_err(transport_error)?;
    if !(200..300).contains(&status) {
        return Err(classify_http_failure(status, &text));
    }
    serde_json::from_str(&text)
        .map_err(|e| DocgenError::Internal(format!("unparseable provider response: {e}")))
}

pub async fn gemini(
    client: &reqwest::Client,
    req: &LlmCallRequest,
    model: &str,
    prompt: &str,
    timeout: Duration,
) -> Result<ProviderReply> {
    let url = format!("{GEMINI_BASE_URL}/models/{model}:generateContent?key={}", req.api_key);
    let mut generation_config = json!({
        "temperature": req.temperature,
        "maxOutputTokens": req.max_output_tokens,
    });
    if req.json_mode {
        generation_config["responseMimeType"] = json!("application/json");
    }
    let mut parts = vec![json!({"text": prompt})];
    if let Some(image) = &req.inline_image_base64 {
        parts.push(json!({"inlineData": {"mimeType": "image/png", "data": image}}));
    }
    let mut body = json!({
        "contents": [{"role": "user", "parts": parts}],
        "generationConfig": generation_config,
    });
    if let Some(system) = &req.system_prompt {
        body["systemInstruction"] = json!({"parts": [{"text": system}]});
    }

    let value = post_json(client, &url, &[], body, timeout).await?;
    let text = value["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    if text.is_empty() {
        if let Some(message) = value["error"]["message"].as_str() {
            return Err(if is_transient_message(message) {
                DocgenError::LlmTransient(message.to_string())
            } else {
                DocgenError::Internal(message.to_string())
            });
        }
    }
    Ok(ProviderReply {
        text,
        input_tokens: value["usageMetadata"]["promptTokenCount"].as_u64().map(|v| v as u32),
        output_tokens: value["usageMetadata"]["candidatesTokenCount"].as_u64().map(|v| v as u32),
    })
}

pub async fn openai(
    client: &reqwest::Client,
    req: &LlmCallRequest,
    model: &str,
    prompt: &str,
    timeout: Duration,
) -> Result<ProviderReply> {
    let url = format!("{OPENAI_BASE_URL}/chat/completions");
    let mut messages = Vec::new();
    if let Some(system) = &req.system_prompt {
        messages.push(json!({"role": "system", "content": system}));
    }
    messages.push(json!({"role": "user", "content": prompt}));
    let mut body = json!({
        "model": model,
        "messages": messages,
        "max_tokens": req.max_output_tokens,
        "temperature": req.temperature,
    });
    if req.json_mode {
        body["response_format"] = json!({"type": "json_object"});
    }
    let auth = format!("Bearer {}", req.api_key);

    let value = post_json(client, &url, &[("Authorization", auth.as_str())], body, timeout).await?;
    Ok(ProviderReply {
        text: value["choices"][0]["message"]["content"].as_str().unwrap_or_default().to_string(),
        input_tokens: value["usage"]["prompt_tokens"].as_u64().map(|v| v as u32),
        output_tokens: value["usage"]["completion_tokens"].as_u64().map(|v| v as u32),
    })
}

pub async fn anthropic(
    client: &reqwest::Client,
    req: &LlmCallRequest,
    model: &str,
    prompt: &str,
    timeout: Duration,
) -> Result<ProviderReply> {
    let url = format!("{ANTHROPIC_BASE_URL}/messages");
    let mut body = json!({
        "model": model,
        "max_tokens": req.max_output_tokens,
        "temperature": req.temperature,
        "messages": [{"role": "user", "content": prompt}],
    });
    if let Some(system) = &req.system_prompt {
        body["system"] = json!(system);
    }

    let value = post_json(
        client,
        &url,
        &[("x-api-key", req.api_key.as_str()), ("anthropic-version", ANTHROPIC_VERSION)],
        body,
        timeout,
    )
    .await?;
    Ok(ProviderReply {
        text: value["content"][0]["text"].as_str().unwrap_or_default().to_string(),
        input_tokens: value["usage"]["input_tokens"].as_u64().map(|v| v as u32),
        output_tokens: value["usage"]["output_tokens"].as_u64().map(|v| v as u32),
    })
}
