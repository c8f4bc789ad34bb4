use async_trait::async_trait;
use base64::Engine;
use docgen_core::{DocgenError, Result};
use serde_json::json;
use std::time::Duration;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default image model plus the faster fallback used after a timeout.
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
pub const FALLBACK_IMAGE_MODEL: &str = "gemini-2.0-flash-preview-image-generation";

/// One image generation or edit request.
#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub prompt: String,
    pub style: Option<String>,
    pub model: String,
    pub api_key: String,
    /// PNG bytes of the source image for edits, base64-encoded.
    pub source_base64: Option<String>,
}

impl ImageRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            style: None,
            model: model.into(),
            api_key: api_key.into(),
            source_base64: None,
        }
    }
}

/// Image provider collaborator contract. Returns raster bytes (PNG).
#[async_trait]
pub trait ImageModel: Send + Sync {
    async fn generate(&self, req: ImageRequest, timeout: Duration) -> Result<Vec<u8>>;
    async fn edit(&self, req: ImageRequest, timeout: Duration) -> Result<Vec<u8>>;
}

/// Gemini image generation over REST.
pub struct GeminiImageModel {
    client: reqwest::Client,
}

impl GeminiImageModel {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }

    async fn invoke(&self, req: &ImageRequest, timeout: Duration) -> Result<Vec<u8>> {
        let prompt = match &req.style {
            Some(style) if !style.is_empty() && style != "auto" => {
                format!("{}\n\nStyle: {style}", req.prompt)
            }
            _ => req.prompt.clone(),
        };
        let mut parts = vec![json!({"text": prompt})];
        if let Some(source) = &req.source_base64 {
            parts.push(json!({"inlineData": {"mimeType": "image/png", "data": source}}));
        }
        let body = json!({
            "contents": [{"role": "user", "parts": parts}],
            "generationConfig": {"responseModalities": ["TEXT", "IMAGE"]},
        });
        let url =
            format!("{GEMINI_BASE_URL}/models/{}:generateContent?key={}", req.model, req.api_key);

        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DocgenError::LlmTransient(format!("image generation timed out: {e}"))
                } else {
                    DocgenError::Internal(format!("image request failed: {e}"))
                }
            })?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| DocgenError::Internal(format!("image response read failed: {e}")))?;
        if !(200..300).contains(&status) {
            return Err(DocgenError::Internal(format!("image error {status}: {text}")));
        }

        let value: serde_json::Value = serde_json::from_str(&text)?;
        let parts = value["candidates"][0]["content"]["parts"]
            .as_array()
            .cloned()
            .unwrap_or_default();
        for part in parts {
            if let Some(data) = part["inlineData"]["data"].as_str() {
                return base64::engine::general_purpose::STANDARD
                    .decode(data)
                    .map_err(|e| DocgenError::Internal(format!("image decode failed: {e}")));
            }
        }
        Err(DocgenError::Internal("image response carried no raster data".into()))
    }
}

impl Default for GeminiImageModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageModel for GeminiImageModel {
    async fn generate(&self, req: ImageRequest, timeout: Duration) -> Result<Vec<u8>> {
        self.invoke(&req, timeout).await
    }

    async fn edit(&self, req: ImageRequest, timeout: Duration) -> Result<Vec<u8>> {
        if req.source_base64.is_none() {
            return Err(DocgenError::Internal("image edit requires a source image".into()));
        }
        self.invoke(&req, timeout).await
    }
}
