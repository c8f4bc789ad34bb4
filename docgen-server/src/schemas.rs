use docgen_core::{ArtifactKind, Preferences, Provider, Source, Speaker};
use serde::{Deserialize, Serialize};

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CacheOptions {
    pub reuse: bool,
}

/// Body of `POST /generate`.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    pub sources: Vec<Source>,
    pub output_format: ArtifactKind,
    #[serde(default)]
    pub provider: Provider,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub image_model: Option<String>,
    #[serde(default)]
    pub preferences: Preferences,
    #[serde(default)]
    pub cache: CacheOptions,
    // Image branch parameters (kind image_generate / image_edit)
    #[serde(default)]
    pub image_prompt: Option<String>,
    #[serde(default)]
    pub image_source_base64: Option<String>,
    #[serde(default)]
    pub image_edit_mode: Option<String>,
}

/// Body of `POST /generate/podcast`.
#[derive(Debug, Clone, Deserialize)]
pub struct PodcastRequest {
    pub sources: Vec<Source>,
    #[serde(default)]
    pub provider: Provider,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub speakers: Vec<Speaker>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub cache: CacheOptions,
}

/// Body of `POST /generate/mindmap`.
#[derive(Debug, Clone, Deserialize)]
pub struct MindMapRequest {
    pub sources: Vec<Source>,
    #[serde(default)]
    pub provider: Provider,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub cache: CacheOptions,
}

/// Body of `POST /generate/faq`.
#[derive(Debug, Clone, Deserialize)]
pub struct FaqRequest {
    pub sources: Vec<Source>,
    #[serde(default)]
    pub provider: Provider,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub cache: CacheOptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    pub file_id: String,
    pub filename: String,
    pub size: u64,
    pub mime_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub created_at: String,
    pub outputs_generated: Vec<ArtifactKind>,
    pub last_generated: Option<String>,
    pub last_generated_at: String,
}
