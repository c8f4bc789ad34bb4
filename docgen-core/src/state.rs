use crate::types::{ArtifactKind, ContentFormat, Provider, SessionId, Source};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// One logical section of a structured document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: u32,
    pub title: String,
    pub content: String,
}

/// Diagram types a visual marker may request. Markers with any other type
/// are dropped during parsing, not errored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerType {
    Architecture,
    Flowchart,
    Comparison,
    ConceptMap,
    MindMap,
}

impl MarkerType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "architecture" => Some(MarkerType::Architecture),
            "flowchart" => Some(MarkerType::Flowchart),
            "comparison" => Some(MarkerType::Comparison),
            "concept_map" => Some(MarkerType::ConceptMap),
            "mind_map" => Some(MarkerType::MindMap),
            _ => None,
        }
    }
}

/// In-markdown placeholder requesting a diagram of a known type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualMarker {
    pub marker_id: String,
    #[serde(rename = "type")]
    pub marker_type: MarkerType,
    pub title: String,
    pub description: String,
    pub position: u32,
}

/// Kind of illustration attached to a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    Infographic,
    Decorative,
    Diagram,
    Chart,
    Mermaid,
    #[default]
    None,
}

impl ImageType {
    pub fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "infographic" => ImageType::Infographic,
            "decorative" => ImageType::Decorative,
            "diagram" => ImageType::Diagram,
            "chart" => ImageType::Chart,
            "mermaid" => ImageType::Mermaid,
            _ => ImageType::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageType::Infographic => "infographic",
            ImageType::Decorative => "decorative",
            ImageType::Diagram => "diagram",
            ImageType::Chart => "chart",
            ImageType::Mermaid => "mermaid",
            ImageType::None => "none",
        }
    }

    /// Whether this type produces a raster file via the image provider.
    /// Mermaid is deferred to the renderer; none skips entirely.
    pub fn is_generated(&self) -> bool {
        matches!(self, ImageType::Infographic | ImageType::Decorative)
    }
}

/// A generated (or reused) illustration for one section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SectionImage {
    pub section_id: u32,
    pub section_title: String,
    pub image_type: ImageType,
    pub path: String,
    pub prompt: String,
    pub confidence: f64,
    pub description: String,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub embed_base64: Option<String>,
}

/// One slide in a slide-capable artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideContent {
    pub title: String,
    pub bullets: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub speaker_notes: Option<String>,
}

/// Typed record produced by the transform step and consumed by renderers.
///
/// `content_hash` always equals the hash of the raw content that fed the
/// transform; summarization never recomputes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StructuredContent {
    pub title: String,
    pub outline: Vec<String>,
    pub sections: Vec<Section>,
    pub markdown: String,
    pub visual_markers: Vec<VisualMarker>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub executive_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub slides: Option<Vec<SlideContent>>,
    #[serde(default)]
    pub section_images: BTreeMap<u32, SectionImage>,
    pub content_hash: String,
}

/// One node of a mind-map tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MindMapNode {
    pub label: String,
    #[serde(default)]
    pub children: Vec<MindMapNode>,
}

/// Hierarchical mind-map output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MindMapTree {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    pub central_node: MindMapNode,
}

/// One FAQ entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaqItem {
    pub id: String,
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// FAQ output with deterministic tag coloring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FaqData {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub title: Option<String>,
    pub items: Vec<FaqItem>,
    #[serde(default)]
    pub tag_colors: BTreeMap<String, String>,
}

/// Speaker configuration for podcast synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Speaker {
    pub name: String,
    pub voice: String,
    pub role: String,
}

impl Speaker {
    /// Default host/co-host pair.
    pub fn default_pair() -> Vec<Speaker> {
        vec![
            Speaker { name: "Alex".into(), voice: "Kore".into(), role: "host".into() },
            Speaker { name: "Sam".into(), voice: "Puck".into(), role: "co-host".into() },
        ]
    }
}

/// One line of podcast dialogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueLine {
    pub speaker: String,
    pub text: String,
}

/// Parsed podcast script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PodcastScript {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub dialogue: Vec<DialogueLine>,
}

/// Synthesized podcast output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PodcastOutput {
    pub script: PodcastScript,
    /// Raw model text the script was parsed from.
    pub script_raw: String,
    pub audio_base64: String,
    pub duration_seconds: f64,
}

/// Output of the single-shot image branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ImageOutput {
    pub data_base64: String,
    pub output_format: String,
    pub prompt_used: String,
}

/// Caller preferences that shape generation. Serialized canonically when
/// folded into cache keys (fixed field order, defaults stripped).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub audience: String,
    pub image_style: String,
    pub max_slides: u32,
    pub enable_image_generation: bool,
    pub enable_infographics: bool,
    pub enable_decorative_headers: bool,
    pub enable_diagrams: bool,
    pub embed_images: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            audience: "general".into(),
            image_style: "auto".into(),
            max_slides: 10,
            enable_image_generation: true,
            enable_infographics: true,
            enable_decorative_headers: true,
            enable_diagrams: true,
            embed_images: false,
        }
    }
}

impl Preferences {
    /// Canonical serialization for cache keys: fixed key order, default
    /// fields stripped, enum-ish strings lowercased.
    pub fn canonical(&self) -> String {
        let defaults = Preferences::default();
        let mut parts: Vec<String> = Vec::new();
        if self.audience != defaults.audience {
            parts.push(format!("audience={}", self.audience.to_lowercase()));
        }
        if self.image_style != defaults.image_style {
            parts.push(format!("image_style={}", self.image_style.to_lowercase()));
        }
        if self.max_slides != defaults.max_slides {
            parts.push(format!("max_slides={}", self.max_slides));
        }
        if self.enable_image_generation != defaults.enable_image_generation {
            parts.push(format!("enable_image_generation={}", self.enable_image_generation));
        }
        if self.enable_infographics != defaults.enable_infographics {
            parts.push(format!("enable_infographics={}", self.enable_infographics));
        }
        if self.enable_decorative_headers != defaults.enable_decorative_headers {
            parts.push(format!("enable_decorative_headers={}", self.enable_decorative_headers));
        }
        if self.enable_diagrams != defaults.enable_diagrams {
            parts.push(format!("enable_diagrams={}", self.enable_diagrams));
        }
        if self.embed_images != defaults.embed_images {
            parts.push(format!("embed_images={}", self.embed_images));
        }
        parts.join("&")
    }
}

/// Branch-specific request parameters carried alongside the common fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BranchParams {
    // Podcast
    pub style: Option<String>,
    pub speakers: Vec<Speaker>,
    pub duration_minutes: Option<u32>,
    // Mind map
    pub mindmap_mode: Option<String>,
    // Image branch
    pub image_prompt: Option<String>,
    pub image_source_base64: Option<String>,
    pub image_edit_mode: Option<String>,
}

/// The single typed record passed between workflow nodes.
///
/// Owned exclusively by one workflow execution; nodes receive a mutable
/// view and return it. Errors are recorded in `errors`, never raised
/// across the node boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    // --- Request context ---
    pub artifact_kind: ArtifactKind,
    pub provider: Provider,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub image_model: Option<String>,
    #[serde(skip)]
    pub api_key: String,
    #[serde(skip)]
    pub image_api_key: String,
    /// Separate key for Gemini-only collaborators (TTS, vision).
    #[serde(skip)]
    pub gemini_api_key: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user_id: Option<String>,
    pub session_id: SessionId,
    pub sources: Vec<Source>,
    pub preferences: Preferences,
    #[serde(default)]
    pub params: BranchParams,

    // --- Ingest outputs ---
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub input_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub input_format: Option<ContentFormat>,
    #[serde(default)]
    pub raw_content: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub summary_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub content_hash: Option<String>,

    // --- Structure outputs ---
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub structured_content: Option<StructuredContent>,

    // --- Artifact-specific outputs ---
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub output_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub podcast: Option<PodcastOutput>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mindmap_tree: Option<MindMapTree>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub faq_data: Option<FaqData>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub image_data: Option<ImageOutput>,

    // --- Control ---
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub completed: bool,
}

impl WorkflowState {
    pub fn new(
        artifact_kind: ArtifactKind,
        provider: Provider,
        model: impl Into<String>,
        session_id: SessionId,
        sources: Vec<Source>,
    ) -> Self {
        Self {
            artifact_kind,
            provider,
            model: model.into(),
            image_model: None,
            api_key: String::new(),
            image_api_key: String::new(),
            gemini_api_key: String::new(),
            user_id: None,
            session_id,
            sources,
            preferences: Preferences::default(),
            params: BranchParams::default(),
            input_path: None,
            input_format: None,
            raw_content: String::new(),
            summary_content: None,
            content_hash: None,
            structured_content: None,
            output_path: None,
            podcast: None,
            mindmap_tree: None,
            faq_data: None,
            image_data: None,
            errors: Vec::new(),
            metadata: HashMap::new(),
            retry_count: 0,
            completed: false,
        }
    }

    /// Record a failure message; the runtime classifies it afterwards.
    pub fn push_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(error = %message, "workflow error recorded");
        self.errors.push(message);
    }

    pub fn last_error(&self) -> Option<&str> {
        self.errors.last().map(|s| s.as_str())
    }

    /// Content downstream nodes should read: the summary when one was
    /// generated, otherwise the raw concatenation.
    pub fn effective_content(&self) -> &str {
        self.summary_content.as_deref().unwrap_or(&self.raw_content)
    }

    pub fn set_meta(&mut self, key: &str, value: impl Into<Value>) {
        self.metadata.insert(key.to_string(), value.into());
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    pub fn meta_u64(&self, key: &str) -> Option<u64> {
        self.metadata.get(key).and_then(|v| v.as_u64())
    }

    pub fn meta_bool(&self, key: &str) -> Option<bool> {
        self.metadata.get(key).and_then(|v| v.as_bool())
    }
}
