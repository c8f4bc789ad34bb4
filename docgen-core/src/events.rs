use serde::{Deserialize, Serialize};

/// Status groups nodes report progress under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepGroup {
    Parsing,
    Transforming,
    GeneratingImages,
    GeneratingOutput,
    Uploading,
}

impl StepGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepGroup::Parsing => "parsing",
            StepGroup::Transforming => "transforming",
            StepGroup::GeneratingImages => "generating_images",
            StepGroup::GeneratingOutput => "generating_output",
            StepGroup::Uploading => "uploading",
        }
    }
}

/// Progress payload streamed while a workflow runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub status: StepGroup,
    /// Percentage in `[0, 100]`, monotone non-decreasing per execution.
    pub progress: u8,
    pub message: String,
}

/// Summary metadata attached to a terminal `Complete` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OutputMetadata {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pages: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub slides: Option<u32>,
    #[serde(default)]
    pub images_generated: u32,
    #[serde(default)]
    pub llm_calls: u32,
    #[serde(default)]
    pub models_used: Vec<String>,
}

/// Terminal success payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteEvent {
    pub status: String,
    pub download_url: String,
    pub file_path: String,
    pub expires_in: u64,
    pub metadata: OutputMetadata,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub session_id: Option<String>,
}

impl CompleteEvent {
    pub fn new(download_url: impl Into<String>, file_path: impl Into<String>) -> Self {
        Self {
            status: "complete".into(),
            download_url: download_url.into(),
            file_path: file_path.into(),
            expires_in: 3600,
            metadata: OutputMetadata::default(),
            session_id: None,
        }
    }
}

/// Terminal payload for a prior artifact served from the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheHitEvent {
    pub status: String,
    pub download_url: String,
    pub file_path: String,
    pub expires_in: u64,
    pub cached_at: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pdf_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub markdown_content: Option<String>,
}

impl CacheHitEvent {
    pub fn new(
        download_url: impl Into<String>,
        file_path: impl Into<String>,
        cached_at: impl Into<String>,
    ) -> Self {
        Self {
            status: "cache_hit".into(),
            download_url: download_url.into(),
            file_path: file_path.into(),
            expires_in: 3600,
            cached_at: cached_at.into(),
            pdf_base64: None,
            markdown_content: None,
        }
    }
}

/// Terminal failure payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub status: String,
    pub error: String,
    pub code: String,
}

impl ErrorEvent {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self { status: "error".into(), error: error.into(), code: code.into() }
    }
}

/// Events emitted by a workflow execution, in FIFO order. Exactly one
/// terminal event closes every stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkflowEvent {
    Progress(ProgressEvent),
    Complete(CompleteEvent),
    CacheHit(CacheHitEvent),
    Error(ErrorEvent),
    Cancelled { status: String },
}

impl WorkflowEvent {
    pub fn cancelled() -> Self {
        WorkflowEvent::Cancelled { status: "cancelled".into() }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkflowEvent::Progress(_))
    }

    /// SSE event name for this payload.
    pub fn sse_event(&self) -> &'static str {
        match self {
            WorkflowEvent::Progress(_) => "progress",
            WorkflowEvent::Complete(_) => "complete",
            WorkflowEvent::CacheHit(_) => "cache_hit",
            WorkflowEvent::Error(_) => "error",
            WorkflowEvent::Cancelled { .. } => "cancelled",
        }
    }
}

/// Map a step index into the generation progress span.
///
/// Steps advance linearly within `[30, 90]`; the dispatcher owns the
/// endpoints (0 at accept, 100 at completion).
pub fn progress_for_step(step_number: u32, total_steps: u32) -> u8 {
    if total_steps <= 1 {
        return 30;
    }
    let step = step_number.min(total_steps).max(1);
    let span = 60.0 * (step - 1) as f64 / (total_steps - 1) as f64;
    (30.0 + span).round() as u8
}
