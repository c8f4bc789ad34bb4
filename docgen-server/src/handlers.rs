use crate::dispatch;
use crate::keys::ApiKeys;
use crate::schemas::{
    FaqRequest, GenerateRequest, HealthResponse, MindMapRequest, PodcastRequest, SessionResponse,
    UploadResponse,
};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
};
use chrono::SecondsFormat;
use docgen_core::{
    ArtifactKind, ErrorEvent, Provider, SessionId, Source, WorkflowEvent, WorkflowState,
};
use docgen_graph::CancelSignal;
use futures::Stream;
use serde::Deserialize;
use serde::Serialize;
use std::convert::Infallible;

/// API error response
#[derive(Serialize)]
pub struct ApiError {
    pub error: String,
}

impl ApiError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

fn err(status: StatusCode, msg: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (status, Json(ApiError::new(msg)))
}

#[derive(Debug, Deserialize, Default)]
pub struct SessionQuery {
    pub session_id: Option<String>,
}

/// Cancels the workflow when the SSE stream is dropped (client
/// disconnect).
struct CancelOnDrop(CancelSignal);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

fn sse_payload(event: &WorkflowEvent) -> Event {
    Event::default()
        .event(event.sse_event())
        .data(serde_json::to_string(event).unwrap_or_else(|_| "{}".into()))
}

/// Stream a prepared workflow state as SSE, closing on the terminal
/// event.
fn stream_workflow(
    app: AppState,
    state: WorkflowState,
    reuse_cache: bool,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let cancel = CancelSignal::new();
    let mut rx = dispatch::run_workflow(&app, state, reuse_cache, cancel.clone());

    let stream = async_stream::stream! {
        let _guard = CancelOnDrop(cancel);
        while let Some(event) = rx.recv().await {
            let terminal = event.is_terminal();
            yield Ok(sse_payload(&event));
            if terminal {
                return;
            }
        }
        // Sender dropped without a terminal event; never leave the
        // stream open without one.
        yield Ok(sse_payload(&WorkflowEvent::Error(ErrorEvent::new(
            "workflow ended unexpectedly",
            "INTERNAL",
        ))));
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Emit a single terminal error event as an SSE stream.
fn stream_error(
    error: ErrorEvent,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let event = WorkflowEvent::Error(error);
    let stream = async_stream::stream! {
        yield Ok(sse_payload(&event));
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn resolve_session(session_id: Option<String>, sources: &[Source]) -> SessionId {
    match session_id.filter(|s| !s.is_empty()) {
        Some(id) => SessionId::new(id),
        None => SessionId::derived(sources),
    }
}

#[allow(clippy::too_many_arguments)]
fn prepare_state(
    kind: ArtifactKind,
    provider: Provider,
    model: String,
    sources: Vec<Source>,
    session_id: SessionId,
    keys: &ApiKeys,
) -> Result<WorkflowState, ErrorEvent> {
    let Some(api_key) = keys.for_provider(provider) else {
        return Err(ErrorEvent::new(
            format!("missing API key for provider {provider}"),
            "AUTH",
        ));
    };
    let mut state = WorkflowState::new(kind, provider, model, session_id, sources);
    state.api_key = api_key;
    state.image_api_key = keys.for_images(provider).unwrap_or_default();
    state.gemini_api_key = keys.for_gemini().unwrap_or_default();
    state.user_id = keys.user_id.clone();
    Ok(state)
}

/// `POST /generate` — document generation stream.
pub async fn generate(
    State(app): State<AppState>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
    Json(req): Json<GenerateRequest>,
) -> Response {
    let keys = ApiKeys::from_headers(&headers);
    tracing::info!(
        provider = %req.provider,
        format = %req.output_format,
        session = ?query.session_id,
        "generate request"
    );

    let session = resolve_session(query.session_id, &req.sources);
    match prepare_state(req.output_format, req.provider, req.model, req.sources, session, &keys) {
        Ok(mut state) => {
            state.image_model = req.image_model;
            state.preferences = req.preferences;
            state.params.image_prompt = req.image_prompt;
            state.params.image_source_base64 = req.image_source_base64;
            state.params.image_edit_mode = req.image_edit_mode;
            stream_workflow(app, state, req.cache.reuse).into_response()
        }
        Err(error) => stream_error(error).into_response(),
    }
}

/// `POST /generate/podcast` — requires a Gemini key for TTS.
pub async fn generate_podcast(
    State(app): State<AppState>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
    Json(req): Json<PodcastRequest>,
) -> Response {
    let keys = ApiKeys::from_headers(&headers);
    if keys.for_gemini().is_none() {
        return stream_error(ErrorEvent::new(
            "Podcast generation requires a Gemini API key (X-Google-Key header) for TTS",
            "AUTH",
        ))
        .into_response();
    }

    let session = resolve_session(query.session_id, &req.sources);
    match prepare_state(ArtifactKind::Podcast, req.provider, req.model, req.sources, session, &keys)
    {
        Ok(mut state) => {
            state.params.style = req.style;
            state.params.speakers = req.speakers;
            state.params.duration_minutes = req.duration_minutes;
            stream_workflow(app, state, req.cache.reuse).into_response()
        }
        Err(error) => stream_error(error).into_response(),
    }
}

/// `POST /generate/mindmap`.
pub async fn generate_mindmap(
    State(app): State<AppState>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
    Json(req): Json<MindMapRequest>,
) -> Response {
    let keys = ApiKeys::from_headers(&headers);
    let session = resolve_session(query.session_id, &req.sources);
    match prepare_state(ArtifactKind::Mindmap, req.provider, req.model, req.sources, session, &keys)
    {
        Ok(mut state) => {
            state.params.mindmap_mode = req.mode;
            stream_workflow(app, state, req.cache.reuse).into_response()
        }
        Err(error) => stream_error(error).into_response(),
    }
}

/// `POST /generate/faq`.
pub async fn generate_faq(
    State(app): State<AppState>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
    Json(req): Json<FaqRequest>,
) -> Response {
    let keys = ApiKeys::from_headers(&headers);
    let session = resolve_session(query.session_id, &req.sources);
    match prepare_state(ArtifactKind::Faq, req.provider, req.model, req.sources, session, &keys) {
        Ok(state) => stream_workflow(app, state, req.cache.reuse).into_response(),
        Err(error) => stream_error(error).into_response(),
    }
}

/// `POST /upload` — multipart file upload (non-stream).
pub async fn upload(
    State(app): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, (StatusCode, Json<ApiError>)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| err(StatusCode::BAD_REQUEST, e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload.bin").to_string();
        let mime_type =
            field.content_type().unwrap_or("application/octet-stream").to_string();
        let bytes =
            field.bytes().await.map_err(|e| err(StatusCode::BAD_REQUEST, e.to_string()))?;

        let record = app
            .ctx
            .storage
            .save_upload(&bytes, &filename, &mime_type)
            .map_err(|e| err(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
        return Ok(Json(UploadResponse {
            file_id: record.file_id.as_ref().to_string(),
            filename: record.filename,
            size: record.size,
            mime_type: record.mime_type,
        }));
    }
    Err(err(StatusCode::BAD_REQUEST, "missing 'file' field"))
}

fn content_type_for(path: &std::path::Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).map(|e| e.to_lowercase()).as_deref() {
        Some("pdf") => "application/pdf",
        Some("md") => "text/markdown; charset=utf-8",
        Some("png") => "image/png",
        Some("wav") => "audio/wav",
        Some("json") => "application/json",
        Some("pptx") => {
            "application/vnd.openxmlformats-officedocument.presentationml.presentation"
        }
        _ => "application/octet-stream",
    }
}

/// `GET /download/{path}?token=…` — serves a previously produced file.
pub async fn download(
    State(app): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, (StatusCode, Json<ApiError>)> {
    // The output root is the only filesystem surface this serves.
    if path.contains("..") {
        return Err(err(StatusCode::BAD_REQUEST, "invalid path"));
    }
    let full = app.ctx.storage.output_root().join(&path);
    let bytes = std::fs::read(&full)
        .map_err(|_| err(StatusCode::NOT_FOUND, format!("not found: {path}")))?;
    Ok((
        [(header::CONTENT_TYPE, content_type_for(&full))],
        bytes,
    )
        .into_response())
}

/// `GET /health`.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", version: env!("CARGO_PKG_VERSION") })
}

/// `GET /session/{session_id}` — session manifest summary.
pub async fn session(
    State(app): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionResponse>, (StatusCode, Json<ApiError>)> {
    let session = SessionId::new(session_id.clone());
    let manifest = app
        .ctx
        .cache
        .session_manifest(&session)
        .ok_or_else(|| err(StatusCode::NOT_FOUND, format!("unknown session: {session_id}")))?;
    Ok(Json(SessionResponse {
        session_id,
        created_at: manifest.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        outputs_generated: manifest.outputs_generated.clone(),
        last_generated: manifest.last_generated().map(str::to_string),
        last_generated_at: manifest.last_generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    }))
}
