//! Request → workflow dispatch.
//!
//! Turns one validated request into the event sequence the SSE layer
//! streams: either a single cache-hit terminal event, or the workflow's
//! progress events followed by exactly one terminal event.

use crate::state::AppState;
use base64::Engine;
use chrono::SecondsFormat;
use docgen_cache::CacheKey;
use docgen_core::{
    ArtifactKind, CacheHitEvent, CompleteEvent, ErrorEvent, OutputMetadata, WorkflowEvent,
    WorkflowState, canonical_source_digest, classify_message,
};
use docgen_graph::{CancelSignal, progress_channel};
use docgen_workflow::{apply_step_metadata, build_graph};
use serde_json::json;
use tokio::sync::mpsc;

/// Kinds whose artifacts are cached by content-addressed key. Image
/// kinds are keyed by request body alone and never reach the cache.
fn is_cacheable(kind: ArtifactKind) -> bool {
    !matches!(kind, ArtifactKind::ImageGenerate | ArtifactKind::ImageEdit)
}

/// Compute the cache key for a prepared workflow state.
pub fn cache_key_for(state: &WorkflowState) -> CacheKey {
    CacheKey::compute(
        state.artifact_kind,
        state.provider.as_str(),
        &state.model,
        state.image_model.as_deref(),
        &state.preferences,
        &canonical_source_digest(&state.sources),
    )
}

/// Try to satisfy the request from the cache. Returns the terminal event
/// on a hit.
pub fn try_cache_hit(app: &AppState, key: &CacheKey) -> Option<WorkflowEvent> {
    let cached = app.ctx.cache.get(key)?;
    let path = app.ctx.storage.output_root().join(&cached.file_path);
    let download_url = app.ctx.storage.download_url(&path);
    let mut event = CacheHitEvent::new(
        download_url,
        cached.file_path.clone(),
        cached.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    );

    let limit = app.settings().max_inline_preview_bytes;
    let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
    if limit > 0 && size <= limit {
        match path.extension().and_then(|e| e.to_str()).map(|e| e.to_lowercase()).as_deref() {
            Some("pdf") => {
                if let Ok(bytes) = std::fs::read(&path) {
                    event.pdf_base64 =
                        Some(base64::engine::general_purpose::STANDARD.encode(bytes));
                }
            }
            Some("md") => {
                event.markdown_content = std::fs::read_to_string(&path).ok();
            }
            _ => {}
        }
    } else {
        tracing::info!(size, limit, "skipping inline preview for cached artifact");
    }
    Some(WorkflowEvent::CacheHit(event))
}

fn terminal_for(
    app: &AppState,
    final_state: &WorkflowState,
    was_cancelled: bool,
    key: Option<&CacheKey>,
) -> WorkflowEvent {
    if was_cancelled {
        return WorkflowEvent::cancelled();
    }
    if final_state.completed {
        if let Some(path) = &final_state.output_path {
            let rel = app.ctx.storage.relative_path(path);
            let url = app.ctx.storage.download_url(path);
            let usage = app.ctx.usage.snapshot();

            let mut event = CompleteEvent::new(url.clone(), rel.clone());
            event.session_id = Some(final_state.session_id.as_ref().to_string());
            event.metadata = OutputMetadata {
                title: final_state
                    .meta_str("title")
                    .map(str::to_string)
                    .or_else(|| final_state.structured_content.as_ref().map(|s| s.title.clone())),
                pages: final_state.meta_u64("page_count").map(|p| p as u32),
                slides: final_state
                    .structured_content
                    .as_ref()
                    .and_then(|s| s.slides.as_ref())
                    .map(|s| s.len() as u32),
                images_generated: final_state.meta_u64("images_generated").unwrap_or(0) as u32,
                llm_calls: usage.total_calls,
                models_used: usage.models,
            };

            if let Some(key) = key {
                let content_hash = final_state
                    .structured_content
                    .as_ref()
                    .map(|s| s.content_hash.clone())
                    .or_else(|| final_state.content_hash.clone())
                    .unwrap_or_default();
                let metadata = serde_json::to_value(&event.metadata).unwrap_or(json!({}));
                if let Err(e) = app.ctx.cache.put(
                    key,
                    &final_state.session_id,
                    final_state.artifact_kind,
                    &rel,
                    &url,
                    &content_hash,
                    metadata,
                ) {
                    // The run's result is uncached but still returned.
                    tracing::error!(error = %e, "failed to cache produced artifact");
                }
            }
            return WorkflowEvent::Complete(event);
        }
    }
    let message = final_state.last_error().unwrap_or("generation produced no output").to_string();
    let code = classify_message(&message);
    WorkflowEvent::Error(ErrorEvent::new(message, code.as_str()))
}

/// Run the workflow for a prepared state, streaming events into the
/// returned receiver. The final event is always terminal; the sender
/// side closes afterwards.
pub fn run_workflow(
    app: &AppState,
    mut state: WorkflowState,
    reuse_cache: bool,
    cancel: CancelSignal,
) -> mpsc::Receiver<WorkflowEvent> {
    let (bus, rx) = progress_channel();
    let key = is_cacheable(state.artifact_kind).then(|| cache_key_for(&state));

    if reuse_cache {
        if let Some(hit) = key.as_ref().and_then(|key| try_cache_hit(app, key)) {
            let bus = bus.clone();
            tokio::spawn(async move {
                bus.emit(hit).await;
            });
            return rx;
        }
    }

    apply_step_metadata(&mut state);
    let app = app.clone();
    tokio::spawn(async move {
        let graph = build_graph(state.artifact_kind, app.ctx.clone());
        let (final_state, was_cancelled) = graph.execute(state, bus.clone(), cancel).await;
        let terminal = terminal_for(&app, &final_state, was_cancelled, key.as_ref());
        bus.emit(terminal).await;
    });
    rx
}
