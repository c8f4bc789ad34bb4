use crate::context::WorkflowContext;
use crate::prompts::output_slug;
use async_trait::async_trait;
use docgen_core::{Result, StepGroup, WorkflowState, is_retryable_message};
use docgen_graph::{NodeContext, WorkflowNode};
use std::sync::Arc;

/// Renders the structured content through the registered renderer for
/// this artifact kind. The output lands at a deterministic path:
/// `<session>/<kind dir>/<slug>.<ext>`.
pub struct GenerateOutputNode {
    ctx: Arc<WorkflowContext>,
}

impl GenerateOutputNode {
    pub fn new(ctx: Arc<WorkflowContext>) -> Self {
        Self { ctx }
    }

    fn persist_structured_cache(&self, state: &WorkflowState) {
        let Some(structured) = &state.structured_content else { return };
        let path =
            self.ctx.settings.cache_root.join(format!("{}_content_cache.json", state.session_id));
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(structured) {
            Ok(body) => {
                if let Err(e) = std::fs::write(&path, body) {
                    tracing::warn!(error = %e, "failed to cache structured content");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize structured content"),
        }
    }
}

#[async_trait]
impl WorkflowNode for GenerateOutputNode {
    fn name(&self) -> &str {
        "generate_output"
    }

    fn step_group(&self) -> StepGroup {
        StepGroup::GeneratingOutput
    }

    async fn run(&self, state: &mut WorkflowState, ctx: &NodeContext) -> Result<()> {
        // Retryable errors from a prior attempt don't block re-rendering.
        if state.errors.iter().any(|e| !is_retryable_message(e)) {
            return Ok(());
        }
        let Some(structured) = state.structured_content.clone() else {
            state.push_error("Generation failed: no structured content to render");
            return Ok(());
        };
        ctx.emit_progress(StepGroup::GeneratingOutput, "Rendering output").await;

        let renderer = match self.ctx.renderers.get(state.artifact_kind.renderer_id()) {
            Ok(renderer) => renderer,
            Err(e) => {
                state.push_error(format!("Generation failed: {e}"));
                return Ok(());
            }
        };
        let session_dir = self.ctx.storage.session_dir(&state.session_id)?;
        let dest_dir = session_dir.join(state.artifact_kind.output_subdir());
        let slug = output_slug(&structured.title);

        match renderer.render(&structured, &dest_dir, &slug) {
            Ok(path) => {
                tracing::info!(path = %path.display(), "output rendered");
                state.output_path = Some(path);
                self.persist_structured_cache(state);
            }
            Err(e) => state.push_error(format!("Generation failed: {e}")),
        }
        Ok(())
    }
}

/// Verifies the rendered file exists, is non-empty, and carries the
/// extension expected for the artifact kind. A pass clears earlier
/// retryable errors so the retry edge can settle.
pub struct ValidateOutputNode;

#[async_trait]
impl WorkflowNode for ValidateOutputNode {
    fn name(&self) -> &str {
        "validate_output"
    }

    fn step_group(&self) -> StepGroup {
        StepGroup::GeneratingOutput
    }

    async fn run(&self, state: &mut WorkflowState, _ctx: &NodeContext) -> Result<()> {
        if state.errors.iter().any(|e| !is_retryable_message(e)) {
            return Ok(());
        }
        let Some(path) = state.output_path.clone() else {
            state.push_error("Validation failed: no output path specified");
            return Ok(());
        };

        let expected_ext = state.artifact_kind.expected_extension();
        let actual_ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()))
            .unwrap_or_default();

        if !path.exists() {
            state.push_error(format!("Validation failed: output file not found: {}", path.display()));
        } else if std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0) == 0 {
            state.push_error(format!("Validation failed: output file is empty: {}", path.display()));
        } else if !expected_ext.is_empty() && actual_ext != expected_ext {
            state.push_error(format!(
                "Validation failed: wrong extension {actual_ext}, expected {expected_ext}"
            ));
        } else {
            // Valid output: the run can complete even after earlier
            // retryable failures.
            state.errors.retain(|e| !is_retryable_message(e));
            state.completed = true;
            tracing::info!(path = %path.display(), "output validated");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{DocumentRenderer, RendererRegistry};
    use docgen_core::{
        ArtifactKind, DocgenError, Provider, SessionId, Settings, StructuredContent,
    };
    use docgen_graph::{CancelSignal, progress_channel};
    use docgen_llm::UsageRegistry;
    use docgen_llm::testing::{ScriptedGateway, StubImageModel, StubSpeech};
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    /// Renderer that writes an empty file for the first N calls.
    #[derive(Debug)]
    struct FlakyRenderer {
        empty_calls: Mutex<u32>,
        calls: Mutex<u32>,
    }

    impl FlakyRenderer {
        fn new(empty_calls: u32) -> Self {
            Self { empty_calls: Mutex::new(empty_calls), calls: Mutex::new(0) }
        }
    }

    impl DocumentRenderer for FlakyRenderer {
        fn extension(&self) -> &'static str {
            "md"
        }

        fn render(
            &self,
            content: &StructuredContent,
            dest_dir: &Path,
            slug: &str,
        ) -> docgen_core::Result<PathBuf> {
            *self.calls.lock().unwrap() += 1;
            std::fs::create_dir_all(dest_dir)?;
            let path = dest_dir.join(format!("{slug}.md"));
            let mut remaining = self.empty_calls.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                std::fs::write(&path, b"")?;
            } else {
                std::fs::write(&path, content.markdown.as_bytes())?;
            }
            Ok(path)
        }
    }

    fn ctx_with_renderers(dir: &std::path::Path, renderers: RendererRegistry) -> Arc<WorkflowContext> {
        Arc::new(WorkflowContext::with_collaborators(
            Settings::default().with_output_root(dir.join("o")).with_cache_root(dir.join("c")),
            Arc::new(ScriptedGateway::replying(&[])),
            Arc::new(StubImageModel::new(vec![0])),
            Arc::new(StubSpeech::new(8)),
            Arc::new(UsageRegistry::new()),
            renderers,
        ))
    }

    fn node_ctx() -> (NodeContext, tokio::sync::mpsc::Receiver<docgen_core::WorkflowEvent>) {
        let (bus, rx) = progress_channel();
        (NodeContext { bus, cancel: CancelSignal::new(), step_number: 10, total_steps: 11 }, rx)
    }

    fn doc_state() -> WorkflowState {
        let mut state = WorkflowState::new(
            ArtifactKind::ArticleMarkdown,
            Provider::Gemini,
            "m0",
            SessionId::new("s1"),
            vec![],
        );
        state.structured_content = Some(StructuredContent {
            title: "Title".into(),
            markdown: "# Title\n\nbody".into(),
            content_hash: "h".into(),
            ..Default::default()
        });
        state
    }

    #[tokio::test]
    async fn test_render_validate_success() {
        let dir = tempfile::tempdir().unwrap();
        let ctx_arc = ctx_with_renderers(dir.path(), RendererRegistry::new());
        let mut state = doc_state();
        let (ctx, _rx) = node_ctx();

        GenerateOutputNode::new(ctx_arc).run(&mut state, &ctx).await.unwrap();
        let path = state.output_path.clone().unwrap();
        assert!(path.to_string_lossy().ends_with("markdown/title.md"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# Title\n\nbody");

        ValidateOutputNode.run(&mut state, &ctx).await.unwrap();
        assert!(state.completed);
        assert!(state.errors.is_empty());
    }

    #[tokio::test]
    async fn test_missing_renderer_is_generation_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = doc_state();
        state.artifact_kind = ArtifactKind::PresentationPptx;
        let ctx_arc = ctx_with_renderers(dir.path(), RendererRegistry::new());
        let (ctx, _rx) = node_ctx();

        GenerateOutputNode::new(ctx_arc).run(&mut state, &ctx).await.unwrap();
        let last = state.last_error().unwrap();
        assert!(last.contains("Generation failed"));
        assert!(is_retryable_message(last));
    }

    #[tokio::test]
    async fn test_empty_file_fails_validation_then_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let mut renderers = RendererRegistry::empty();
        renderers.register("markdown", Arc::new(FlakyRenderer::new(1)));
        let ctx_arc = ctx_with_renderers(dir.path(), renderers);
        let mut state = doc_state();
        let (ctx, _rx) = node_ctx();

        // First attempt: empty file, validation fails.
        GenerateOutputNode::new(ctx_arc.clone()).run(&mut state, &ctx).await.unwrap();
        ValidateOutputNode.run(&mut state, &ctx).await.unwrap();
        assert!(state.last_error().unwrap().contains("Validation failed"));
        assert!(!state.completed);

        // Retry: real file, validation clears the retryable error.
        GenerateOutputNode::new(ctx_arc).run(&mut state, &ctx).await.unwrap();
        ValidateOutputNode.run(&mut state, &ctx).await.unwrap();
        assert!(state.completed);
        assert!(state.errors.is_empty());
    }

    #[tokio::test]
    async fn test_wrong_extension_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = doc_state();
        state.artifact_kind = ArtifactKind::ArticlePdf;
        let file = dir.path().join("out.md");
        std::fs::write(&file, "content").unwrap();
        state.output_path = Some(file);

        let (ctx, _rx) = node_ctx();
        ValidateOutputNode.run(&mut state, &ctx).await.unwrap();
        assert!(state.last_error().unwrap().contains("wrong extension"));
    }

    #[tokio::test]
    async fn test_nonretryable_error_skips_generation() {
        let dir = tempfile::tempdir().unwrap();
        let ctx_arc = ctx_with_renderers(dir.path(), RendererRegistry::new());
        let mut state = doc_state();
        state.push_error("parse failed: broken input");
        let (ctx, _rx) = node_ctx();

        GenerateOutputNode::new(ctx_arc).run(&mut state, &ctx).await.unwrap();
        assert!(state.output_path.is_none());
    }

    #[test]
    fn test_flaky_renderer_counts() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = FlakyRenderer::new(1);
        let sc = StructuredContent { markdown: "x".into(), ..Default::default() };
        let p1 = renderer.render(&sc, dir.path(), "a").unwrap();
        assert_eq!(std::fs::metadata(&p1).unwrap().len(), 0);
        let p2 = renderer.render(&sc, dir.path(), "a").unwrap();
        assert!(std::fs::metadata(&p2).unwrap().len() > 0);
        assert_eq!(*renderer.calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_generation_error_propagates_from_renderer() {
        #[derive(Debug)]
        struct FailingRenderer;
        impl DocumentRenderer for FailingRenderer {
            fn extension(&self) -> &'static str {
                "md"
            }
            fn render(
                &self,
                _content: &StructuredContent,
                _dest_dir: &Path,
                _slug: &str,
            ) -> docgen_core::Result<PathBuf> {
                Err(DocgenError::GenerationFailed("renderer exploded".into()))
            }
        }
        let dir = tempfile::tempdir().unwrap();
        let mut renderers = RendererRegistry::empty();
        renderers.register("markdown", Arc::new(FailingRenderer));
        let ctx_arc = ctx_with_renderers(dir.path(), renderers);
        let mut state = doc_state();
        let (ctx, _rx) = node_ctx();

        GenerateOutputNode::new(ctx_arc).run(&mut state, &ctx).await.unwrap();
        assert!(state.last_error().unwrap().contains("Generation failed"));
    }
}
