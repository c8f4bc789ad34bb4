use crate::context::WorkflowContext;
use crate::summary::{SummaryRequest, summarize_chunked};
use async_trait::async_trait;
use docgen_core::{Result, StepGroup, WorkflowState};
use docgen_graph::{NodeContext, WorkflowNode};
use std::sync::Arc;

/// Chunked summarization of the ingested content.
///
/// The summary replaces `raw_content` for downstream nodes but the
/// content hash is never recomputed; cache keys and the image manifest
/// stay tied to the original bytes. Summarization being unavailable is
/// not fatal.
pub struct SummarizeSourcesNode {
    ctx: Arc<WorkflowContext>,
}

impl SummarizeSourcesNode {
    pub fn new(ctx: Arc<WorkflowContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl WorkflowNode for SummarizeSourcesNode {
    fn name(&self) -> &str {
        "summarize_sources"
    }

    fn step_group(&self) -> StepGroup {
        StepGroup::Parsing
    }

    async fn run(&self, state: &mut WorkflowState, ctx: &NodeContext) -> Result<()> {
        if !state.artifact_kind.requires_extraction() || state.raw_content.trim().is_empty() {
            return Ok(());
        }
        if !state.errors.is_empty() {
            return Ok(());
        }
        ctx.emit_progress(StepGroup::Parsing, "Summarizing content in chunks").await;

        state.set_meta("raw_content_chars", state.raw_content.len() as u64);
        state.set_meta("summary_generated", false);

        let request = SummaryRequest {
            provider: state.provider,
            model: &state.model,
            api_key: &state.api_key,
            audience: &state.preferences.audience,
            single_chunk_limit: self.ctx.settings.single_chunk_limit,
            chunk_limit: self.ctx.settings.chunk_limit,
        };
        let summary = match summarize_chunked(self.ctx.gateway.as_ref(), &request, &state.raw_content).await
        {
            Ok(summary) if !summary.is_empty() => summary,
            Ok(_) => {
                tracing::warn!("summarization produced no content, keeping raw content");
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(error = %e, "summarization unavailable, keeping raw content");
                return Ok(());
            }
        };

        state.set_meta("summary_chars", summary.len() as u64);
        state.set_meta("summary_generated", true);
        state.summary_content = Some(summary.clone());
        state.raw_content = summary;

        if state.artifact_kind.is_document() {
            if let Some(path) = &state.input_path {
                if let Err(e) = std::fs::write(path, state.raw_content.as_bytes()) {
                    tracing::warn!(error = %e, "failed to rewrite summary markdown");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RendererRegistry;
    use docgen_core::{ArtifactKind, Provider, SessionId, Settings, content_hash};
    use docgen_graph::{CancelSignal, progress_channel};
    use docgen_llm::UsageRegistry;
    use docgen_llm::testing::{ScriptedGateway, StubImageModel, StubSpeech};

    fn ctx_with_gateway(
        dir: &std::path::Path,
        gateway: ScriptedGateway,
        single_chunk_limit: usize,
        chunk_limit: usize,
    ) -> Arc<WorkflowContext> {
        let mut settings = Settings::default()
            .with_output_root(dir.join("output"))
            .with_cache_root(dir.join("cache"));
        settings.single_chunk_limit = single_chunk_limit;
        settings.chunk_limit = chunk_limit;
        Arc::new(WorkflowContext::with_collaborators(
            settings,
            Arc::new(gateway),
            Arc::new(StubImageModel::new(vec![0])),
            Arc::new(StubSpeech::new(8)),
            Arc::new(UsageRegistry::new()),
            RendererRegistry::new(),
        ))
    }

    fn node_ctx() -> (NodeContext, tokio::sync::mpsc::Receiver<docgen_core::WorkflowEvent>) {
        let (bus, rx) = progress_channel();
        (NodeContext { bus, cancel: CancelSignal::new(), step_number: 2, total_steps: 11 }, rx)
    }

    #[tokio::test]
    async fn test_summary_replaces_raw_but_preserves_hash() {
        let dir = tempfile::tempdir().unwrap();
        let ctx_arc = ctx_with_gateway(dir.path(), ScriptedGateway::replying(&["short summary"]), 1000, 400);
        let node = SummarizeSourcesNode::new(ctx_arc);

        let mut state = WorkflowState::new(
            ArtifactKind::Mindmap,
            Provider::Gemini,
            "m0",
            SessionId::new("s"),
            vec![],
        );
        state.raw_content = "original text".into();
        let original_hash = content_hash(&state.raw_content);
        state.content_hash = Some(original_hash.clone());

        let (ctx, _rx) = node_ctx();
        node.run(&mut state, &ctx).await.unwrap();

        assert_eq!(state.raw_content, "short summary");
        assert_eq!(state.summary_content.as_deref(), Some("short summary"));
        assert_eq!(state.content_hash.as_deref(), Some(original_hash.as_str()));
        assert_eq!(state.meta_bool("summary_generated"), Some(true));
    }

    #[tokio::test]
    async fn test_chunked_path_calls_gateway_multiple_times() {
        let dir = tempfile::tempdir().unwrap();
        // Three single-paragraph chunks plus one reduce call.
        let gateway = ScriptedGateway::replying(&["s1", "s2", "s3", "reduced"]);
        let ctx_arc = ctx_with_gateway(dir.path(), gateway, 50, 40);
        let node = SummarizeSourcesNode::new(ctx_arc.clone());

        let mut state = WorkflowState::new(
            ArtifactKind::Podcast,
            Provider::Gemini,
            "m0",
            SessionId::new("s"),
            vec![],
        );
        state.raw_content = ["this paragraph has some words"; 3].join("\n\n");

        let (ctx, _rx) = node_ctx();
        node.run(&mut state, &ctx).await.unwrap();
        assert_eq!(state.raw_content, "reduced");
        assert_eq!(state.meta_bool("summary_generated"), Some(true));
    }

    #[tokio::test]
    async fn test_gateway_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = ScriptedGateway::new(vec![Err(docgen_core::DocgenError::LlmUnavailable(
            "no client".into(),
        ))]);
        let node = SummarizeSourcesNode::new(ctx_with_gateway(dir.path(), gateway, 1000, 400));

        let mut state = WorkflowState::new(
            ArtifactKind::Faq,
            Provider::Gemini,
            "m0",
            SessionId::new("s"),
            vec![],
        );
        state.raw_content = "keep me".into();
        let (ctx, _rx) = node_ctx();
        node.run(&mut state, &ctx).await.unwrap();

        assert_eq!(state.raw_content, "keep me");
        assert!(state.errors.is_empty());
        assert_eq!(state.meta_bool("summary_generated"), Some(false));
    }
}
