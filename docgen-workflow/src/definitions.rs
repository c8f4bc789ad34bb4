use crate::context::WorkflowContext;
use crate::nodes::{
    DescribeImagesNode, DetectFormatNode, EditImageNode, EnhanceContentNode, GenerateFaqNode,
    GenerateImageNode, GenerateImagesNode, GenerateMindmapNode, GenerateOutputNode,
    GeneratePodcastScriptNode, IngestSourcesNode, ParseDocumentContentNode,
    PersistImageManifestNode, SummarizeSourcesNode, SynthesizePodcastAudioNode,
    TransformContentNode, ValidateOutputNode,
};
use docgen_core::{ArtifactKind, WorkflowState, is_retryable_message};
use docgen_graph::{EdgeTarget, Graph};
use serde_json::json;
use std::sync::Arc;

/// Branch label for the routing edge after summarization.
fn branch_label(kind: ArtifactKind) -> &'static str {
    match kind {
        ArtifactKind::Podcast => "podcast",
        ArtifactKind::Mindmap => "mindmap",
        ArtifactKind::Faq => "faq",
        ArtifactKind::ImageGenerate => "image_generate",
        ArtifactKind::ImageEdit => "image_edit",
        _ => "document",
    }
}

/// Set branch-specific step numbering so progress displays N/total for
/// the steps this artifact kind actually runs. This is the wrapper duty
/// left over from projecting the unified state into the document
/// sub-graph.
pub fn apply_step_metadata(state: &mut WorkflowState) {
    let (numbers, total) = match state.artifact_kind {
        kind if kind.is_document() => (
            json!({
                "ingest_sources": 1,
                "summarize_sources": 2,
                "detect_format": 3,
                "parse_document_content": 4,
                "transform_content": 5,
                "enhance_content": 6,
                "generate_images": 7,
                "describe_images": 8,
                "persist_image_manifest": 9,
                "generate_output": 10,
                "validate_output": 11,
            }),
            11u32,
        ),
        ArtifactKind::Podcast => (
            json!({
                "ingest_sources": 1,
                "summarize_sources": 2,
                "generate_podcast_script": 3,
                "synthesize_podcast_audio": 4,
            }),
            4,
        ),
        ArtifactKind::Mindmap => (
            json!({"ingest_sources": 1, "summarize_sources": 2, "generate_mindmap": 3}),
            3,
        ),
        ArtifactKind::Faq => {
            (json!({"ingest_sources": 1, "summarize_sources": 2, "generate_faq": 3}), 3)
        }
        ArtifactKind::ImageGenerate => (json!({"image_generate": 1}), 1),
        ArtifactKind::ImageEdit => (json!({"image_edit": 1}), 1),
        _ => (json!({}), 1),
    };
    state.set_meta("step_numbers", numbers);
    state.set_meta("total_steps", total as u64);
}

/// Build the unified workflow graph.
///
/// Every kind that needs source text shares the
/// `ingest_sources → summarize_sources` prefix, then routes on the
/// artifact kind. Image kinds enter at their node directly. The document
/// branch carries the `generate_output ↔ validate_output` retry pair,
/// bounded by `settings.max_retries`.
pub fn build_graph(kind: ArtifactKind, ctx: Arc<WorkflowContext>) -> Graph {
    let max_retries = ctx.settings.max_retries;

    let builder = Graph::builder()
        .add_node(Arc::new(IngestSourcesNode::new(ctx.clone())))
        .add_node(Arc::new(SummarizeSourcesNode::new(ctx.clone())))
        // Document branch
        .add_node(Arc::new(DetectFormatNode))
        .add_node(Arc::new(ParseDocumentContentNode::new(ctx.clone())))
        .add_node(Arc::new(TransformContentNode::new(ctx.clone())))
        .add_node(Arc::new(EnhanceContentNode::new(ctx.clone())))
        .add_node(Arc::new(GenerateImagesNode::new(ctx.clone())))
        .add_node(Arc::new(DescribeImagesNode::new(ctx.clone())))
        .add_node(Arc::new(PersistImageManifestNode::new(ctx.clone())))
        .add_node(Arc::new(GenerateOutputNode::new(ctx.clone())))
        .add_node(Arc::new(ValidateOutputNode))
        // Podcast branch
        .add_node(Arc::new(GeneratePodcastScriptNode::new(ctx.clone())))
        .add_node(Arc::new(SynthesizePodcastAudioNode::new(ctx.clone())))
        // Single-node branches
        .add_node(Arc::new(GenerateMindmapNode::new(ctx.clone())))
        .add_node(Arc::new(GenerateFaqNode::new(ctx.clone())))
        .add_node(Arc::new(GenerateImageNode::new(ctx.clone())))
        .add_node(Arc::new(EditImageNode::new(ctx)))
        // Common prefix
        .add_edge("ingest_sources", "summarize_sources")
        .add_conditional_edge(
            "summarize_sources",
            |state: &mut WorkflowState| branch_label(state.artifact_kind).to_string(),
            vec![
                ("document", EdgeTarget::Node("detect_format".into())),
                ("podcast", EdgeTarget::Node("generate_podcast_script".into())),
                ("mindmap", EdgeTarget::Node("generate_mindmap".into())),
                ("faq", EdgeTarget::Node("generate_faq".into())),
                ("image_generate", EdgeTarget::Node("image_generate".into())),
                ("image_edit", EdgeTarget::Node("image_edit".into())),
            ],
        )
        // Document branch flow
        .add_edge("detect_format", "parse_document_content")
        .add_edge("parse_document_content", "transform_content")
        .add_edge("transform_content", "enhance_content")
        .add_edge("enhance_content", "generate_images")
        .add_edge("generate_images", "describe_images")
        .add_edge("describe_images", "persist_image_manifest")
        .add_edge("persist_image_manifest", "generate_output")
        .add_edge("generate_output", "validate_output")
        .add_conditional_edge(
            "validate_output",
            move |state: &mut WorkflowState| {
                let retryable =
                    state.last_error().map(is_retryable_message).unwrap_or(false);
                if retryable && state.retry_count < max_retries {
                    state.retry_count += 1;
                    tracing::warn!(
                        attempt = state.retry_count,
                        max = max_retries,
                        "retrying generation"
                    );
                    "retry".to_string()
                } else {
                    if retryable {
                        tracing::warn!(retries = state.retry_count, "max retries reached");
                    }
                    "end".to_string()
                }
            },
            vec![("retry", EdgeTarget::Node("generate_output".into())), ("end", EdgeTarget::End)],
        )
        // Podcast branch flow
        .add_edge("generate_podcast_script", "synthesize_podcast_audio")
        .edge_to_end("synthesize_podcast_audio")
        // Single-node branch flows
        .edge_to_end("generate_mindmap")
        .edge_to_end("generate_faq")
        .edge_to_end("image_generate")
        .edge_to_end("image_edit");

    // Image kinds skip the extraction prefix entirely.
    let entry = match kind {
        ArtifactKind::ImageGenerate => "image_generate",
        ArtifactKind::ImageEdit => "image_edit",
        _ => "ingest_sources",
    };
    builder.set_entry(entry).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RendererRegistry;
    use docgen_core::{Provider, SessionId, Settings, Source, WorkflowEvent};
    use docgen_graph::{CancelSignal, progress_channel};
    use docgen_llm::UsageRegistry;
    use docgen_llm::testing::{ScriptedGateway, StubImageModel, StubSpeech};

    fn ctx_with(dir: &std::path::Path, gateway: ScriptedGateway) -> Arc<WorkflowContext> {
        let mut settings =
            Settings::default().with_output_root(dir.join("o")).with_cache_root(dir.join("c"));
        settings.single_chunk_limit = 1_000_000; // keep summarization single-shot
        Arc::new(WorkflowContext::with_collaborators(
            settings,
            Arc::new(gateway),
            Arc::new(StubImageModel::new(vec![0x89, 0x50])),
            Arc::new(StubSpeech::new(24_000)),
            Arc::new(UsageRegistry::new()),
            RendererRegistry::new(),
        ))
    }

    fn initial_state(kind: ArtifactKind, text: &str) -> WorkflowState {
        let mut state = WorkflowState::new(
            kind,
            Provider::Gemini,
            "m0",
            SessionId::new("s1"),
            vec![Source::Text { text: text.into() }],
        );
        state.api_key = "k".into();
        state.gemini_api_key = "gk".into();
        apply_step_metadata(&mut state);
        state
    }

    const TRANSFORM_JSON: &str = r##"{
        "title": "Title",
        "outline": ["Intro"],
        "sections": [{"title": "1. Intro", "content": "Alpha. Beta."}],
        "markdown": "# Title\n\n## 1. Intro\n\nAlpha. Beta.",
        "visual_markers": []
    }"##;

    #[tokio::test]
    async fn test_document_branch_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        // summarize, transform, enhance summary, image decision, describe
        let gateway = ScriptedGateway::replying(&[
            "a concise summary",
            TRANSFORM_JSON,
            "executive summary text",
            r#"{"image_type": "none", "prompt": "", "confidence": 0.2}"#,
        ]);
        let ctx = ctx_with(dir.path(), gateway);
        let graph = build_graph(ArtifactKind::ArticleMarkdown, ctx.clone());

        let state = initial_state(ArtifactKind::ArticleMarkdown, "# Title\n\nAlpha.\n\nBeta.");
        let (bus, mut rx) = progress_channel();
        let handle = tokio::spawn(async move {
            graph.execute(state, bus, CancelSignal::new()).await
        });
        let mut progresses = Vec::new();
        while let Some(event) = rx.recv().await {
            if let WorkflowEvent::Progress(p) = event {
                progresses.push(p.progress);
            }
        }
        let (final_state, cancelled) = handle.await.unwrap();

        assert!(!cancelled);
        assert!(final_state.completed, "errors: {:?}", final_state.errors);
        let output = final_state.output_path.unwrap();
        assert!(output.to_string_lossy().ends_with("markdown/title.md"));
        assert_eq!(
            std::fs::read_to_string(output).unwrap(),
            "# Title\n\n## 1. Intro\n\nAlpha. Beta."
        );
        // Monotone progress
        assert!(progresses.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_podcast_branch_routes_after_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let script = r#"{"title": "Ep", "description": "", "dialogue": [{"speaker": "Alex", "text": "hi"}]}"#;
        let gateway = ScriptedGateway::replying(&["summary", script]);
        let ctx = ctx_with(dir.path(), gateway);
        let graph = build_graph(ArtifactKind::Podcast, ctx);

        let state = initial_state(ArtifactKind::Podcast, "source text");
        let (bus, _rx) = progress_channel();
        let (final_state, _) = graph.execute(state, bus, CancelSignal::new()).await;

        assert!(final_state.completed, "errors: {:?}", final_state.errors);
        assert!(final_state.podcast.unwrap().duration_seconds > 0.0);
    }

    #[tokio::test]
    async fn test_image_branch_skips_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_with(dir.path(), ScriptedGateway::replying(&[]));
        let graph = build_graph(ArtifactKind::ImageGenerate, ctx);
        assert_eq!(graph.entry_point(), "image_generate");

        let mut state = initial_state(ArtifactKind::ImageGenerate, "");
        state.sources.clear();
        state.params.image_prompt = Some("a lighthouse".into());
        let (bus, _rx) = progress_channel();
        let (final_state, _) = graph.execute(state, bus, CancelSignal::new()).await;

        assert!(final_state.completed, "errors: {:?}", final_state.errors);
        assert!(final_state.image_data.is_some());
    }

    #[tokio::test]
    async fn test_unsupported_source_stops_before_branch() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_with(dir.path(), ScriptedGateway::replying(&[]));
        let record = ctx.storage.save_upload(b"x", "sheet.xlsx", "application/vnd.ms-excel").unwrap();
        let graph = build_graph(ArtifactKind::ArticleMarkdown, ctx);

        let mut state = initial_state(ArtifactKind::ArticleMarkdown, "");
        state.sources = vec![Source::File { file_id: record.file_id }];
        let (bus, _rx) = progress_channel();
        let (final_state, _) = graph.execute(state, bus, CancelSignal::new()).await;

        assert!(!final_state.completed);
        assert_eq!(final_state.last_error(), Some("Excel files are not supported."));
        assert!(final_state.output_path.is_none());
    }

    #[tokio::test]
    async fn test_mindmap_model_fallback_records_both_models() {
        let dir = tempfile::tempdir().unwrap();
        let usage = Arc::new(UsageRegistry::new());
        let gateway = ScriptedGateway::replying(&[
            "summary",
            "not json",
            r#"{"title":"t","central_node":{"label":"t","children":[]}}"#,
        ])
        .with_usage(usage.clone());
        let mut settings =
            Settings::default().with_output_root(dir.path().join("o")).with_cache_root(dir.path().join("c"));
        settings.single_chunk_limit = 1_000_000;
        let ctx = Arc::new(WorkflowContext::with_collaborators(
            settings,
            Arc::new(gateway),
            Arc::new(StubImageModel::new(vec![0])),
            Arc::new(StubSpeech::new(8)),
            usage.clone(),
            RendererRegistry::new(),
        ));
        let graph = build_graph(ArtifactKind::Mindmap, ctx);

        let state = initial_state(ArtifactKind::Mindmap, "content");
        let (bus, _rx) = progress_channel();
        let (final_state, _) = graph.execute(state, bus, CancelSignal::new()).await;

        assert!(final_state.completed);
        assert_eq!(final_state.mindmap_tree.unwrap().title, "t");
        // summary + two mindmap attempts on distinct models
        let calls = usage.snapshot().calls;
        let mindmap_calls: Vec<_> =
            calls.iter().filter(|c| c.step_name == "generate_mindmap").collect();
        assert_eq!(mindmap_calls.len(), 2);
        assert_ne!(mindmap_calls[0].model, mindmap_calls[1].model);
    }
}
