use docgen_core::{
    ArtifactKind, Provider, SessionId, Settings, Source, StructuredContent, WorkflowState,
    content_hash,
};
use docgen_graph::{CancelSignal, progress_channel};
use docgen_llm::UsageRegistry;
use docgen_llm::testing::{ScriptedGateway, StubImageModel, StubSpeech};
use docgen_workflow::render::DocumentRenderer;
use docgen_workflow::{RendererRegistry, WorkflowContext, apply_step_metadata, build_graph};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const TRANSFORM_JSON: &str = r##"{
    "title": "Title",
    "outline": ["Intro"],
    "sections": [{"title": "1. Intro", "content": "Alpha. Beta."}],
    "markdown": "# Title\n\n## 1. Intro\n\nAlpha. Beta.",
    "visual_markers": []
}"##;

fn context(
    dir: &Path,
    gateway: ScriptedGateway,
    renderers: RendererRegistry,
    single_chunk_limit: usize,
    chunk_limit: usize,
) -> Arc<WorkflowContext> {
    let mut settings =
        Settings::default().with_output_root(dir.join("output")).with_cache_root(dir.join("cache"));
    settings.single_chunk_limit = single_chunk_limit;
    settings.chunk_limit = chunk_limit;
    Arc::new(WorkflowContext::with_collaborators(
        settings,
        Arc::new(gateway),
        Arc::new(StubImageModel::new(vec![1])),
        Arc::new(StubSpeech::new(8)),
        Arc::new(UsageRegistry::new()),
        renderers,
    ))
}

fn initial_state(kind: ArtifactKind, text: &str) -> WorkflowState {
    let mut state = WorkflowState::new(
        kind,
        Provider::Gemini,
        "m0",
        SessionId::new("sess"),
        vec![Source::Text { text: text.into() }],
    );
    state.api_key = "key".into();
    apply_step_metadata(&mut state);
    state
}

/// Renderer that writes an empty file the first time, then real output.
#[derive(Debug)]
struct FlakyRenderer {
    empty_remaining: Mutex<u32>,
    render_calls: Arc<Mutex<u32>>,
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
        *self.render_calls.lock().unwrap() += 1;
        std::fs::create_dir_all(dest_dir)?;
        let path = dest_dir.join(format!("{slug}.md"));
        let mut remaining = self.empty_remaining.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            std::fs::write(&path, b"")?;
        } else {
            std::fs::write(&path, content.markdown.as_bytes())?;
        }
        Ok(path)
    }
}

#[tokio::test]
async fn test_summarization_threshold_drives_chunked_calls() {
    // ~120k of content against a 50k single-chunk limit and 40k chunks.
    let paragraph = "Lorem ipsum dolor sit amet, consectetur adipiscing elit. ".repeat(30);
    let content = vec![paragraph; 70].join("\n\n");
    assert!(content.len() > 100_000);
    let original_hash = content_hash(&content);

    // One reply per summary chunk, then reduce, transform, enhance,
    // and the per-section image decision.
    let chunks = docgen_workflow::summary::split_paragraph_chunks(&content, 40_000);
    assert!(chunks.len() >= 2);
    let mut responses: Vec<docgen_core::Result<String>> =
        (0..chunks.len()).map(|i| Ok(format!("chunk {i} summary"))).collect();
    responses.push(Ok("reduced summary".into()));
    responses.push(Ok(TRANSFORM_JSON.into()));
    responses.push(Ok("exec summary".into()));
    responses.push(Ok(r#"{"image_type": "none", "prompt": "", "confidence": 0.1}"#.into()));
    let gateway = ScriptedGateway::new(responses);

    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path(), gateway, RendererRegistry::new(), 50_000, 40_000);
    let graph = build_graph(ArtifactKind::ArticleMarkdown, ctx);

    let state = initial_state(ArtifactKind::ArticleMarkdown, &content);
    let (bus, _rx) = progress_channel();
    let (final_state, _) = graph.execute(state, bus, CancelSignal::new()).await;

    assert!(final_state.completed, "errors: {:?}", final_state.errors);
    assert_eq!(final_state.meta_bool("summary_generated"), Some(true));
    assert_eq!(final_state.summary_content.as_deref(), Some("reduced summary"));
    // Summarization alone needed at least three gateway calls
    assert!(chunks.len() + 1 >= 3);
    // Hash is the pre-summary hash throughout
    assert_eq!(final_state.content_hash.as_deref(), Some(original_hash.as_str()));
    assert_eq!(
        final_state.structured_content.as_ref().unwrap().content_hash,
        original_hash
    );
}

#[tokio::test]
async fn test_validation_retry_recovers_and_bounds_renderer_calls() {
    let render_calls = Arc::new(Mutex::new(0u32));
    let mut renderers = RendererRegistry::empty();
    renderers.register(
        "markdown",
        Arc::new(FlakyRenderer {
            empty_remaining: Mutex::new(1),
            render_calls: render_calls.clone(),
        }),
    );
    let gateway = ScriptedGateway::replying(&[
        "summary",
        TRANSFORM_JSON,
        "exec summary",
        r#"{"image_type": "none", "prompt": "", "confidence": 0.1}"#,
    ]);
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path(), gateway, renderers, 1_000_000, 40_000);
    let graph = build_graph(ArtifactKind::ArticleMarkdown, ctx);

    let state = initial_state(ArtifactKind::ArticleMarkdown, "# Title\n\nAlpha.");
    let (bus, _rx) = progress_channel();
    let (final_state, _) = graph.execute(state, bus, CancelSignal::new()).await;

    assert!(final_state.completed, "errors: {:?}", final_state.errors);
    assert_eq!(*render_calls.lock().unwrap(), 2);
    assert_eq!(final_state.retry_count, 1);
    assert!(final_state.errors.is_empty());
}

#[tokio::test]
async fn test_retry_budget_exhaustion_ends_with_error_state() {
    let render_calls = Arc::new(Mutex::new(0u32));
    let mut renderers = RendererRegistry::empty();
    renderers.register(
        "markdown",
        Arc::new(FlakyRenderer {
            empty_remaining: Mutex::new(100), // never recovers
            render_calls: render_calls.clone(),
        }),
    );
    let gateway = ScriptedGateway::replying(&[
        "summary",
        TRANSFORM_JSON,
        "exec summary",
        r#"{"image_type": "none", "prompt": "", "confidence": 0.1}"#,
    ]);
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path(), gateway, renderers, 1_000_000, 40_000);
    let max_retries = ctx.settings.max_retries;
    let graph = build_graph(ArtifactKind::ArticleMarkdown, ctx);

    let state = initial_state(ArtifactKind::ArticleMarkdown, "# Title\n\nAlpha.");
    let (bus, _rx) = progress_channel();
    let (final_state, _) = graph.execute(state, bus, CancelSignal::new()).await;

    assert!(!final_state.completed);
    // generate_output invoked at most max_retries + 1 times
    assert_eq!(*render_calls.lock().unwrap(), max_retries + 1);
    assert!(final_state.last_error().unwrap().contains("Validation failed"));
}

#[tokio::test]
async fn test_faq_branch_end_to_end() {
    let faq_json = r#"{
        "title": "FAQ",
        "items": [{"question": "Q?", "answer": "A.", "tags": ["t"]}]
    }"#;
    let gateway = ScriptedGateway::replying(&["summary", faq_json]);
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path(), gateway, RendererRegistry::new(), 1_000_000, 40_000);
    let graph = build_graph(ArtifactKind::Faq, ctx);

    let state = initial_state(ArtifactKind::Faq, "content with questions");
    let (bus, _rx) = progress_channel();
    let (final_state, _) = graph.execute(state, bus, CancelSignal::new()).await;

    assert!(final_state.completed, "errors: {:?}", final_state.errors);
    let faq = final_state.faq_data.unwrap();
    assert_eq!(faq.items[0].id, "faq-1");
    assert_eq!(faq.tag_colors.len(), 1);
    let path = final_state.output_path.unwrap();
    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(saved["items"][0]["question"], "Q?");
}
