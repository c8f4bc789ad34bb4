use crate::context::WorkflowContext;
use crate::prompts;
use crate::sections::parse_sections;
use async_trait::async_trait;
use docgen_core::{
    MarkerType, Result, Section, SlideContent, StepGroup, StructuredContent, VisualMarker,
    WorkflowState, safe_json_parse,
};
use docgen_graph::{NodeContext, WorkflowNode};
use docgen_llm::LlmCallRequest;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

/// Turns raw markdown into a typed blog-style structure via the gateway,
/// reusing a cached structure when the content hash matches and falling
/// back to a deterministic cleaner when no model is reachable.
pub struct TransformContentNode {
    ctx: Arc<WorkflowContext>,
}

impl TransformContentNode {
    pub fn new(ctx: Arc<WorkflowContext>) -> Self {
        Self { ctx }
    }

    fn cache_path(&self, state: &WorkflowState) -> PathBuf {
        self.ctx.settings.cache_root.join(format!("{}_content_cache.json", state.session_id))
    }

    fn load_cached(&self, state: &WorkflowState) -> Option<StructuredContent> {
        let body = std::fs::read_to_string(self.cache_path(state)).ok()?;
        let cached: StructuredContent = serde_json::from_str(&body).ok()?;
        if Some(cached.content_hash.as_str()) == state.content_hash.as_deref() {
            tracing::info!("reusing cached structured content");
            Some(cached)
        } else {
            None
        }
    }

    fn assign_section_ids(raw_sections: &[(String, String)]) -> Vec<Section> {
        let mut used: HashSet<u32> = HashSet::new();
        let mut next_sequential = 1u32;
        raw_sections
            .iter()
            .map(|(title, content)| {
                let explicit = title
                    .split_once('.')
                    .and_then(|(prefix, _)| prefix.trim().parse::<u32>().ok())
                    .filter(|id| !used.contains(id));
                let id = match explicit {
                    Some(id) => id,
                    None => {
                        while used.contains(&next_sequential) {
                            next_sequential += 1;
                        }
                        next_sequential
                    }
                };
                used.insert(id);
                let clean_title = title
                    .split_once('.')
                    .filter(|(prefix, _)| prefix.trim().parse::<u32>().is_ok())
                    .map(|(_, rest)| rest.trim().to_string())
                    .unwrap_or_else(|| title.clone());
                Section { id, title: clean_title, content: content.clone() }
            })
            .collect()
    }

    fn parse_markers(value: &Value) -> Vec<VisualMarker> {
        let Some(items) = value.as_array() else { return Vec::new() };
        items
            .iter()
            .filter_map(|item| {
                // Markers with an unknown type are dropped, not errored.
                let marker_type = MarkerType::parse(item["type"].as_str().unwrap_or(""))?;
                Some(VisualMarker {
                    marker_id: item["marker_id"].as_str().unwrap_or("vm").to_string(),
                    marker_type,
                    title: item["title"].as_str().unwrap_or("").to_string(),
                    description: item["description"].as_str().unwrap_or("").to_string(),
                    position: item["position"].as_u64().unwrap_or(0) as u32,
                })
            })
            .collect()
    }

    fn structured_from_json(value: &Value, fallback_title: &str, hash: &str) -> StructuredContent {
        let title = value["title"].as_str().filter(|t| !t.is_empty()).unwrap_or(fallback_title);
        let outline = value["outline"]
            .as_array()
            .map(|items| {
                items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect::<Vec<_>>()
            })
            .unwrap_or_default();
        let raw_sections: Vec<(String, String)> = value["sections"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .map(|s| {
                        (
                            s["title"].as_str().unwrap_or("Section").to_string(),
                            s["content"].as_str().unwrap_or("").to_string(),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();
        let markdown = value["markdown"].as_str().unwrap_or("").to_string();

        StructuredContent {
            title: title.to_string(),
            outline,
            sections: Self::assign_section_ids(&raw_sections),
            markdown,
            visual_markers: Self::parse_markers(&value["visual_markers"]),
            executive_summary: None,
            slides: None,
            section_images: Default::default(),
            content_hash: hash.to_string(),
        }
    }

    /// Deterministic downgrade when no model is reachable: strip HTML
    /// comments and parser artifacts, use the raw content as markdown.
    fn fallback_clean(state: &WorkflowState, hash: &str) -> StructuredContent {
        let cleaned = Regex::new(r"(?s)<!--.*?-->")
            .expect("static regex")
            .replace_all(state.effective_content(), "")
            .trim()
            .to_string();
        let title = state
            .meta_str("title")
            .map(str::to_string)
            .or_else(|| {
                cleaned
                    .lines()
                    .find(|l| l.starts_with("# "))
                    .map(|l| l.trim_start_matches("# ").trim().to_string())
            })
            .unwrap_or_else(|| "Untitled Document".to_string());
        let sections = parse_sections(&cleaned);
        StructuredContent {
            title,
            outline: sections.iter().map(|s| s.title.clone()).collect(),
            sections,
            markdown: cleaned,
            visual_markers: Vec::new(),
            executive_summary: None,
            slides: None,
            section_images: Default::default(),
            content_hash: hash.to_string(),
        }
    }

    async fn request_slides(&self, state: &WorkflowState, content: &str) -> Option<Vec<SlideContent>> {
        let outcome = self
            .ctx
            .gateway
            .complete(
                LlmCallRequest::new(
                    state.provider,
                    &state.model,
                    prompts::slide_structure_prompt(content, state.preferences.max_slides),
                )
                .with_system_prompt(prompts::SLIDE_STRUCTURE_SYSTEM)
                .with_step_name("slide_structure")
                .with_api_key(&state.api_key)
                .with_max_output_tokens(2000)
                .with_temperature(0.4)
                .with_json_mode(true),
            )
            .await
            .ok()?;
        let value = safe_json_parse(&outcome.text)?;
        let slides: Vec<SlideContent> = serde_json::from_value(value["slides"].clone()).ok()?;
        let max = state.preferences.max_slides as usize;
        Some(slides.into_iter().take(max).collect())
    }
}

#[async_trait]
impl WorkflowNode for TransformContentNode {
    fn name(&self) -> &str {
        "transform_content"
    }

    fn step_group(&self) -> StepGroup {
        StepGroup::Transforming
    }

    async fn run(&self, state: &mut WorkflowState, ctx: &NodeContext) -> Result<()> {
        if !state.errors.is_empty() {
            return Ok(());
        }
        let hash = state.content_hash.clone().unwrap_or_default();

        if let Some(cached) = self.load_cached(state) {
            state.structured_content = Some(cached);
            return Ok(());
        }
        ctx.emit_progress(StepGroup::Transforming, "Structuring content").await;

        let fallback_title = state.meta_str("title").unwrap_or("Untitled Document").to_string();
        let content = state.effective_content().to_string();

        let mut structured = match self
            .ctx
            .gateway
            .complete(
                LlmCallRequest::new(
                    state.provider,
                    &state.model,
                    prompts::transform_prompt(&content, &state.preferences.audience),
                )
                .with_system_prompt(prompts::TRANSFORM_SYSTEM)
                .with_step_name("transform_content")
                .with_api_key(&state.api_key)
                .with_max_output_tokens(8000)
                .with_temperature(0.4)
                .with_json_mode(true),
            )
            .await
        {
            Ok(outcome) => match safe_json_parse(&outcome.text) {
                Some(value) => Self::structured_from_json(&value, &fallback_title, &hash),
                None => {
                    tracing::warn!("transform response was not JSON, using cleaned raw content");
                    Self::fallback_clean(state, &hash)
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "transform model unreachable, using cleaned raw content");
                Self::fallback_clean(state, &hash)
            }
        };
        if structured.markdown.trim().is_empty() {
            structured.markdown = content.clone();
        }

        if state.artifact_kind.is_slide_capable() {
            structured.slides = self.request_slides(state, &structured.markdown).await;
        }

        let synthetic = state.meta_str("title").map(|t| t.is_empty()).unwrap_or(true);
        if synthetic && !structured.title.is_empty() {
            state.set_meta("title", structured.title.clone());
        }
        state.structured_content = Some(structured);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RendererRegistry;
    use docgen_core::{ArtifactKind, DocgenError, Provider, SessionId, Settings, content_hash};
    use docgen_graph::{CancelSignal, progress_channel};
    use docgen_llm::UsageRegistry;
    use docgen_llm::testing::{ScriptedGateway, StubImageModel, StubSpeech};

    fn ctx_with(dir: &std::path::Path, gateway: ScriptedGateway) -> Arc<WorkflowContext> {
        Arc::new(WorkflowContext::with_collaborators(
            Settings::default().with_output_root(dir.join("o")).with_cache_root(dir.join("c")),
            Arc::new(gateway),
            Arc::new(StubImageModel::new(vec![0])),
            Arc::new(StubSpeech::new(8)),
            Arc::new(UsageRegistry::new()),
            RendererRegistry::new(),
        ))
    }

    fn node_ctx() -> (NodeContext, tokio::sync::mpsc::Receiver<docgen_core::WorkflowEvent>) {
        let (bus, rx) = progress_channel();
        (NodeContext { bus, cancel: CancelSignal::new(), step_number: 5, total_steps: 11 }, rx)
    }

    fn doc_state(content: &str) -> WorkflowState {
        let mut state = WorkflowState::new(
            ArtifactKind::ArticleMarkdown,
            Provider::Gemini,
            "m0",
            SessionId::new("s"),
            vec![],
        );
        state.raw_content = content.to_string();
        state.content_hash = Some(content_hash(content));
        state
    }

    const TRANSFORM_JSON: &str = r##"{
        "title": "Title",
        "outline": ["Intro"],
        "sections": [{"title": "1. Intro", "content": "Alpha. Beta."}],
        "markdown": "# Title\n\n## 1. Intro\n\nAlpha. Beta.",
        "visual_markers": [
            {"marker_id": "vm-1", "type": "flowchart", "title": "Flow", "description": "d", "position": 1},
            {"marker_id": "vm-2", "type": "hologram", "title": "Bad", "description": "d", "position": 2}
        ]
    }"##;

    #[tokio::test]
    async fn test_transform_builds_structure_and_drops_unknown_markers() {
        let dir = tempfile::tempdir().unwrap();
        let node = TransformContentNode::new(ctx_with(dir.path(), ScriptedGateway::replying(&[TRANSFORM_JSON])));
        let mut state = doc_state("# Title\n\nAlpha. Beta.");
        let (ctx, _rx) = node_ctx();
        node.run(&mut state, &ctx).await.unwrap();

        let structured = state.structured_content.unwrap();
        assert_eq!(structured.title, "Title");
        assert_eq!(structured.sections.len(), 1);
        assert_eq!(structured.sections[0].id, 1);
        assert_eq!(structured.sections[0].title, "Intro");
        // Unknown marker type dropped, known kept
        assert_eq!(structured.visual_markers.len(), 1);
        assert_eq!(structured.visual_markers[0].marker_type, MarkerType::Flowchart);
        assert_eq!(structured.content_hash, state.content_hash.unwrap());
    }

    #[tokio::test]
    async fn test_fallback_cleaner_on_unreachable_model() {
        let dir = tempfile::tempdir().unwrap();
        let gateway =
            ScriptedGateway::new(vec![Err(DocgenError::LlmUnavailable("no creds".into()))]);
        let node = TransformContentNode::new(ctx_with(dir.path(), gateway));
        let mut state = doc_state("# Doc\n\n<!-- parser artifact -->\n\n## 1. One\n\ntext");
        let (ctx, _rx) = node_ctx();
        node.run(&mut state, &ctx).await.unwrap();

        let structured = state.structured_content.unwrap();
        assert!(!structured.markdown.contains("parser artifact"));
        assert_eq!(structured.sections.len(), 1);
        assert!(state.errors.is_empty());
    }

    #[tokio::test]
    async fn test_cached_structure_reused_only_on_hash_match() {
        let dir = tempfile::tempdir().unwrap();
        let ctx_arc = ctx_with(dir.path(), ScriptedGateway::replying(&[TRANSFORM_JSON]));
        let node = TransformContentNode::new(ctx_arc.clone());
        let mut state = doc_state("# Title\n\nAlpha. Beta.");

        // Prime the cache with a mismatched hash: must be ignored.
        let stale = StructuredContent { content_hash: "other".into(), ..Default::default() };
        std::fs::create_dir_all(&ctx_arc.settings.cache_root).unwrap();
        std::fs::write(
            ctx_arc.settings.cache_root.join("s_content_cache.json"),
            serde_json::to_string(&stale).unwrap(),
        )
        .unwrap();

        let (ctx, _rx) = node_ctx();
        node.run(&mut state, &ctx).await.unwrap();
        assert_eq!(state.structured_content.as_ref().unwrap().title, "Title");

        // Now cache with the matching hash: reused without a model call.
        let cached = StructuredContent {
            title: "From Cache".into(),
            content_hash: state.content_hash.clone().unwrap(),
            ..Default::default()
        };
        std::fs::write(
            ctx_arc.settings.cache_root.join("s_content_cache.json"),
            serde_json::to_string(&cached).unwrap(),
        )
        .unwrap();
        let node = TransformContentNode::new(ctx_with(dir.path(), ScriptedGateway::replying(&[])));
        let mut state2 = doc_state("# Title\n\nAlpha. Beta.");
        node.run(&mut state2, &ctx).await.unwrap();
        assert_eq!(state2.structured_content.unwrap().title, "From Cache");
    }

    #[tokio::test]
    async fn test_sequential_ids_assigned_when_no_prefix() {
        let raw = vec![
            ("Alpha".to_string(), "a".to_string()),
            ("2. Beta".to_string(), "b".to_string()),
            ("Gamma".to_string(), "c".to_string()),
        ];
        let sections = TransformContentNode::assign_section_ids(&raw);
        let ids: Vec<u32> = sections.iter().map(|s| s.id).collect();
        assert_eq!(ids.iter().collect::<std::collections::HashSet<_>>().len(), 3);
        assert_eq!(sections[1].id, 2);
        assert_eq!(sections[1].title, "Beta");
    }
}
