use crate::context::WorkflowContext;
use crate::prompts;
use async_trait::async_trait;
use docgen_core::{FaqData, FaqItem, Result, StepGroup, WorkflowState, safe_json_parse};
use docgen_graph::{NodeContext, WorkflowNode};
use docgen_llm::LlmCallRequest;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Preset tag color tokens, assigned deterministically by sorted order.
const TAG_COLORS: &[&str] = &["blue", "green", "amber", "purple", "rose", "cyan", "lime", "orange"];

/// Extracts FAQ items from the content and colors their tags.
pub struct GenerateFaqNode {
    ctx: Arc<WorkflowContext>,
}

impl GenerateFaqNode {
    pub fn new(ctx: Arc<WorkflowContext>) -> Self {
        Self { ctx }
    }

    fn assign_tag_colors(items: &[FaqItem]) -> BTreeMap<String, String> {
        let tags: BTreeSet<String> =
            items.iter().flat_map(|item| item.tags.iter().cloned()).collect();
        tags.into_iter()
            .enumerate()
            .map(|(index, tag)| (tag, TAG_COLORS[index % TAG_COLORS.len()].to_string()))
            .collect()
    }
}

#[async_trait]
impl WorkflowNode for GenerateFaqNode {
    fn name(&self) -> &str {
        "generate_faq"
    }

    fn step_group(&self) -> StepGroup {
        StepGroup::Transforming
    }

    async fn run(&self, state: &mut WorkflowState, ctx: &NodeContext) -> Result<()> {
        if !state.errors.is_empty() {
            return Ok(());
        }
        let content = state.effective_content().to_string();
        if content.trim().is_empty() {
            state.push_error("No content available for FAQ extraction");
            return Ok(());
        }
        ctx.emit_progress(StepGroup::Transforming, "Extracting FAQ questions and answers").await;

        let outcome = self
            .ctx
            .gateway
            .complete(
                LlmCallRequest::new(state.provider, &state.model, prompts::faq_prompt(&content))
                    .with_step_name("generate_faq")
                    .with_api_key(&state.api_key)
                    .with_max_output_tokens(4000)
                    .with_temperature(0.4)
                    .with_json_mode(true),
            )
            .await;
        let text = match outcome {
            Ok(outcome) => outcome.text,
            Err(e) => {
                state.push_error(format!("FAQ generation failed: {e}"));
                return Ok(());
            }
        };
        let Some(value) = safe_json_parse(&text) else {
            state.push_error("Failed to parse FAQ JSON response");
            return Ok(());
        };

        let mut items: Vec<FaqItem> =
            serde_json::from_value(value["items"].clone()).unwrap_or_default();
        if items.is_empty() {
            // Items may arrive without ids; retry leniently field by field.
            if let Some(raw_items) = value["items"].as_array() {
                items = raw_items
                    .iter()
                    .filter_map(|item| {
                        let question = item["question"].as_str()?.to_string();
                        let answer = item["answer"].as_str().unwrap_or("").to_string();
                        let tags = item["tags"]
                            .as_array()
                            .map(|t| {
                                t.iter().filter_map(|v| v.as_str().map(str::to_string)).collect()
                            })
                            .unwrap_or_default();
                        Some(FaqItem {
                            id: item["id"].as_str().unwrap_or("").to_string(),
                            question,
                            answer,
                            tags,
                        })
                    })
                    .collect();
            }
        }
        if items.is_empty() {
            state.push_error("FAQ response contained no items");
            return Ok(());
        }
        for (index, item) in items.iter_mut().enumerate() {
            if item.id.is_empty() {
                item.id = format!("faq-{}", index + 1);
            }
        }

        let tag_colors = Self::assign_tag_colors(&items);
        let title = value["title"].as_str().map(str::to_string);
        if state.meta_str("title").is_none() {
            if let Some(title) = &title {
                state.set_meta("title", title.clone());
            }
        }
        let faq = FaqData { title, items, tag_colors };

        let session_dir = self.ctx.storage.session_dir(&state.session_id)?;
        let dest = session_dir.join("faq");
        std::fs::create_dir_all(&dest)?;
        let slug = prompts::output_slug(faq.title.as_deref().unwrap_or("faq"));
        let path = dest.join(format!("{slug}.json"));
        std::fs::write(&path, serde_json::to_string_pretty(&faq)?)?;

        tracing::info!(items = faq.items.len(), "FAQ extracted");
        state.faq_data = Some(faq);
        state.output_path = Some(path);
        state.completed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RendererRegistry;
    use docgen_core::{ArtifactKind, Provider, SessionId, Settings};
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
        (NodeContext { bus, cancel: CancelSignal::new(), step_number: 3, total_steps: 3 }, rx)
    }

    fn faq_state() -> WorkflowState {
        let mut state = WorkflowState::new(
            ArtifactKind::Faq,
            Provider::Gemini,
            "m0",
            SessionId::new("s1"),
            vec![],
        );
        state.raw_content = "questions and answers about the system".into();
        state
    }

    const FAQ_JSON: &str = r#"{
        "title": "System FAQ",
        "items": [
            {"question": "What is it?", "answer": "A system.", "tags": ["basics"]},
            {"id": "custom", "question": "Why?", "answer": "Because.", "tags": ["basics", "deep"]}
        ]
    }"#;

    #[tokio::test]
    async fn test_items_get_ids_and_tag_colors() {
        let dir = tempfile::tempdir().unwrap();
        let node = GenerateFaqNode::new(ctx_with(dir.path(), ScriptedGateway::replying(&[FAQ_JSON])));
        let mut state = faq_state();
        let (ctx, _rx) = node_ctx();
        node.run(&mut state, &ctx).await.unwrap();

        let faq = state.faq_data.as_ref().unwrap();
        assert_eq!(faq.items.len(), 2);
        assert_eq!(faq.items[0].id, "faq-1");
        assert_eq!(faq.items[1].id, "custom");
        // Sorted unique tags: basics, deep → first two palette entries
        assert_eq!(faq.tag_colors.get("basics").map(String::as_str), Some("blue"));
        assert_eq!(faq.tag_colors.get("deep").map(String::as_str), Some("green"));
        assert!(state.completed);
        assert!(state.output_path.as_ref().unwrap().to_string_lossy().ends_with("system-faq.json"));
    }

    #[tokio::test]
    async fn test_tag_color_assignment_is_deterministic() {
        let items = vec![
            FaqItem { id: "1".into(), question: "q".into(), answer: "a".into(), tags: vec!["zeta".into(), "alpha".into()] },
        ];
        let first = GenerateFaqNode::assign_tag_colors(&items);
        let second = GenerateFaqNode::assign_tag_colors(&items);
        assert_eq!(first, second);
        assert_eq!(first.get("alpha").map(String::as_str), Some("blue"));
        assert_eq!(first.get("zeta").map(String::as_str), Some("green"));
    }

    #[tokio::test]
    async fn test_unparseable_faq_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let node = GenerateFaqNode::new(ctx_with(dir.path(), ScriptedGateway::replying(&["prose only"])));
        let mut state = faq_state();
        let (ctx, _rx) = node_ctx();
        node.run(&mut state, &ctx).await.unwrap();
        assert_eq!(state.last_error(), Some("Failed to parse FAQ JSON response"));
    }
}
