use crate::context::WorkflowContext;
use crate::prompts;
use async_trait::async_trait;
use docgen_core::{
    MindMapNode, MindMapTree, Provider, Result, StepGroup, WorkflowState, safe_json_parse,
};
use docgen_graph::{NodeContext, WorkflowNode};
use docgen_llm::{DEFAULT_GEMINI_FALLBACK_MODELS, LlmCallRequest, build_model_list};
use std::sync::Arc;

/// Extracts a hierarchical mind map from the content.
///
/// Invalid JSON from one model falls through to the next model in the
/// fallback order before giving up, matching the gateway's transient
/// criteria for overload.
pub struct GenerateMindmapNode {
    ctx: Arc<WorkflowContext>,
}

impl GenerateMindmapNode {
    pub fn new(ctx: Arc<WorkflowContext>) -> Self {
        Self { ctx }
    }

    fn parse_tree(value: &serde_json::Value) -> MindMapTree {
        let title = value["title"].as_str().unwrap_or("Mind Map").to_string();
        let summary = value["summary"].as_str().unwrap_or("").to_string();
        let central_node: Option<MindMapNode> =
            serde_json::from_value(value["central_node"].clone()).ok();
        let central_node = central_node.unwrap_or_else(|| {
            // No central node returned: wrap the root heuristically.
            MindMapNode { label: title.clone(), children: Vec::new() }
        });
        MindMapTree { title, summary, central_node }
    }
}

#[async_trait]
impl WorkflowNode for GenerateMindmapNode {
    fn name(&self) -> &str {
        "generate_mindmap"
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
            state.push_error("No content for mind map");
            return Ok(());
        }
        ctx.emit_progress(StepGroup::Transforming, "Building mind map").await;

        let mode = state.params.mindmap_mode.clone().unwrap_or_else(|| "summarize".into());
        let source_count = state.meta_u64("source_count").unwrap_or(1);
        let prompt = prompts::mindmap_prompt(&content, &mode, source_count);

        let models = if state.provider == Provider::Gemini {
            build_model_list(&state.model, DEFAULT_GEMINI_FALLBACK_MODELS)
        } else {
            vec![state.model.clone()]
        };

        let mut tree = None;
        for model in &models {
            let outcome = self
                .ctx
                .gateway
                .complete(
                    LlmCallRequest::new(state.provider, model, prompt.clone())
                        .with_step_name("generate_mindmap")
                        .with_api_key(&state.api_key)
                        .with_max_output_tokens(4000)
                        .with_temperature(0.5)
                        .with_json_mode(true),
                )
                .await;
            match outcome {
                Ok(outcome) => match safe_json_parse(&outcome.text) {
                    Some(value) => {
                        tree = Some(Self::parse_tree(&value));
                        break;
                    }
                    None => {
                        tracing::warn!(model = %model, "mind map response was not JSON, trying next model");
                    }
                },
                Err(e) if e.is_transient() => {
                    tracing::warn!(model = %model, error = %e, "model overloaded, trying next");
                }
                Err(e) => {
                    state.push_error(format!("Mind map generation failed: {e}"));
                    return Ok(());
                }
            }
        }

        let Some(tree) = tree else {
            state.push_error("Failed to parse mind map response");
            return Ok(());
        };

        let session_dir = self.ctx.storage.session_dir(&state.session_id)?;
        let dest = session_dir.join("mindmap");
        std::fs::create_dir_all(&dest)?;
        let path = dest.join(format!("{}.json", prompts::output_slug(&tree.title)));
        std::fs::write(&path, serde_json::to_string_pretty(&tree)?)?;

        if state.meta_str("title").is_none() {
            state.set_meta("title", tree.title.clone());
        }
        state.set_meta("mindmap_mode", mode);
        tracing::info!(root = %tree.title, "mind map generated");
        state.mindmap_tree = Some(tree);
        state.output_path = Some(path);
        state.completed = true;
        Ok(())
    }
}
