use crate::context::WorkflowContext;
use crate::prompts;
use async_trait::async_trait;
use docgen_core::{
    Result, SlideContent, StepGroup, WorkflowState, safe_json_parse,
};
use docgen_graph::{NodeContext, WorkflowNode};
use docgen_llm::LlmCallRequest;
use std::sync::Arc;

/// Fills the gaps transform left: an executive summary when none exists,
/// and a slide structure for slide-capable artifacts. Slide generation is
/// mandatory for those artifacts, so exhaustion surfaces a retryable
/// generation error.
pub struct EnhanceContentNode {
    ctx: Arc<WorkflowContext>,
}

impl EnhanceContentNode {
    pub fn new(ctx: Arc<WorkflowContext>) -> Self {
        Self { ctx }
    }

    async fn generate_summary(&self, state: &WorkflowState, content: &str) -> Option<String> {
        let outcome = self
            .ctx
            .gateway
            .complete(
                LlmCallRequest::new(
                    state.provider,
                    &state.model,
                    prompts::executive_summary_prompt(content, &state.preferences.audience),
                )
                .with_system_prompt(prompts::EXECUTIVE_SUMMARY_SYSTEM)
                .with_step_name("executive_summary")
                .with_api_key(&state.api_key)
                .with_max_output_tokens(500)
                .with_temperature(0.3),
            )
            .await;
        match outcome {
            Ok(outcome) if !outcome.text.trim().is_empty() => Some(outcome.text.trim().to_string()),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "executive summary unavailable");
                None
            }
        }
    }

    async fn generate_slides(&self, state: &WorkflowState, content: &str) -> Option<Vec<SlideContent>> {
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
        if slides.is_empty() {
            return None;
        }
        let max = state.preferences.max_slides as usize;
        Some(slides.into_iter().take(max).collect())
    }
}

#[async_trait]
impl WorkflowNode for EnhanceContentNode {
    fn name(&self) -> &str {
        "enhance_content"
    }

    fn step_group(&self) -> StepGroup {
        StepGroup::Transforming
    }

    async fn run(&self, state: &mut WorkflowState, ctx: &NodeContext) -> Result<()> {
        if !state.errors.is_empty() {
            return Ok(());
        }
        let Some(structured) = state.structured_content.clone() else {
            state.push_error("No structured content to enhance");
            return Ok(());
        };
        ctx.emit_progress(StepGroup::Transforming, "Enhancing content").await;

        let mut structured = structured;
        if structured.executive_summary.is_none() {
            structured.executive_summary = self.generate_summary(state, &structured.markdown).await;
        }

        if state.artifact_kind.is_slide_capable() && structured.slides.is_none() {
            let mut slides = None;
            for attempt in 1..=self.ctx.settings.max_slide_attempts {
                slides = self.generate_slides(state, &structured.markdown).await;
                if slides.is_some() {
                    break;
                }
                tracing::warn!(attempt, "slide structure attempt produced nothing");
            }
            match slides {
                Some(slides) => structured.slides = Some(slides),
                None => {
                    state.push_error(
                        "Generation failed: slide structure unavailable after retries",
                    );
                }
            }
        }

        state.structured_content = Some(structured);
        Ok(())
    }
}
