use crate::context::WorkflowContext;
use crate::prompts::output_slug;
use async_trait::async_trait;
use base64::Engine;
use docgen_core::{ImageOutput, Result, StepGroup, WorkflowState};
use docgen_graph::{NodeContext, WorkflowNode};
use docgen_llm::ImageRequest;
use std::sync::Arc;
use std::time::Duration;

fn image_request(state: &WorkflowState, prompt: &str) -> ImageRequest {
    let model = state
        .image_model
        .clone()
        .unwrap_or_else(|| docgen_llm::DEFAULT_IMAGE_MODEL.to_string());
    let key = if !state.image_api_key.is_empty() {
        state.image_api_key.clone()
    } else {
        state.api_key.clone()
    };
    let mut request = ImageRequest::new(prompt, model, key);
    request.style = match state.preferences.image_style.as_str() {
        "" | "auto" => None,
        style => Some(style.to_string()),
    };
    request.source_base64 = state.params.image_source_base64.clone();
    request
}

fn store_image(
    ctx: &WorkflowContext,
    state: &mut WorkflowState,
    prompt: &str,
    bytes: Vec<u8>,
) -> Result<()> {
    let session_dir = ctx.storage.session_dir(&state.session_id)?;
    let slug = {
        let slug = output_slug(prompt);
        slug.chars().take(48).collect::<String>()
    };
    let path = session_dir.join("images").join(format!("{slug}.png"));
    std::fs::write(&path, &bytes)?;

    state.image_data = Some(ImageOutput {
        data_base64: base64::engine::general_purpose::STANDARD.encode(&bytes),
        output_format: "png".into(),
        prompt_used: prompt.to_string(),
    });
    state.output_path = Some(path);
    state.completed = true;
    Ok(())
}

/// Single-shot image generation from the caller's prompt. Not cached by
/// content hash; the request body is the whole key.
pub struct GenerateImageNode {
    ctx: Arc<WorkflowContext>,
}

impl GenerateImageNode {
    pub fn new(ctx: Arc<WorkflowContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl WorkflowNode for GenerateImageNode {
    fn name(&self) -> &str {
        "image_generate"
    }

    fn step_group(&self) -> StepGroup {
        StepGroup::GeneratingOutput
    }

    async fn run(&self, state: &mut WorkflowState, ctx: &NodeContext) -> Result<()> {
        let Some(prompt) = state.params.image_prompt.clone().filter(|p| !p.trim().is_empty())
        else {
            state.push_error("No prompt for image generation");
            return Ok(());
        };
        ctx.emit_progress(StepGroup::GeneratingOutput, "Generating image").await;

        let timeout = Duration::from_secs(self.ctx.settings.image_timeout_secs);
        match self.ctx.image_model.generate(image_request(state, &prompt), timeout).await {
            Ok(bytes) => store_image(&self.ctx, state, &prompt, bytes)?,
            Err(e) => state.push_error(format!("Image generation failed: {e}")),
        }
        Ok(())
    }
}

/// Single-shot image edit over a caller-supplied source image.
pub struct EditImageNode {
    ctx: Arc<WorkflowContext>,
}

impl EditImageNode {
    pub fn new(ctx: Arc<WorkflowContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl WorkflowNode for EditImageNode {
    fn name(&self) -> &str {
        "image_edit"
    }

    fn step_group(&self) -> StepGroup {
        StepGroup::GeneratingOutput
    }

    async fn run(&self, state: &mut WorkflowState, ctx: &NodeContext) -> Result<()> {
        let Some(prompt) = state.params.image_prompt.clone().filter(|p| !p.trim().is_empty())
        else {
            state.push_error("No prompt for image edit");
            return Ok(());
        };
        if state.params.image_source_base64.is_none() {
            state.push_error("No source image for image edit");
            return Ok(());
        }
        ctx.emit_progress(StepGroup::GeneratingOutput, "Editing image").await;

        let timeout = Duration::from_secs(self.ctx.settings.image_timeout_secs);
        match self.ctx.image_model.edit(image_request(state, &prompt), timeout).await {
            Ok(bytes) => {
                store_image(&self.ctx, state, &prompt, bytes)?;
                if let Some(mode) = state.params.image_edit_mode.clone() {
                    state.set_meta("image_edit_mode", mode);
                }
            }
            Err(e) => state.push_error(format!("Image edit failed: {e}")),
        }
        Ok(())
    }
}
