use crate::context::WorkflowContext;
use crate::prompts;
use crate::sections::parse_sections;
use async_trait::async_trait;
use base64::Engine;
use docgen_core::{
    ImageType, Result, Section, SectionImage, StepGroup, WorkflowState, safe_json_parse, slugify,
};
use docgen_graph::{NodeContext, WorkflowNode};
use docgen_llm::{FALLBACK_IMAGE_MODEL, ImageRequest, LlmCallRequest};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

fn sections_for_images(state: &WorkflowState) -> Vec<Section> {
    let Some(structured) = &state.structured_content else { return Vec::new() };
    let parsed = parse_sections(&structured.markdown);
    if parsed.is_empty() { structured.sections.clone() } else { parsed }
}

fn next_image_path(images_dir: &Path, title: &str) -> PathBuf {
    let slug = {
        let slug = slugify(title);
        if slug.is_empty() { "section".to_string() } else { slug }
    };
    let base = images_dir.join(format!("{slug}.png"));
    if !base.exists() {
        return base;
    }
    let mut seq = 1u32;
    loop {
        let candidate = images_dir.join(format!("{slug}_{seq}.png"));
        if !candidate.exists() {
            return candidate;
        }
        seq += 1;
    }
}

/// Decides per section whether to illustrate it and generates the raster
/// files, reusing the session's image cache when the content hash and
/// style both match. Sections are processed one at a time so progress
/// stays in section order.
pub struct GenerateImagesNode {
    ctx: Arc<WorkflowContext>,
}

impl GenerateImagesNode {
    pub fn new(ctx: Arc<WorkflowContext>) -> Self {
        Self { ctx }
    }

    fn type_enabled(&self, state: &WorkflowState, image_type: ImageType) -> bool {
        let prefs = &state.preferences;
        match image_type {
            ImageType::Infographic => prefs.enable_infographics,
            ImageType::Decorative => prefs.enable_decorative_headers,
            ImageType::Diagram | ImageType::Chart | ImageType::Mermaid => prefs.enable_diagrams,
            ImageType::None => false,
        }
    }

    async fn decide_for_section(
        &self,
        state: &WorkflowState,
        section: &Section,
    ) -> Option<(ImageType, String, f64)> {
        let outcome = self
            .ctx
            .gateway
            .complete(
                LlmCallRequest::new(
                    state.provider,
                    &state.model,
                    prompts::image_prompt_request(
                        &section.title,
                        &section.content,
                        &state.preferences.image_style,
                    ),
                )
                .with_system_prompt(prompts::IMAGE_PROMPT_SYSTEM)
                .with_step_name("image_prompt")
                .with_api_key(&state.api_key)
                .with_max_output_tokens(500)
                .with_temperature(0.4)
                .with_json_mode(true),
            )
            .await
            .ok()?;
        let value = safe_json_parse(&outcome.text)?;
        let image_type = ImageType::parse(value["image_type"].as_str().unwrap_or("none"));
        let prompt = value["prompt"].as_str().unwrap_or("").to_string();
        let confidence = value["confidence"].as_f64().unwrap_or(0.5);
        Some((image_type, prompt, confidence))
    }

    async fn generate_file(
        &self,
        state: &WorkflowState,
        prompt: &str,
        dest: &Path,
    ) -> Result<u32> {
        let model = state
            .image_model
            .clone()
            .unwrap_or_else(|| docgen_llm::DEFAULT_IMAGE_MODEL.to_string());
        let timeout = Duration::from_secs(self.ctx.settings.image_timeout_secs);
        let style = match state.preferences.image_style.as_str() {
            "" | "auto" => None,
            style => Some(style.to_string()),
        };
        let key = if !state.image_api_key.is_empty() {
            state.image_api_key.clone()
        } else {
            state.api_key.clone()
        };

        let mut request = ImageRequest::new(prompt, model, key);
        request.style = style;

        match self.ctx.image_model.generate(request.clone(), timeout).await {
            Ok(bytes) => {
                std::fs::write(dest, bytes)?;
                Ok(1)
            }
            Err(first) => {
                // One retry on the faster fallback model
                tracing::warn!(error = %first, "image generation failed, retrying on fallback model");
                request.model = FALLBACK_IMAGE_MODEL.to_string();
                let bytes = self.ctx.image_model.generate(request, timeout).await?;
                std::fs::write(dest, bytes)?;
                Ok(2)
            }
        }
    }
}

#[async_trait]
impl WorkflowNode for GenerateImagesNode {
    fn name(&self) -> &str {
        "generate_images"
    }

    fn step_group(&self) -> StepGroup {
        StepGroup::GeneratingImages
    }

    async fn run(&self, state: &mut WorkflowState, ctx: &NodeContext) -> Result<()> {
        if !state.errors.is_empty() || state.structured_content.is_none() {
            return Ok(());
        }
        if !state.preferences.enable_image_generation {
            tracing::debug!("image generation disabled by preferences");
            return Ok(());
        }
        let sections = sections_for_images(state);
        if sections.is_empty() {
            return Ok(());
        }
        let images_dir = self.ctx.storage.images_dir(&state.session_id);
        std::fs::create_dir_all(&images_dir)?;

        let hash = state
            .structured_content
            .as_ref()
            .map(|s| s.content_hash.clone())
            .unwrap_or_default();
        if let Some(cached) =
            docgen_cache::load_images(&images_dir, &hash, &state.preferences.image_style)
        {
            tracing::info!(count = cached.len(), "reusing cached section images");
            if let Some(structured) = state.structured_content.as_mut() {
                structured.section_images = cached;
            }
            state.set_meta("images_reused", true);
            return Ok(());
        }

        let mut produced: BTreeMap<u32, SectionImage> = BTreeMap::new();
        for section in &sections {
            ctx.emit_progress(
                StepGroup::GeneratingImages,
                format!("Illustrating section {}", section.title),
            )
            .await;

            let Some((decided_type, prompt, confidence)) =
                self.decide_for_section(state, section).await
            else {
                tracing::warn!(section = %section.title, "no image decision, skipping");
                continue;
            };
            let image_type =
                if self.type_enabled(state, decided_type) { decided_type } else { ImageType::None };

            match image_type {
                ImageType::None => continue,
                ImageType::Mermaid | ImageType::Diagram | ImageType::Chart => {
                    // Deferred to the renderer; no raster produced here.
                    produced.insert(
                        section.id,
                        SectionImage {
                            section_id: section.id,
                            section_title: section.title.clone(),
                            image_type,
                            path: String::new(),
                            prompt,
                            confidence,
                            description: String::new(),
                            attempts: 0,
                            embed_base64: None,
                        },
                    );
                }
                ImageType::Infographic | ImageType::Decorative => {
                    let dest = next_image_path(&images_dir, &section.title);
                    match self.generate_file(state, &prompt, &dest).await {
                        Ok(attempts) => {
                            produced.insert(
                                section.id,
                                SectionImage {
                                    section_id: section.id,
                                    section_title: section.title.clone(),
                                    image_type,
                                    path: dest.to_string_lossy().into_owned(),
                                    prompt,
                                    confidence,
                                    description: String::new(),
                                    attempts,
                                    embed_base64: None,
                                },
                            );
                        }
                        Err(e) => {
                            tracing::error!(section = %section.title, error = %e, "image generation failed");
                        }
                    }
                }
            }
        }

        state.set_meta("images_generated", produced.values().filter(|i| !i.path.is_empty()).count() as u64);
        if let Some(structured) = state.structured_content.as_mut() {
            structured.section_images = produced;
        }
        Ok(())
    }
}

/// Captions every generated image and optionally embeds the bytes for
/// PDF rendering. Missing descriptions are logged, never fatal.
pub struct DescribeImagesNode {
    ctx: Arc<WorkflowContext>,
}

impl DescribeImagesNode {
    pub fn new(ctx: Arc<WorkflowContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl WorkflowNode for DescribeImagesNode {
    fn name(&self) -> &str {
        "describe_images"
    }

    fn step_group(&self) -> StepGroup {
        StepGroup::GeneratingImages
    }

    async fn run(&self, state: &mut WorkflowState, _ctx: &NodeContext) -> Result<()> {
        if !state.errors.is_empty() {
            return Ok(());
        }
        let Some(structured) = state.structured_content.clone() else { return Ok(()) };
        let mut images = structured.section_images.clone();

        for image in images.values_mut() {
            if image.path.is_empty() {
                continue;
            }
            let encoded = match std::fs::read(&image.path) {
                Ok(bytes) => base64::engine::general_purpose::STANDARD.encode(bytes),
                Err(e) => {
                    tracing::error!(path = %image.path, error = %e, "image file unreadable");
                    continue;
                }
            };

            if image.description.is_empty() {
                let key = if !state.gemini_api_key.is_empty() {
                    state.gemini_api_key.clone()
                } else {
                    state.api_key.clone()
                };
                match self
                    .ctx
                    .gateway
                    .complete(
                        LlmCallRequest::new(
                            state.provider,
                            &state.model,
                            prompts::image_description_prompt(&image.section_title),
                        )
                        .with_step_name("describe_image")
                        .with_api_key(key)
                        .with_max_output_tokens(300)
                        .with_temperature(0.3)
                        .with_inline_image(encoded.clone()),
                    )
                    .await
                {
                    Ok(outcome) if !outcome.text.trim().is_empty() => {
                        image.description = outcome.text.trim().to_string();
                    }
                    Ok(_) => tracing::error!(section = image.section_id, "empty image description"),
                    Err(e) => {
                        tracing::error!(section = image.section_id, error = %e, "image description failed")
                    }
                }
            }

            if state.preferences.embed_images {
                image.embed_base64 = Some(encoded);
            }
        }

        if let Some(structured) = state.structured_content.as_mut() {
            structured.section_images = images;
        }
        Ok(())
    }
}

/// Persists the image manifest next to the image files so a later run
/// over the same content and style can reuse them. Best-effort.
pub struct PersistImageManifestNode {
    ctx: Arc<WorkflowContext>,
}

impl PersistImageManifestNode {
    pub fn new(ctx: Arc<WorkflowContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl WorkflowNode for PersistImageManifestNode {
    fn name(&self) -> &str {
        "persist_image_manifest"
    }

    fn step_group(&self) -> StepGroup {
        StepGroup::GeneratingImages
    }

    async fn run(&self, state: &mut WorkflowState, _ctx: &NodeContext) -> Result<()> {
        let Some(structured) = &state.structured_content else { return Ok(()) };
        if structured.section_images.is_empty() || state.meta_bool("images_reused") == Some(true) {
            return Ok(());
        }
        let images_dir = self.ctx.storage.images_dir(&state.session_id);

        let sections = sections_for_images(state);
        let descriptions: BTreeMap<u32, String> = structured
            .section_images
            .iter()
            .filter(|(_, image)| !image.description.is_empty())
            .map(|(id, image)| (*id, image.description.clone()))
            .collect();
        let types: BTreeMap<u32, ImageType> =
            structured.section_images.iter().map(|(id, image)| (*id, image.image_type)).collect();

        if let Err(e) = docgen_cache::save_image_manifest(
            &images_dir,
            &structured.content_hash,
            &sections,
            &descriptions,
            &types,
            &state.preferences.image_style,
        ) {
            tracing::error!(error = %e, "failed to persist image manifest");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RendererRegistry;
    use docgen_core::{ArtifactKind, Provider, SessionId, Settings, StructuredContent};
    use docgen_graph::{CancelSignal, progress_channel};
    use docgen_llm::UsageRegistry;
    use docgen_llm::testing::{ScriptedGateway, StubImageModel, StubSpeech};

    fn ctx_with(
        dir: &std::path::Path,
        gateway: ScriptedGateway,
        image_model: StubImageModel,
    ) -> Arc<WorkflowContext> {
        Arc::new(WorkflowContext::with_collaborators(
            Settings::default().with_output_root(dir.join("o")).with_cache_root(dir.join("c")),
            Arc::new(gateway),
            Arc::new(image_model),
            Arc::new(StubSpeech::new(8)),
            Arc::new(UsageRegistry::new()),
            RendererRegistry::new(),
        ))
    }

    fn node_ctx() -> (NodeContext, tokio::sync::mpsc::Receiver<docgen_core::WorkflowEvent>) {
        let (bus, rx) = progress_channel();
        (NodeContext { bus, cancel: CancelSignal::new(), step_number: 7, total_steps: 11 }, rx)
    }

    fn doc_state() -> WorkflowState {
        let mut state = WorkflowState::new(
            ArtifactKind::ArticlePdf,
            Provider::Gemini,
            "m0",
            SessionId::new("s1"),
            vec![],
        );
        state.api_key = "k".into();
        state.structured_content = Some(StructuredContent {
            title: "T".into(),
            markdown: "# T\n\n## 1. Intro\n\nAlpha.".into(),
            content_hash: "hash1".into(),
            ..Default::default()
        });
        state
    }

    const DECISION: &str = r#"{"image_type": "infographic", "prompt": "draw intro", "confidence": 0.9}"#;

    #[tokio::test]
    async fn test_generates_image_per_section() {
        let dir = tempfile::tempdir().unwrap();
        let ctx_arc =
            ctx_with(dir.path(), ScriptedGateway::replying(&[DECISION]), StubImageModel::new(vec![9, 9]));
        let node = GenerateImagesNode::new(ctx_arc.clone());
        let mut state = doc_state();
        let (ctx, _rx) = node_ctx();
        node.run(&mut state, &ctx).await.unwrap();

        let images = &state.structured_content.as_ref().unwrap().section_images;
        assert_eq!(images.len(), 1);
        let image = &images[&1];
        assert_eq!(image.image_type, ImageType::Infographic);
        assert_eq!(image.attempts, 1);
        assert!(std::path::Path::new(&image.path).exists());
    }

    #[tokio::test]
    async fn test_fallback_model_retry_counts_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let image_model = StubImageModel::new(vec![7]).failing_first(1);
        let ctx_arc = ctx_with(dir.path(), ScriptedGateway::replying(&[DECISION]), image_model);
        let node = GenerateImagesNode::new(ctx_arc);
        let mut state = doc_state();
        let (ctx, _rx) = node_ctx();
        node.run(&mut state, &ctx).await.unwrap();

        let images = &state.structured_content.as_ref().unwrap().section_images;
        assert_eq!(images[&1].attempts, 2);
    }

    #[tokio::test]
    async fn test_disabled_types_skip_generation() {
        let dir = tempfile::tempdir().unwrap();
        let ctx_arc =
            ctx_with(dir.path(), ScriptedGateway::replying(&[DECISION]), StubImageModel::new(vec![1]));
        let node = GenerateImagesNode::new(ctx_arc);
        let mut state = doc_state();
        state.preferences.enable_infographics = false;
        let (ctx, _rx) = node_ctx();
        node.run(&mut state, &ctx).await.unwrap();

        assert!(state.structured_content.as_ref().unwrap().section_images.is_empty());
    }

    #[tokio::test]
    async fn test_mermaid_deferred_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let decision = r#"{"image_type": "mermaid", "prompt": "graph TD", "confidence": 0.7}"#;
        let ctx_arc =
            ctx_with(dir.path(), ScriptedGateway::replying(&[decision]), StubImageModel::new(vec![1]));
        let node = GenerateImagesNode::new(ctx_arc);
        let mut state = doc_state();
        let (ctx, _rx) = node_ctx();
        node.run(&mut state, &ctx).await.unwrap();

        let images = &state.structured_content.as_ref().unwrap().section_images;
        assert_eq!(images[&1].image_type, ImageType::Mermaid);
        assert!(images[&1].path.is_empty());
    }

    #[tokio::test]
    async fn test_cached_images_reused_on_hash_and_style_match() {
        let dir = tempfile::tempdir().unwrap();
        let ctx_arc =
            ctx_with(dir.path(), ScriptedGateway::replying(&[]), StubImageModel::new(vec![1]));
        // Seed the image cache for hash1/auto
        let images_dir = ctx_arc.storage.images_dir(&SessionId::new("s1"));
        std::fs::create_dir_all(&images_dir).unwrap();
        std::fs::write(images_dir.join("intro.png"), b"png").unwrap();
        let sections = vec![docgen_core::Section { id: 1, title: "Intro".into(), content: String::new() }];
        docgen_cache::save_image_manifest(
            &images_dir,
            "hash1",
            &sections,
            &BTreeMap::new(),
            &BTreeMap::new(),
            "auto",
        )
        .unwrap();

        let node = GenerateImagesNode::new(ctx_arc);
        let mut state = doc_state();
        let (ctx, _rx) = node_ctx();
        node.run(&mut state, &ctx).await.unwrap();

        let images = &state.structured_content.as_ref().unwrap().section_images;
        assert_eq!(images.len(), 1);
        assert_eq!(state.meta_bool("images_reused"), Some(true));
    }

    #[tokio::test]
    async fn test_describe_fills_missing_descriptions_and_embeds() {
        let dir = tempfile::tempdir().unwrap();
        let ctx_arc = ctx_with(
            dir.path(),
            ScriptedGateway::replying(&["A two sentence caption. It describes the chart."]),
            StubImageModel::new(vec![1]),
        );
        let image_path = dir.path().join("img.png");
        std::fs::write(&image_path, b"pngbytes").unwrap();

        let mut state = doc_state();
        state.preferences.embed_images = true;
        state.structured_content.as_mut().unwrap().section_images.insert(
            1,
            SectionImage {
                section_id: 1,
                section_title: "Intro".into(),
                image_type: ImageType::Infographic,
                path: image_path.to_string_lossy().into_owned(),
                prompt: "p".into(),
                confidence: 1.0,
                description: String::new(),
                attempts: 1,
                embed_base64: None,
            },
        );

        let node = DescribeImagesNode::new(ctx_arc);
        let (ctx, _rx) = node_ctx();
        node.run(&mut state, &ctx).await.unwrap();

        let image = &state.structured_content.as_ref().unwrap().section_images[&1];
        assert!(image.description.starts_with("A two sentence caption"));
        assert_eq!(
            image.embed_base64.as_deref(),
            Some(base64::engine::general_purpose::STANDARD.encode(b"pngbytes").as_str())
        );
    }

    #[tokio::test]
    async fn test_persist_manifest_roundtrips_through_loader() {
        let dir = tempfile::tempdir().unwrap();
        let ctx_arc =
            ctx_with(dir.path(), ScriptedGateway::replying(&[]), StubImageModel::new(vec![1]));
        let images_dir = ctx_arc.storage.images_dir(&SessionId::new("s1"));
        std::fs::create_dir_all(&images_dir).unwrap();
        std::fs::write(images_dir.join("intro.png"), b"png").unwrap();

        let mut state = doc_state();
        state.structured_content.as_mut().unwrap().section_images.insert(
            1,
            SectionImage {
                section_id: 1,
                section_title: "Intro".into(),
                image_type: ImageType::Infographic,
                path: images_dir.join("intro.png").to_string_lossy().into_owned(),
                prompt: "p".into(),
                confidence: 1.0,
                description: "caption".into(),
                attempts: 1,
                embed_base64: None,
            },
        );

        let node = PersistImageManifestNode::new(ctx_arc);
        let (ctx, _rx) = node_ctx();
        node.run(&mut state, &ctx).await.unwrap();

        let reloaded = docgen_cache::load_images(&images_dir, "hash1", "auto").unwrap();
        assert_eq!(reloaded[&1].description, "caption");
    }
}
