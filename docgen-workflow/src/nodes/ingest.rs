use crate::context::WorkflowContext;
use crate::parsers::{is_image_file, is_spreadsheet};
use crate::prompts;
use async_trait::async_trait;
use base64::Engine;
use docgen_core::{
    ContentFormat, Result, Source, StepGroup, WorkflowState, content_hash,
};
use docgen_graph::{NodeContext, WorkflowNode};
use docgen_llm::LlmCallRequest;
use std::sync::Arc;

const SOURCE_SEPARATOR: &str = "\n\n---\n\n";

/// Resolves every request source to markdown and concatenates them.
///
/// Uploads go through the parser registry (images through a vision call),
/// URLs through the web parser, inline text verbatim. Spreadsheets are
/// rejected up front. Failures here are terminal; there is nothing to
/// generate from a source that would not parse.
pub struct IngestSourcesNode {
    ctx: Arc<WorkflowContext>,
}

impl IngestSourcesNode {
    pub fn new(ctx: Arc<WorkflowContext>) -> Self {
        Self { ctx }
    }

    async fn extract_image(&self, state: &WorkflowState, path: &std::path::Path) -> Result<String> {
        let bytes = std::fs::read(path)?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        let key = if !state.gemini_api_key.is_empty() {
            state.gemini_api_key.clone()
        } else {
            state.api_key.clone()
        };
        let outcome = self
            .ctx
            .gateway
            .complete(
                LlmCallRequest::new(state.provider, &state.model, prompts::vision_extraction_prompt())
                    .with_step_name("image_understanding")
                    .with_api_key(key)
                    .with_inline_image(encoded),
            )
            .await?;
        Ok(outcome.text)
    }
}

#[async_trait]
impl WorkflowNode for IngestSourcesNode {
    fn name(&self) -> &str {
        "ingest_sources"
    }

    fn step_group(&self) -> StepGroup {
        StepGroup::Parsing
    }

    async fn run(&self, state: &mut WorkflowState, ctx: &NodeContext) -> Result<()> {
        if !state.artifact_kind.requires_extraction() {
            tracing::debug!(kind = %state.artifact_kind, "skipping content extraction");
            return Ok(());
        }
        if state.sources.is_empty() {
            state.push_error("No sources provided");
            return Ok(());
        }
        ctx.emit_progress(StepGroup::Parsing, format!("Reading {} sources", state.sources.len()))
            .await;

        let mut parts: Vec<String> = Vec::new();
        let mut source_count = 0u64;
        let mut first_file_id: Option<String> = None;

        for source in state.sources.clone() {
            match source {
                Source::File { file_id } => {
                    let path = match self.ctx.storage.upload_path(&file_id) {
                        Ok(path) => path,
                        Err(e) => {
                            state.push_error(e.to_string());
                            return Ok(());
                        }
                    };
                    if is_spreadsheet(&path) {
                        state.push_error("Excel files are not supported.");
                        return Ok(());
                    }
                    if first_file_id.is_none() {
                        first_file_id = Some(file_id.as_ref().to_string());
                    }
                    let content = if is_image_file(&path) {
                        match self.extract_image(state, &path).await {
                            Ok(content) => content,
                            Err(e) => {
                                state.push_error(format!("parse failed for image source: {e}"));
                                return Ok(());
                            }
                        }
                    } else {
                        let format = match ContentFormat::detect(&path.to_string_lossy()) {
                            Some(format) => format,
                            None => {
                                state.push_error(format!(
                                    "Unsupported source type: {}",
                                    path.display()
                                ));
                                return Ok(());
                            }
                        };
                        let parser = match self.ctx.parsers.get(format) {
                            Ok(parser) => parser,
                            Err(e) => {
                                state.push_error(e.to_string());
                                return Ok(());
                            }
                        };
                        match parser.parse(&path) {
                            Ok(doc) => {
                                if state.meta_str("title").is_none() {
                                    if let Some(title) = doc.title {
                                        state.set_meta("title", title);
                                    }
                                }
                                doc.content
                            }
                            Err(e) => {
                                state.push_error(e.to_string());
                                return Ok(());
                            }
                        }
                    };
                    if !content.trim().is_empty() {
                        parts.push(content);
                        source_count += 1;
                    }
                }
                Source::Url { url, .. } => match self.ctx.web.fetch(&url).await {
                    Ok(doc) => {
                        if state.meta_str("title").is_none() {
                            if let Some(title) = doc.title {
                                state.set_meta("title", title);
                            }
                        }
                        if !doc.content.trim().is_empty() {
                            parts.push(doc.content);
                            source_count += 1;
                        }
                    }
                    Err(e) => {
                        state.push_error(e.to_string());
                        return Ok(());
                    }
                },
                Source::Text { text } => {
                    if !text.trim().is_empty() {
                        parts.push(text);
                        source_count += 1;
                    }
                }
            }
        }

        if parts.is_empty() {
            state.push_error("No sources yielded any content");
            return Ok(());
        }

        state.raw_content = parts.join(SOURCE_SEPARATOR);
        state.content_hash = Some(content_hash(&state.raw_content));
        state.set_meta("source_count", source_count);
        if let Some(file_id) = first_file_id {
            state.set_meta("file_id", file_id);
        }

        if state.artifact_kind.is_document() {
            let session_dir = self.ctx.storage.session_dir(&state.session_id)?;
            let combined = session_dir.join("source").join("combined.md");
            std::fs::write(&combined, state.raw_content.as_bytes())?;
            state.input_path = Some(combined);
        }

        tracing::info!(sources = source_count, chars = state.raw_content.len(), "sources ingested");
        Ok(())
    }
}
