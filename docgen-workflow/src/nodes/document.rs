use crate::context::WorkflowContext;
use async_trait::async_trait;
use docgen_core::{ContentFormat, Result, StepGroup, WorkflowState, content_hash};
use docgen_graph::{NodeContext, WorkflowNode};
use std::sync::Arc;

/// Maps the input path to a canonical format. Unsupported input ends the
/// run.
pub struct DetectFormatNode;

#[async_trait]
impl WorkflowNode for DetectFormatNode {
    fn name(&self) -> &str {
        "detect_format"
    }

    fn step_group(&self) -> StepGroup {
        StepGroup::Parsing
    }

    async fn run(&self, state: &mut WorkflowState, _ctx: &NodeContext) -> Result<()> {
        if !state.errors.is_empty() {
            return Ok(());
        }
        let Some(path) = state.input_path.clone() else {
            state.push_error("No input path to detect format from");
            return Ok(());
        };
        match ContentFormat::detect(&path.to_string_lossy()) {
            Some(format) => {
                state.input_format = Some(format);
                tracing::debug!(?format, "input format detected");
            }
            None => state.push_error(format!("Unsupported input format: {}", path.display())),
        }
        Ok(())
    }
}

/// Parses the detected input into canonical markdown and pins the content
/// hash.
///
/// When ingest already hashed the pre-summary content the hash is kept;
/// summarization must not shift cache identity.
pub struct ParseDocumentContentNode {
    ctx: Arc<WorkflowContext>,
}

impl ParseDocumentContentNode {
    pub fn new(ctx: Arc<WorkflowContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl WorkflowNode for ParseDocumentContentNode {
    fn name(&self) -> &str {
        "parse_document_content"
    }

    fn step_group(&self) -> StepGroup {
        StepGroup::Parsing
    }

    async fn run(&self, state: &mut WorkflowState, ctx: &NodeContext) -> Result<()> {
        if !state.errors.is_empty() {
            return Ok(());
        }
        let (Some(path), Some(format)) = (state.input_path.clone(), state.input_format) else {
            state.push_error("Nothing to parse: missing input path or format");
            return Ok(());
        };
        ctx.emit_progress(StepGroup::Parsing, format!("Parsing {}", path.display())).await;

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
                if let Some(pages) = doc.page_count {
                    state.set_meta("page_count", pages as u64);
                }
                if state.content_hash.is_none() {
                    state.content_hash = Some(content_hash(&doc.content));
                }
                state.raw_content = doc.content;
            }
            Err(e) => state.push_error(e.to_string()),
        }
        Ok(())
    }
}
