use docgen_core::Settings;
use docgen_workflow::WorkflowContext;
use std::sync::Arc;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<WorkflowContext>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        Self { ctx: Arc::new(WorkflowContext::new(settings)) }
    }

    pub fn with_context(ctx: Arc<WorkflowContext>) -> Self {
        Self { ctx }
    }

    pub fn settings(&self) -> &Settings {
        &self.ctx.settings
    }
}
