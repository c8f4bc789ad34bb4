use crate::stream::ProgressBus;
use async_trait::async_trait;
use docgen_core::{ProgressEvent, Result, StepGroup, WorkflowEvent, WorkflowState, progress_for_step};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation flag shared between the dispatcher and one
/// execution. In-flight provider calls complete; the runtime refrains
/// from starting the next node.
#[derive(Clone, Default)]
pub struct CancelSignal {
    flag: Arc<AtomicBool>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Per-node execution context: the event queue, the cancellation signal,
/// and this node's position in the compiled step numbering.
pub struct NodeContext {
    pub bus: ProgressBus,
    pub cancel: CancelSignal,
    pub step_number: u32,
    pub total_steps: u32,
}

impl NodeContext {
    /// Emit a progress event for this node's step within the generation
    /// span.
    pub async fn emit_progress(&self, group: StepGroup, message: impl Into<String>) {
        self.bus
            .emit(WorkflowEvent::Progress(ProgressEvent {
                status: group,
                progress: progress_for_step(self.step_number, self.total_steps),
                message: message.into(),
            }))
            .await;
    }
}

/// A single state-transforming step in the workflow graph.
///
/// `run` must record failures in `state.errors` and return `Ok`; an `Err`
/// return is a backstop the runtime converts into a recorded internal
/// error. Implementations must be deterministic with respect to their
/// declared inputs.
#[async_trait]
pub trait WorkflowNode: Send + Sync {
    /// Unique name of the node within its graph.
    fn name(&self) -> &str;

    /// Status group this node reports progress under.
    fn step_group(&self) -> StepGroup;

    async fn run(&self, state: &mut WorkflowState, ctx: &NodeContext) -> Result<()>;
}

/// Node backed by a plain async function, for tests and small adapters.
pub struct FnNode<F> {
    name: String,
    group: StepGroup,
    handler: F,
}

impl<F> FnNode<F>
where
    F: Fn(&mut WorkflowState) -> Result<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, group: StepGroup, handler: F) -> Self {
        Self { name: name.into(), group, handler }
    }
}

#[async_trait]
impl<F> WorkflowNode for FnNode<F>
where
    F: Fn(&mut WorkflowState) -> Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn step_group(&self) -> StepGroup {
        self.group
    }

    async fn run(&self, state: &mut WorkflowState, _ctx: &NodeContext) -> Result<()> {
        (self.handler)(state)
    }
}
