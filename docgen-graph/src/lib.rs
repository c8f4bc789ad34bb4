//! Workflow graph runtime for the docgen engine.
//!
//! A [`Graph`] is a set of named [`WorkflowNode`]s joined by direct and
//! conditional edges. Execution is strictly sequential within one run:
//! at most one node runs at a time, nodes see the full mutations of all
//! predecessors, and progress events leave in node order through a
//! bounded FIFO [`ProgressBus`]. Nodes record failures in
//! `WorkflowState::errors`; nothing propagates across the node boundary
//! as a panic or error value.

pub mod graph;
pub mod node;
pub mod stream;

pub use graph::{EdgeTarget, Graph, GraphBuilder};
pub use node::{CancelSignal, FnNode, NodeContext, WorkflowNode};
pub use stream::{ProgressBus, progress_channel};
