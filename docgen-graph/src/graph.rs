use crate::node::{CancelSignal, NodeContext, WorkflowNode};
use crate::stream::ProgressBus;
use docgen_core::{WorkflowState, progress_for_step};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Where an edge label routes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeTarget {
    Node(String),
    End,
}

type Chooser = Arc<dyn Fn(&mut WorkflowState) -> String + Send + Sync>;

enum Edge {
    Direct(String),
    Conditional { choose: Chooser, routes: HashMap<String, EdgeTarget> },
    End,
}

/// Builder for a compiled [`Graph`].
pub struct GraphBuilder {
    nodes: HashMap<String, Arc<dyn WorkflowNode>>,
    edges: HashMap<String, Edge>,
    entry: Option<String>,
    order: Vec<String>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self { nodes: HashMap::new(), edges: HashMap::new(), entry: None, order: Vec::new() }
    }

    pub fn add_node(mut self, node: Arc<dyn WorkflowNode>) -> Self {
        let name = node.name().to_string();
        self.order.push(name.clone());
        self.nodes.insert(name, node);
        self
    }

    pub fn set_entry(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    /// Unconditional edge `from → to`.
    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.insert(from.into(), Edge::Direct(to.into()));
        self
    }

    /// Edge `from → END`.
    pub fn edge_to_end(mut self, from: impl Into<String>) -> Self {
        self.edges.insert(from.into(), Edge::End);
        self
    }

    /// Conditional edge: `choose` runs after `from` returns and its label
    /// selects a route. The chooser may mutate state (retry counters live
    /// in state, not in the graph).
    pub fn add_conditional_edge(
        mut self,
        from: impl Into<String>,
        choose: impl Fn(&mut WorkflowState) -> String + Send + Sync + 'static,
        routes: Vec<(&str, EdgeTarget)>,
    ) -> Self {
        self.edges.insert(
            from.into(),
            Edge::Conditional {
                choose: Arc::new(choose),
                routes: routes.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            },
        );
        self
    }

    pub fn build(self) -> Graph {
        let entry = self.entry.unwrap_or_else(|| self.order.first().cloned().unwrap_or_default());
        let step_numbers = self
            .order
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i as u32 + 1))
            .collect();
        Graph {
            nodes: self.nodes,
            edges: self.edges,
            entry,
            step_numbers,
            total_steps: self.order.len() as u32,
            recursion_limit: 50,
        }
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Compiled workflow graph.
///
/// Executes nodes sequentially from the entry point, evaluating each
/// node's outgoing edge after it returns. Step numbers default to node
/// insertion order; a wrapper embedding this graph overrides them through
/// `state.metadata["step_numbers"]` / `["total_steps"]`.
pub struct Graph {
    nodes: HashMap<String, Arc<dyn WorkflowNode>>,
    edges: HashMap<String, Edge>,
    entry: String,
    step_numbers: HashMap<String, u32>,
    total_steps: u32,
    recursion_limit: usize,
}

impl Graph {
    pub fn builder() -> GraphBuilder {
        GraphBuilder::new()
    }

    pub fn entry_point(&self) -> &str {
        &self.entry
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    fn resolve_step(&self, state: &WorkflowState, name: &str) -> (u32, u32) {
        let override_step = state
            .metadata
            .get("step_numbers")
            .and_then(|m| m.get(name))
            .and_then(|v| v.as_u64())
            .map(|v| v as u32);
        let override_total =
            state.metadata.get("total_steps").and_then(|v| v.as_u64()).map(|v| v as u32);
        (
            override_step.or_else(|| self.step_numbers.get(name).copied()).unwrap_or(1),
            override_total.unwrap_or(self.total_steps),
        )
    }

    /// Run the graph to completion over `state`.
    ///
    /// Returns the final state; `was_cancelled` in the pair reports
    /// whether execution stopped on the cancellation signal.
    pub async fn execute(
        &self,
        mut state: WorkflowState,
        bus: ProgressBus,
        cancel: CancelSignal,
    ) -> (WorkflowState, bool) {
        let mut current = self.entry.clone();
        let mut executed = 0usize;

        loop {
            if cancel.is_cancelled() {
                tracing::info!(next = %current, "cancellation observed, stopping before next node");
                return (state, true);
            }
            let Some(node) = self.nodes.get(&current) else {
                state.push_error(format!("internal error: unknown node '{current}'"));
                return (state, false);
            };
            if executed >= self.recursion_limit {
                state.push_error(format!(
                    "internal error: recursion limit {} reached at '{current}'",
                    self.recursion_limit
                ));
                return (state, false);
            }

            let (step_number, total_steps) = self.resolve_step(&state, &current);
            let ctx = NodeContext {
                bus: bus.clone(),
                cancel: cancel.clone(),
                step_number,
                total_steps,
            };

            let progress = progress_for_step(step_number, total_steps);
            tracing::info!(node = %current, step = step_number, total = total_steps, "node start");
            ctx.emit_progress(node.step_group(), format!("Running {current}")).await;

            let started = Instant::now();
            if let Err(e) = node.run(&mut state, &ctx).await {
                state.push_error(format!("internal error in {current}: {e}"));
            }
            executed += 1;
            tracing::info!(
                node = %current,
                elapsed_ms = started.elapsed().as_millis() as u64,
                errors = state.errors.len(),
                progress,
                "node end"
            );
            ctx.emit_progress(node.step_group(), format!("Finished {current}")).await;

            if state.completed {
                return (state, false);
            }

            match self.edges.get(&current) {
                Some(Edge::Direct(next)) => current = next.clone(),
                Some(Edge::Conditional { choose, routes }) => {
                    let label = choose(&mut state);
                    match routes.get(&label) {
                        Some(EdgeTarget::Node(next)) => current = next.clone(),
                        Some(EdgeTarget::End) => return (state, false),
                        None => {
                            state.push_error(format!(
                                "internal error: no route for label '{label}' from '{current}'"
                            ));
                            return (state, false);
                        }
                    }
                }
                Some(Edge::End) | None => return (state, false),
            }
        }
    }
}
