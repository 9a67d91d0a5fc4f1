use crate::plan::ExecutionPlan;
use crate::registry::NodeRegistry;
use chaincore::{
    Collaborators, ExecutionContext, ExecutionId, ExecutionItem, FlowError, Node, NodeError, NodeId,
    NodeInstance, NodeOutput, NotifyError, PortItems, RetryPolicy, WorkflowDefinition,
};
use futures::FutureExt;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Output of every node in a run, keyed by node id.
pub type ExecutionResultMap = HashMap<NodeId, NodeOutput>;

/// Lifecycle of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Pending,
    Resolving,
    RunningNode,
    Completed,
    Failed,
}

/// Drives a workflow definition to completion.
///
/// Nodes run one at a time in topological order; among nodes that become
/// ready together, the one declared first runs first. Items within a node
/// are processed in ascending index order.
pub struct WorkflowExecutor {
    registry: Arc<NodeRegistry>,
    collaborators: Arc<Collaborators>,
    item_timeout: Option<Duration>,
}

struct Fatal {
    node: Option<NodeId>,
    error: FlowError,
}

impl From<FlowError> for Fatal {
    fn from(error: FlowError) -> Self {
        Fatal { node: None, error }
    }
}

/// Per-run bookkeeping, owned by the executor for the length of one run.
struct Run<'a> {
    definition: &'a WorkflowDefinition,
    execution_id: ExecutionId,
    cancel: CancellationToken,
    state: RunState,
    outputs: ExecutionResultMap,
    order: Vec<NodeId>,
}

impl Run<'_> {
    fn transition(&mut self, next: RunState) {
        tracing::trace!(from = ?self.state, to = ?next, "run state");
        self.state = next;
    }
}

impl WorkflowExecutor {
    pub fn new(registry: Arc<NodeRegistry>, collaborators: Arc<Collaborators>) -> Self {
        Self {
            registry,
            collaborators,
            item_timeout: None,
        }
    }

    /// Fail items that take longer than `millis`.
    pub fn with_item_timeout(mut self, millis: Option<u64>) -> Self {
        self.item_timeout = millis.map(Duration::from_millis);
        self
    }

    /// Execute a workflow. Start nodes receive a single empty item.
    pub async fn execute(&self, definition: &WorkflowDefinition) -> Result<ExecutionResult, FlowError> {
        self.execute_with_cancel(definition, None, CancellationToken::new()).await
    }

    /// Execute a workflow, feeding `items` to every start node.
    pub async fn execute_with_input(
        &self,
        definition: &WorkflowDefinition,
        items: Vec<ExecutionItem>,
    ) -> Result<ExecutionResult, FlowError> {
        self.execute_with_cancel(definition, Some(items), CancellationToken::new())
            .await
    }

    /// Execute a workflow under a cancellation token.
    ///
    /// Once the token fires no further node starts, the in-flight item is
    /// abandoned without output and the run fails with `Cancelled`.
    pub async fn execute_with_cancel(
        &self,
        definition: &WorkflowDefinition,
        trigger: Option<Vec<ExecutionItem>>,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult, FlowError> {
        let execution_id = ExecutionId::new_v4();
        let span = tracing::info_span!("workflow", workflow = %definition.id, execution = %execution_id);
        let mut run = Run {
            definition,
            execution_id,
            cancel,
            state: RunState::Pending,
            outputs: HashMap::new(),
            order: Vec::new(),
        };

        async move {
            let started = Instant::now();
            tracing::info!("Starting workflow execution: {}", definition.id);
            let name = definition.name.as_deref().or(Some(definition.id.as_str()));
            self.notify(
                "on_workflow_start",
                self.collaborators.notifier().on_workflow_start(execution_id, name).await,
            );

            run.transition(RunState::Resolving);
            let outcome = match ExecutionPlan::build(definition) {
                Ok(plan) => self.drive(&mut run, &plan, trigger).await,
                Err(e) => Err(Fatal::from(e)),
            };
            self.finish(run, outcome, started).await
        }
        .instrument(span)
        .await
    }

    /// Run against a plan that skipped validation.
    #[cfg(test)]
    pub(crate) async fn execute_plan(
        &self,
        definition: &WorkflowDefinition,
        plan: &ExecutionPlan,
    ) -> Result<ExecutionResult, FlowError> {
        let mut run = Run {
            definition,
            execution_id: ExecutionId::new_v4(),
            cancel: CancellationToken::new(),
            state: RunState::Resolving,
            outputs: HashMap::new(),
            order: Vec::new(),
        };
        let outcome = self.drive(&mut run, plan, None).await;
        self.finish(run, outcome, Instant::now()).await
    }

    async fn finish(
        &self,
        mut run: Run<'_>,
        outcome: Result<(), Fatal>,
        started: Instant,
    ) -> Result<ExecutionResult, FlowError> {
        let duration_ms = started.elapsed().as_millis() as u64;
        let notifier = self.collaborators.notifier();
        match outcome {
            Ok(()) => {
                run.transition(RunState::Completed);
                tracing::info!("Workflow completed: {} nodes in {}ms", run.order.len(), duration_ms);
                self.notify(
                    "on_workflow_complete",
                    notifier.on_workflow_complete(run.execution_id, run.order.len(), Some(duration_ms)).await,
                );
                Ok(ExecutionResult {
                    execution_id: run.execution_id,
                    workflow_id: run.definition.id.clone(),
                    status: run.state,
                    outputs: run.outputs,
                    execution_order: run.order,
                    duration_ms,
                })
            }
            Err(Fatal { node, error }) => {
                run.transition(RunState::Failed);
                tracing::error!("Workflow failed: {}", error);
                self.notify(
                    "on_workflow_error",
                    notifier.on_workflow_error(run.execution_id, node.as_deref(), &error.to_string()).await,
                );
                Err(error)
            }
        }
    }

    async fn drive(
        &self,
        run: &mut Run<'_>,
        plan: &ExecutionPlan,
        trigger: Option<Vec<ExecutionItem>>,
    ) -> Result<(), Fatal> {
        let definition = run.definition;

        // Every node is built before the first one runs, so an unknown type or
        // a failing constructor aborts the run without side effects.
        let mut nodes = Vec::with_capacity(definition.nodes.len());
        for instance in &definition.nodes {
            let node = self.registry.create_node(instance).map_err(|error| Fatal {
                node: Some(instance.id.clone()),
                error,
            })?;
            nodes.push(node);
        }

        let start_items = trigger.unwrap_or_else(|| vec![ExecutionItem::empty()]);
        let mut in_degree = plan.in_degrees();
        let mut ready: VecDeque<usize> = plan.start_nodes().into();

        while let Some(position) = ready.pop_front() {
            if run.cancel.is_cancelled() {
                return Err(FlowError::Cancelled.into());
            }

            let instance = &definition.nodes[position];
            let node = &nodes[position];
            let inputs = if plan.is_start(position) {
                vec![start_items.clone()]
            } else {
                collect_inputs(definition, instance, node.description().inputs, &run.outputs)
            };

            run.transition(RunState::RunningNode);
            let output = self
                .run_node(run, node.as_ref(), instance, inputs)
                .await
                .map_err(|error| Fatal {
                    node: Some(instance.id.clone()),
                    error,
                })?;

            let success = !output.iter().flatten().any(ExecutionItem::is_error);
            self.notify(
                "on_node_result",
                self.collaborators
                    .notifier()
                    .on_node_result(run.execution_id, &instance.id, &instance.node_type, &output, success)
                    .await,
            );

            run.outputs.insert(instance.id.clone(), output);
            run.order.push(instance.id.clone());
            run.transition(RunState::Resolving);

            let mut newly_ready = Vec::new();
            for &next in plan.successors(position) {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    newly_ready.push(next);
                }
            }
            newly_ready.sort_unstable();
            ready.extend(newly_ready);
        }

        if run.order.len() < definition.nodes.len() {
            let unreached = definition
                .nodes
                .iter()
                .filter(|n| !run.outputs.contains_key(&n.id))
                .map(|n| n.id.clone())
                .collect();
            return Err(FlowError::UnreachableNode(unreached).into());
        }

        Ok(())
    }

    async fn run_node(
        &self,
        run: &Run<'_>,
        node: &dyn Node,
        instance: &NodeInstance,
        inputs: Vec<PortItems>,
    ) -> Result<NodeOutput, FlowError> {
        let description = node.description();
        let ctx = ExecutionContext::new(
            run.execution_id,
            instance.id.clone(),
            description.clone(),
            instance.parameters.clone(),
            inputs,
            self.collaborators.clone(),
            run.cancel.clone(),
        );
        let mut ports: NodeOutput = vec![Vec::new(); description.outputs.max(1)];
        let started = Instant::now();

        tracing::debug!(node = %instance.id, items = ctx.item_count(), "running node");

        if let Err(e) = node.setup(&ctx).await {
            tracing::warn!(node = %instance.id, error = %e, "node setup failed");
            if ctx.item_count() == 0 {
                let mut item = ExecutionItem::failure(&e, ctx.resolved_parameters(0), 0);
                item.paired_item = None;
                ports[0].push(item);
            }
            for index in 0..ctx.item_count() {
                ports[0].push(ExecutionItem::failure(&e, ctx.resolved_parameters(index), index));
            }
            return Ok(ports);
        }

        for index in 0..ctx.item_count() {
            if run.cancel.is_cancelled() {
                return Err(FlowError::Cancelled);
            }

            match self.run_item(node, &ctx, instance.retry_policy.as_ref(), index).await {
                Ok(produced) => {
                    if ports.len() <= produced.port {
                        ports.resize(produced.port + 1, Vec::new());
                    }
                    ports[produced.port].extend(
                        produced
                            .items
                            .into_iter()
                            .map(|json| ExecutionItem::new(json).paired_with(index)),
                    );
                }
                Err(NodeError::Cancelled) if run.cancel.is_cancelled() => {
                    return Err(FlowError::Cancelled);
                }
                Err(e) => {
                    tracing::warn!(node = %instance.id, index, error = %e, "item failed");
                    ports[0].push(ExecutionItem::failure(&e, ctx.resolved_parameters(index), index));
                }
            }
        }

        tracing::info!("Node {} completed in {}ms", instance.id, started.elapsed().as_millis());
        Ok(ports)
    }

    async fn run_item(
        &self,
        node: &dyn Node,
        ctx: &ExecutionContext,
        policy: Option<&RetryPolicy>,
        index: usize,
    ) -> Result<chaincore::ItemOutput, NodeError> {
        let attempts = policy.map_or(1, |p| p.max_attempts.max(1));
        let mut attempt = 1;
        loop {
            match self.attempt_item(node, ctx, index).await {
                Err(e) if attempt < attempts && e != NodeError::Cancelled => {
                    let delay = policy.map_or(0, |p| p.delay_for(attempt));
                    tracing::debug!(node = ctx.node_id(), index, attempt, delay, error = %e, "retrying item");
                    tokio::select! {
                        _ = ctx.cancellation().cancelled() => return Err(NodeError::Cancelled),
                        _ = sleep(Duration::from_millis(delay)) => {}
                    }
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn attempt_item(
        &self,
        node: &dyn Node,
        ctx: &ExecutionContext,
        index: usize,
    ) -> Result<chaincore::ItemOutput, NodeError> {
        let guarded = AssertUnwindSafe(node.execute_item(ctx, index)).catch_unwind();
        let work = async {
            let result = match self.item_timeout {
                Some(limit) => match timeout(limit, guarded).await {
                    Ok(result) => result,
                    Err(_) => {
                        return Err(NodeError::Timeout {
                            millis: limit.as_millis() as u64,
                        })
                    }
                },
                None => guarded.await,
            };
            result.unwrap_or_else(|panic| Err(NodeError::ExecutionFailed(panic_message(panic))))
        };

        tokio::select! {
            biased;
            _ = ctx.cancellation().cancelled() => Err(NodeError::Cancelled),
            result = work => result,
        }
    }

    fn notify(&self, callback: &str, result: Result<(), NotifyError>) {
        if let Err(e) = result {
            tracing::warn!(callback, error = %e, "notification sink failed");
        }
    }
}

/// Merge upstream outputs into this node's input ports.
///
/// Edges feeding the same port are concatenated in declaration order.
fn collect_inputs(
    definition: &WorkflowDefinition,
    instance: &NodeInstance,
    declared_inputs: usize,
    outputs: &ExecutionResultMap,
) -> Vec<PortItems> {
    let mut ports: Vec<PortItems> = vec![Vec::new(); declared_inputs.max(1)];
    for edge in definition.edges.iter().filter(|e| e.destination == instance.id) {
        if ports.len() <= edge.destination_port {
            ports.resize(edge.destination_port + 1, Vec::new());
        }
        if let Some(items) = outputs.get(&edge.source).and_then(|o| o.get(edge.source_port)) {
            ports[edge.destination_port].extend(items.iter().cloned());
        }
    }
    ports
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("node panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("node panicked: {}", s)
    } else {
        "node panicked".to_string()
    }
}

/// Result of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub execution_id: ExecutionId,
    pub workflow_id: String,
    pub status: RunState,
    pub outputs: ExecutionResultMap,
    /// Node ids in invocation order.
    pub execution_order: Vec<NodeId>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub fn output(&self, node_id: &str) -> Option<&NodeOutput> {
        self.outputs.get(node_id)
    }

    /// Items on a node's default output port.
    pub fn items(&self, node_id: &str) -> &[ExecutionItem] {
        self.outputs
            .get(node_id)
            .and_then(|ports| ports.first())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_errors(&self) -> bool {
        self.outputs.values().flatten().flatten().any(ExecutionItem::is_error)
    }
}
