use crate::{registry::NodeRegistry, ExecutionResult, WorkflowExecutor};
use chaincore::{Collaborators, EventBus, ExecutionEvent, ExecutionItem, FlowError, WorkflowDefinition, WorkflowId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Main runtime for executing workflows
///
/// Owns the executor and an event bus that every run reports to.
pub struct FlowRuntime {
    registry: Arc<NodeRegistry>,
    executor: WorkflowExecutor,
    event_bus: Arc<EventBus>,
    workflows: RwLock<HashMap<WorkflowId, WorkflowDefinition>>,
}

impl FlowRuntime {
    /// Create a new runtime with a pre-configured registry
    pub fn with_registry(registry: Arc<NodeRegistry>, config: RuntimeConfig) -> Self {
        Self::with_collaborators(registry, config, Collaborators::new())
    }

    /// Create a runtime whose nodes see the given collaborators. The
    /// notification sink is always the runtime's event bus.
    pub fn with_collaborators(registry: Arc<NodeRegistry>, config: RuntimeConfig, collaborators: Collaborators) -> Self {
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        let collaborators = Arc::new(collaborators.with_notifier(event_bus.clone()));
        let executor = WorkflowExecutor::new(registry.clone(), collaborators).with_item_timeout(config.item_timeout_ms);

        Self {
            registry,
            executor,
            event_bus,
            workflows: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Register a workflow
    pub async fn register_workflow(&self, workflow: WorkflowDefinition) {
        let mut workflows = self.workflows.write().await;
        workflows.insert(workflow.id.clone(), workflow);
    }

    /// Execute a registered workflow by ID
    pub async fn execute_workflow(&self, workflow_id: &str) -> Result<ExecutionResult, FlowError> {
        let workflows = self.workflows.read().await;
        let workflow = workflows
            .get(workflow_id)
            .ok_or_else(|| FlowError::WorkflowNotFound(workflow_id.to_string()))?;

        self.executor.execute(workflow).await
    }

    /// Execute a workflow directly (without registration)
    pub async fn execute(&self, workflow: &WorkflowDefinition) -> Result<ExecutionResult, FlowError> {
        self.executor.execute(workflow).await
    }

    pub async fn execute_with_input(
        &self,
        workflow: &WorkflowDefinition,
        items: Vec<ExecutionItem>,
    ) -> Result<ExecutionResult, FlowError> {
        self.executor.execute_with_input(workflow, items).await
    }

    pub async fn execute_with_cancel(
        &self,
        workflow: &WorkflowDefinition,
        items: Option<Vec<ExecutionItem>>,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult, FlowError> {
        self.executor.execute_with_cancel(workflow, items, cancel).await
    }

    /// Check a workflow without running it: graph shape and node types.
    pub fn validate(&self, workflow: &WorkflowDefinition) -> Result<crate::ExecutionPlan, FlowError> {
        let plan = crate::ExecutionPlan::build(workflow)?;
        for instance in &workflow.nodes {
            self.registry.create_node(instance)?;
        }
        Ok(plan)
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub event_buffer_size: usize,
    pub item_timeout_ms: Option<u64>,
}

impl RuntimeConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 1000,
            item_timeout_ms: None,
        }
    }
}
