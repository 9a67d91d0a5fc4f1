use super::NotificationSink;
use crate::{NodeOutput, NotifyError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

pub type ExecutionId = Uuid;

/// Events published on the [`EventBus`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    WorkflowStarted {
        execution_id: ExecutionId,
        workflow: Option<String>,
        timestamp: DateTime<Utc>,
    },
    NodeFinished {
        execution_id: ExecutionId,
        node_id: String,
        node_type: String,
        items: usize,
        errors: usize,
        success: bool,
        timestamp: DateTime<Utc>,
    },
    WorkflowCompleted {
        execution_id: ExecutionId,
        node_count: usize,
        duration_ms: Option<u64>,
        timestamp: DateTime<Utc>,
    },
    WorkflowFailed {
        execution_id: ExecutionId,
        node_id: Option<String>,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl ExecutionEvent {
    /// Run this event belongs to.
    pub fn execution_id(&self) -> ExecutionId {
        match self {
            ExecutionEvent::WorkflowStarted { execution_id, .. }
            | ExecutionEvent::NodeFinished { execution_id, .. }
            | ExecutionEvent::WorkflowCompleted { execution_id, .. }
            | ExecutionEvent::WorkflowFailed { execution_id, .. } => *execution_id,
        }
    }
}

/// Broadcast fan-out of lifecycle notifications.
///
/// Implements [`NotificationSink`], so it can be handed to the executor
/// directly; subscribers (a CLI, a chat bot bridge) render the events.
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    /// A `capacity` of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.sender.send(event);
    }
}

#[async_trait]
impl NotificationSink for EventBus {
    async fn on_workflow_start(
        &self,
        execution_id: ExecutionId,
        workflow_name: Option<&str>,
    ) -> Result<(), NotifyError> {
        self.emit(ExecutionEvent::WorkflowStarted {
            execution_id,
            workflow: workflow_name.map(str::to_string),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn on_node_result(
        &self,
        execution_id: ExecutionId,
        node_name: &str,
        node_type: &str,
        result: &NodeOutput,
        success: bool,
    ) -> Result<(), NotifyError> {
        let items = result.iter().map(Vec::len).sum();
        let errors = result.iter().flatten().filter(|i| i.is_error()).count();
        self.emit(ExecutionEvent::NodeFinished {
            execution_id,
            node_id: node_name.to_string(),
            node_type: node_type.to_string(),
            items,
            errors,
            success,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn on_workflow_complete(
        &self,
        execution_id: ExecutionId,
        node_count: usize,
        duration_ms: Option<u64>,
    ) -> Result<(), NotifyError> {
        self.emit(ExecutionEvent::WorkflowCompleted {
            execution_id,
            node_count,
            duration_ms,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn on_workflow_error(
        &self,
        execution_id: ExecutionId,
        node_name: Option<&str>,
        error: &str,
    ) -> Result<(), NotifyError> {
        self.emit(ExecutionEvent::WorkflowFailed {
            execution_id,
            node_id: node_name.map(str::to_string),
            error: error.to_string(),
            timestamp: Utc::now(),
        });
        Ok(())
    }
}
