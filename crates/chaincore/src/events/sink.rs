use super::ExecutionId;
use crate::{NodeOutput, NotifyError};
use async_trait::async_trait;

/// Receives lifecycle notifications from the executor.
///
/// Every callback names the run it belongs to, so one sink can serve
/// concurrent runs. Calls are best-effort: the executor logs and swallows any
/// error returned here. A sink shared between runs must serialize its own
/// side effects.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn on_workflow_start(&self, execution_id: ExecutionId, workflow_name: Option<&str>)
        -> Result<(), NotifyError>;

    async fn on_node_result(
        &self,
        execution_id: ExecutionId,
        node_name: &str,
        node_type: &str,
        result: &NodeOutput,
        success: bool,
    ) -> Result<(), NotifyError>;

    async fn on_workflow_complete(
        &self,
        execution_id: ExecutionId,
        node_count: usize,
        duration_ms: Option<u64>,
    ) -> Result<(), NotifyError>;

    async fn on_workflow_error(
        &self,
        execution_id: ExecutionId,
        node_name: Option<&str>,
        error: &str,
    ) -> Result<(), NotifyError>;
}

/// Sink that drops every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl NotificationSink for NoopNotifier {
    async fn on_workflow_start(&self, _execution_id: ExecutionId, _name: Option<&str>) -> Result<(), NotifyError> {
        Ok(())
    }

    async fn on_node_result(
        &self,
        _execution_id: ExecutionId,
        _node_name: &str,
        _node_type: &str,
        _result: &NodeOutput,
        _success: bool,
    ) -> Result<(), NotifyError> {
        Ok(())
    }

    async fn on_workflow_complete(
        &self,
        _execution_id: ExecutionId,
        _node_count: usize,
        _duration_ms: Option<u64>,
    ) -> Result<(), NotifyError> {
        Ok(())
    }

    async fn on_workflow_error(
        &self,
        _execution_id: ExecutionId,
        _node_name: Option<&str>,
        _error: &str,
    ) -> Result<(), NotifyError> {
        Ok(())
    }
}
