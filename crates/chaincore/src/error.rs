use thiserror::Error;

/// Run-aborting failures. A run that hits one of these returns no result map.
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Workflow contains a cycle")]
    CyclicWorkflow,

    #[error("Workflow has no start node")]
    NoStartNode,

    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("Node '{node}' could not be constructed: {reason}")]
    NodeConstructionFailed { node: String, reason: String },

    #[error("Nodes never became ready: {}", .0.join(", "))]
    UnreachableNode(Vec<String>),

    #[error("Duplicate node id: {0}")]
    DuplicateNodeId(String),

    #[error("Invalid connection: {0}")]
    InvalidConnection(String),

    #[error("Execution cancelled")]
    Cancelled,

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FlowError {
    /// Stable tag for the error, used in notifications and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            FlowError::CyclicWorkflow => "cyclic_workflow",
            FlowError::NoStartNode => "no_start_node",
            FlowError::UnknownNodeType(_) => "unknown_node_type",
            FlowError::NodeConstructionFailed { .. } => "node_construction_failed",
            FlowError::UnreachableNode(_) => "unreachable_node",
            FlowError::DuplicateNodeId(_) => "duplicate_node_id",
            FlowError::InvalidConnection(_) => "invalid_connection",
            FlowError::Cancelled => "cancelled",
            FlowError::WorkflowNotFound(_) => "workflow_not_found",
            FlowError::Io(_) => "io",
            FlowError::Serialization(_) => "serialization",
        }
    }
}

/// Failures scoped to a single item of a single node.
///
/// These never leave the node boundary: the executor turns them into
/// error-shaped items.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("Missing required parameter: {0}")]
    MissingRequiredParameter(String),

    #[error("Invalid type for parameter '{name}': expected {expected}, got {actual}")]
    ParameterTypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Expression error: {0}")]
    Expression(String),

    #[error("Missing collaborator: {0}")]
    MissingCollaborator(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Payment requirement mismatch on '{field}': expected {expected}, got {actual}")]
    PaymentRequirementMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Payment rejected: {0}")]
    PaymentRejected(String),

    #[error("Timeout after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Cancelled")]
    Cancelled,
}

impl NodeError {
    pub fn kind(&self) -> &'static str {
        match self {
            NodeError::MissingRequiredParameter(_) => "missing_required_parameter",
            NodeError::ParameterTypeMismatch { .. } => "parameter_type_mismatch",
            NodeError::Expression(_) => "expression",
            NodeError::MissingCollaborator(_) => "missing_collaborator",
            NodeError::ExecutionFailed(_) => "execution_failed",
            NodeError::Http(_) => "http",
            NodeError::PaymentRequirementMismatch { .. } => "payment_requirement_mismatch",
            NodeError::PaymentRejected(_) => "payment_rejected",
            NodeError::Timeout { .. } => "timeout",
            NodeError::Cancelled => "cancelled",
        }
    }
}

impl From<reqwest::Error> for NodeError {
    fn from(e: reqwest::Error) -> Self {
        NodeError::Http(e.to_string())
    }
}

/// Failure inside a notification sink. Always logged and swallowed.
#[derive(Error, Debug)]
#[error("Notification failed: {0}")]
pub struct NotifyError(pub String);
