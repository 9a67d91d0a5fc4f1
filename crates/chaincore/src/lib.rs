//! Core abstractions for the chainflow engine
//!
//! Workflow documents, items flowing between nodes, the node contract and
//! the per-invocation execution context. Everything else in the workspace
//! builds on these types.

mod context;
mod error;
pub mod events;
mod item;
mod node;
mod value;
mod workflow;

pub use context::{Collaborators, ExecutionContext};
pub use error::{FlowError, NodeError, NotifyError};
pub use events::*;
pub use item::{ExecutionItem, ItemError, ItemOutput, NodeOutput, PortItems};
pub use node::{json_type_name, Node, NodeDescription, ParameterKind, ParameterSpec};
pub use value::ParameterValue;
pub use workflow::{Edge, NodeId, NodeInstance, RetryPolicy, WorkflowDefinition, WorkflowId};

/// Result type for run-level operations
pub type Result<T> = std::result::Result<T, FlowError>;
