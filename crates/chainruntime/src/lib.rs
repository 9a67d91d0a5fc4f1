//! Workflow execution runtime
//!
//! This crate provides the engine that runs workflows: the node registry,
//! graph validation, and the scheduler that drives nodes item by item.

mod executor;
mod plan;
mod registry;
mod runtime;

pub use executor::{ExecutionResult, ExecutionResultMap, RunState, WorkflowExecutor};
pub use plan::ExecutionPlan;
pub use registry::{NodeFactory, NodeRegistry};
pub use runtime::{FlowRuntime, RuntimeConfig};
