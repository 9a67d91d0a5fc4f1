use crate::{FlowError, ParameterValue};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub type WorkflowId = String;
pub type NodeId = String;

/// Complete workflow definition.
///
/// Supplied by the caller and treated as immutable for the length of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: WorkflowId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub nodes: Vec<NodeInstance>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl WorkflowDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn add_node(&mut self, node: NodeInstance) -> NodeId {
        let id = node.id.clone();
        self.nodes.push(node);
        id
    }

    /// Connect the default ports (0 → 0) of two nodes.
    pub fn connect(&mut self, source: impl Into<String>, destination: impl Into<String>) {
        self.connect_ports(source, 0, destination, 0);
    }

    pub fn connect_ports(
        &mut self,
        source: impl Into<String>,
        source_port: usize,
        destination: impl Into<String>,
        destination_port: usize,
    ) {
        self.edges.push(Edge {
            source: source.into(),
            source_port,
            destination: destination.into(),
            destination_port,
        });
    }

    pub fn from_json(json: &str) -> Result<Self, FlowError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }
}

/// A node placed in a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInstance {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub parameters: HashMap<String, ParameterValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,
}

impl NodeInstance {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            parameters: HashMap::new(),
            retry_policy: None,
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_retry(mut self, max_attempts: u32, delay_ms: u64) -> Self {
        self.retry_policy = Some(RetryPolicy {
            max_attempts,
            delay_ms,
            backoff_multiplier: 1.0,
        });
        self
    }
}

/// Data dependency from one node's output port to another node's input port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: NodeId,
    #[serde(default)]
    pub source_port: usize,
    pub destination: NodeId,
    #[serde(default)]
    pub destination_port: usize,
}

/// Per-item retry policy for a node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay_ms: u64,
    #[serde(default = "default_backoff")]
    pub backoff_multiplier: f64,
}

fn default_backoff() -> f64 {
    1.0
}

impl RetryPolicy {
    /// Delay before the given retry (1-based).
    pub fn delay_for(&self, retry: u32) -> u64 {
        let factor = self.backoff_multiplier.max(1.0).powi(retry.saturating_sub(1) as i32);
        (self.delay_ms as f64 * factor) as u64
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 1000,
            backoff_multiplier: 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_document_shape() {
        let doc = json!({
            "id": "wf-1",
            "name": "swap then deposit",
            "nodes": [
                { "id": "fetch", "type": "http.request", "parameters": { "url": "https://example.com" } },
                { "id": "scale", "type": "math.scale", "parameters": { "factor": 2 } }
            ],
            "edges": [
                { "source": "fetch", "destination": "scale" }
            ]
        });

        let wf = WorkflowDefinition::from_json(&doc.to_string()).unwrap();
        assert_eq!(wf.nodes.len(), 2);
        assert_eq!(wf.nodes[1].node_type, "math.scale");
        assert_eq!(wf.edges[0].source_port, 0);
        assert_eq!(wf.edges[0].destination_port, 0);
    }

    #[test]
    fn retry_delay_grows_with_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), 1000);
        assert_eq!(policy.delay_for(2), 2000);
        assert_eq!(policy.delay_for(3), 4000);
    }
}
