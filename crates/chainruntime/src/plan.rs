//! Static validation of a workflow before anything runs.

use chaincore::{FlowError, WorkflowDefinition};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

/// Validated scheduling data for one workflow definition.
///
/// Nodes are addressed by their position in the declared node sequence.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    graph: DiGraph<usize, usize>,
    in_degree: Vec<usize>,
    /// Downstream positions per node, one entry per edge, in declaration order.
    successors: Vec<Vec<usize>>,
}

impl ExecutionPlan {
    /// Validate a definition: unique ids, edges between declared nodes, no
    /// cycles, at least one start node when there are nodes at all.
    pub fn build(definition: &WorkflowDefinition) -> Result<Self, FlowError> {
        let positions = index_nodes(definition)?;

        let mut plan = Self::empty(definition.nodes.len());
        for (edge_index, edge) in definition.edges.iter().enumerate() {
            let source = *positions.get(edge.source.as_str()).ok_or_else(|| {
                FlowError::InvalidConnection(format!("edge {} references unknown source '{}'", edge_index, edge.source))
            })?;
            let destination = *positions.get(edge.destination.as_str()).ok_or_else(|| {
                FlowError::InvalidConnection(format!(
                    "edge {} references unknown destination '{}'",
                    edge_index, edge.destination
                ))
            })?;
            plan.add_edge(source, destination, edge_index);
        }

        if toposort(&plan.graph, None).is_err() {
            return Err(FlowError::CyclicWorkflow);
        }

        if !definition.nodes.is_empty() && plan.start_nodes().is_empty() {
            return Err(FlowError::NoStartNode);
        }

        Ok(plan)
    }

    /// Plan without cycle or start-node checks. Edges with unknown endpoints
    /// are dropped.
    pub(crate) fn unchecked(definition: &WorkflowDefinition) -> Self {
        let positions: HashMap<&str, usize> = definition
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), i))
            .collect();

        let mut plan = Self::empty(definition.nodes.len());
        for (edge_index, edge) in definition.edges.iter().enumerate() {
            if let (Some(&s), Some(&d)) = (
                positions.get(edge.source.as_str()),
                positions.get(edge.destination.as_str()),
            ) {
                plan.add_edge(s, d, edge_index);
            }
        }
        plan
    }

    /// Positions with no inbound edge, in declared order.
    pub fn start_nodes(&self) -> Vec<usize> {
        (0..self.in_degree.len()).filter(|&p| self.in_degree[p] == 0).collect()
    }

    pub fn is_start(&self, position: usize) -> bool {
        self.in_degree.get(position) == Some(&0)
    }

    pub fn in_degrees(&self) -> Vec<usize> {
        self.in_degree.clone()
    }

    pub fn successors(&self, position: usize) -> &[usize] {
        self.successors.get(position).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of declared nodes.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    fn empty(node_count: usize) -> Self {
        let mut graph = DiGraph::with_capacity(node_count, 0);
        for position in 0..node_count {
            graph.add_node(position);
        }
        Self {
            graph,
            in_degree: vec![0; node_count],
            successors: vec![Vec::new(); node_count],
        }
    }

    fn add_edge(&mut self, source: usize, destination: usize, edge_index: usize) {
        self.graph
            .add_edge(NodeIndex::new(source), NodeIndex::new(destination), edge_index);
        self.in_degree[destination] += 1;
        self.successors[source].push(destination);
    }
}

fn index_nodes(definition: &WorkflowDefinition) -> Result<HashMap<&str, usize>, FlowError> {
    let mut positions = HashMap::with_capacity(definition.nodes.len());
    for (position, node) in definition.nodes.iter().enumerate() {
        if positions.insert(node.id.as_str(), position).is_some() {
            return Err(FlowError::DuplicateNodeId(node.id.clone()));
        }
    }
    Ok(positions)
}
