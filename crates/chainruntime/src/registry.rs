use chaincore::{FlowError, Node, NodeDescription, NodeError, NodeInstance, ParameterValue};
use std::collections::HashMap;
use std::sync::Arc;

/// Factory trait for creating node instances
pub trait NodeFactory: Send + Sync {
    /// Create a fresh node for the given instance parameters.
    fn create(&self, parameters: &HashMap<String, ParameterValue>) -> Result<Box<dyn Node>, NodeError>;
}

struct FnFactory<F>(F);

impl<F> NodeFactory for FnFactory<F>
where
    F: Fn() -> Result<Box<dyn Node>, NodeError> + Send + Sync,
{
    fn create(&self, _parameters: &HashMap<String, ParameterValue>) -> Result<Box<dyn Node>, NodeError> {
        (self.0)()
    }
}

/// Registry of available node types, keyed by type tag.
///
/// Register every type before the first execution; lookups after that are
/// read-only and the registry is shared behind an `Arc`.
pub struct NodeRegistry {
    factories: HashMap<String, Arc<dyn NodeFactory>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a node factory. A second registration for the same tag
    /// replaces the first.
    pub fn register(&mut self, node_type: impl Into<String>, factory: impl NodeFactory + 'static) {
        let node_type = node_type.into();
        if self.factories.insert(node_type.clone(), Arc::new(factory)).is_some() {
            tracing::debug!("Replacing node type: {}", node_type);
        } else {
            tracing::debug!("Registering node type: {}", node_type);
        }
    }

    /// Register a constructor that ignores instance parameters.
    pub fn register_fn<F>(&mut self, node_type: impl Into<String>, constructor: F)
    where
        F: Fn() -> Result<Box<dyn Node>, NodeError> + Send + Sync + 'static,
    {
        self.register(node_type, FnFactory(constructor));
    }

    /// Fresh node for a type tag, built with no parameters.
    pub fn resolve(&self, node_type: &str) -> Result<Box<dyn Node>, FlowError> {
        self.build(node_type, node_type, &HashMap::new())
    }

    /// Fresh node for a workflow node instance.
    pub fn create_node(&self, instance: &NodeInstance) -> Result<Box<dyn Node>, FlowError> {
        self.build(&instance.id, &instance.node_type, &instance.parameters)
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.factories.contains_key(node_type)
    }

    /// Registered type tags, sorted.
    pub fn list_node_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn describe(&self, node_type: &str) -> Option<NodeDescription> {
        self.resolve(node_type).ok().map(|node| node.description().clone())
    }

    fn build(
        &self,
        node: &str,
        node_type: &str,
        parameters: &HashMap<String, ParameterValue>,
    ) -> Result<Box<dyn Node>, FlowError> {
        let factory = self
            .factories
            .get(node_type)
            .ok_or_else(|| FlowError::UnknownNodeType(node_type.to_string()))?;

        factory.create(parameters).map_err(|e| FlowError::NodeConstructionFailed {
            node: node.to_string(),
            reason: e.to_string(),
        })
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chaincore::{ExecutionContext, ItemOutput};
    use serde_json::json;

    struct Tagged(NodeDescription);

    #[async_trait]
    impl Node for Tagged {
        fn description(&self) -> &NodeDescription {
            &self.0
        }

        async fn execute_item(&self, _ctx: &ExecutionContext, _index: usize) -> Result<ItemOutput, NodeError> {
            Ok(ItemOutput::single(json!({})))
        }
    }

    fn tagged(display: &'static str) -> impl Fn() -> Result<Box<dyn Node>, NodeError> + Send + Sync {
        move || Ok(Box::new(Tagged(NodeDescription::new("t", display))) as Box<dyn Node>)
    }

    #[test]
    fn last_registration_wins() {
        let mut registry = NodeRegistry::new();
        registry.register_fn("t", tagged("first"));
        registry.register_fn("t", tagged("second"));

        let node = registry.resolve("t").unwrap();
        assert_eq!(node.description().display_name, "second");
        assert_eq!(registry.list_node_types(), vec!["t".to_string()]);
    }

    #[test]
    fn unknown_type_is_reported() {
        let registry = NodeRegistry::new();
        assert!(matches!(
            registry.resolve("Bogus"),
            Err(FlowError::UnknownNodeType(t)) if t == "Bogus"
        ));
    }

    #[test]
    fn constructor_failure_names_the_instance() {
        let mut registry = NodeRegistry::new();
        registry.register_fn("broken", || Err(NodeError::ExecutionFailed("no wallet".into())));

        let instance = NodeInstance::new("swap", "broken");
        match registry.create_node(&instance) {
            Err(FlowError::NodeConstructionFailed { node, reason }) => {
                assert_eq!(node, "swap");
                assert!(reason.contains("no wallet"));
            }
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }
}
