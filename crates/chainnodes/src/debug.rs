use async_trait::async_trait;
use chaincore::{
    ExecutionContext, ItemOutput, Node, NodeDescription, NodeError, ParameterKind, ParameterSpec, ParameterValue,
};
use chainruntime::NodeFactory;
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;

/// Logs every item and passes it through
pub struct DebugNode {
    description: NodeDescription,
}

impl DebugNode {
    pub fn new() -> Self {
        Self {
            description: NodeDescription::new("debug.log", "Debug Log")
                .with_description("Logs items for debugging")
                .with_category("debug")
                .with_parameter(ParameterSpec::new("label", ParameterKind::String).with_default(json!("DEBUG"))),
        }
    }
}

impl Default for DebugNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for DebugNode {
    fn description(&self) -> &NodeDescription {
        &self.description
    }

    async fn execute_item(&self, ctx: &ExecutionContext, index: usize) -> Result<ItemOutput, NodeError> {
        let label = ctx.parameter_str("label", index)?;
        let item = ctx.item(index).map(|i| i.json.clone()).unwrap_or(JsonValue::Null);

        tracing::info!(node = ctx.node_id(), index, "{}: {}", label, item);

        Ok(ItemOutput::single(item))
    }
}

pub struct DebugNodeFactory;

impl NodeFactory for DebugNodeFactory {
    fn create(&self, _parameters: &HashMap<String, ParameterValue>) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(DebugNode::new()))
    }
}
