use async_trait::async_trait;
use chaincore::{
    ExecutionContext, ItemOutput, Node, NodeDescription, NodeError, ParameterKind, ParameterSpec, ParameterValue,
};
use chainruntime::NodeFactory;
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use tokio::time::{sleep, Duration};

/// Delay each item for a specified duration
pub struct DelayNode {
    description: NodeDescription,
}

impl DelayNode {
    pub fn new() -> Self {
        Self {
            description: NodeDescription::new("time.delay", "Delay")
                .with_description("Delay each item for the given milliseconds")
                .with_category("time")
                .with_parameter(ParameterSpec::new("delayMs", ParameterKind::Number).with_default(json!(1000))),
        }
    }
}

impl Default for DelayNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for DelayNode {
    fn description(&self) -> &NodeDescription {
        &self.description
    }

    async fn execute_item(&self, ctx: &ExecutionContext, index: usize) -> Result<ItemOutput, NodeError> {
        let delay_ms = ctx.parameter_f64("delayMs", index)?.max(0.0) as u64;

        tracing::debug!(node = ctx.node_id(), index, "Delaying for {}ms", delay_ms);

        tokio::select! {
            _ = ctx.cancellation().cancelled() => return Err(NodeError::Cancelled),
            _ = sleep(Duration::from_millis(delay_ms)) => {}
        }

        let item = ctx.item(index).map(|i| i.json.clone()).unwrap_or(JsonValue::Null);
        Ok(ItemOutput::single(item))
    }
}

pub struct DelayNodeFactory;

impl NodeFactory for DelayNodeFactory {
    fn create(&self, parameters: &HashMap<String, ParameterValue>) -> Result<Box<dyn Node>, NodeError> {
        if let Some(ParameterValue::Literal(delay)) = parameters.get("delayMs") {
            if delay.as_f64().map_or(true, |d| d < 0.0) {
                return Err(NodeError::ExecutionFailed(format!("delayMs must be a non-negative number, got {}", delay)));
            }
        }
        Ok(Box::new(DelayNode::new()))
    }
}
