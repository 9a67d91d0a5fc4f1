use async_trait::async_trait;
use chaincore::{
    json_type_name, ExecutionContext, ItemOutput, Node, NodeDescription, NodeError, ParameterKind, ParameterSpec,
    ParameterValue,
};
use chainruntime::NodeFactory;
use serde_json::{json, Map, Value as JsonValue};
use std::collections::HashMap;

/// Multiply a numeric field of each item
pub struct ScaleNode {
    description: NodeDescription,
}

impl ScaleNode {
    pub fn new() -> Self {
        Self {
            description: NodeDescription::new("math.scale", "Scale")
                .with_description("Multiply a numeric field by a factor")
                .with_category("transform")
                .with_parameter(ParameterSpec::new("factor", ParameterKind::Number).required())
                .with_parameter(ParameterSpec::new("field", ParameterKind::String).with_default(json!("value"))),
        }
    }
}

impl Default for ScaleNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for ScaleNode {
    fn description(&self) -> &NodeDescription {
        &self.description
    }

    async fn execute_item(&self, ctx: &ExecutionContext, index: usize) -> Result<ItemOutput, NodeError> {
        let factor = ctx.parameter_f64("factor", index)?;
        let field = ctx.parameter_str("field", index)?;

        let mut item = ctx.item(index).map(|i| i.json.clone()).unwrap_or_else(|| json!({}));
        let current = item
            .get(&field)
            .ok_or_else(|| NodeError::ExecutionFailed(format!("item has no field '{}'", field)))?;
        let value = current.as_f64().ok_or_else(|| NodeError::ExecutionFailed(format!(
            "field '{}' is {}, not a number",
            field,
            json_type_name(current)
        )))?;

        item[field.as_str()] = json!(value * factor);
        Ok(ItemOutput::single(item))
    }
}

pub struct ScaleNodeFactory;

impl NodeFactory for ScaleNodeFactory {
    fn create(&self, parameters: &HashMap<String, ParameterValue>) -> Result<Box<dyn Node>, NodeError> {
        // A literal factor can be checked once instead of on every item.
        if let Some(ParameterValue::Literal(factor)) = parameters.get("factor") {
            if !factor.is_number() {
                return Err(NodeError::ParameterTypeMismatch {
                    name: "factor".into(),
                    expected: "number".into(),
                    actual: json_type_name(factor).into(),
                });
            }
        }
        Ok(Box::new(ScaleNode::new()))
    }
}

/// Set fields on each item
///
/// String values starting with `=` inside `values` are evaluated as
/// expressions against the item.
pub struct SetNode {
    description: NodeDescription,
}

impl SetNode {
    pub fn new() -> Self {
        Self {
            description: NodeDescription::new("transform.set", "Set Fields")
                .with_description("Merge fields into each item")
                .with_category("transform")
                .with_parameter(ParameterSpec::new("values", ParameterKind::Object).required())
                .with_parameter(ParameterSpec::new("keepOnlySet", ParameterKind::Boolean).with_default(json!(false))),
        }
    }
}

impl Default for SetNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for SetNode {
    fn description(&self) -> &NodeDescription {
        &self.description
    }

    async fn execute_item(&self, ctx: &ExecutionContext, index: usize) -> Result<ItemOutput, NodeError> {
        let values = match ctx.parameter("values", index)? {
            JsonValue::Object(values) => values,
            _ => Map::new(),
        };
        let source = ctx.item(index).map(|i| i.json.clone()).unwrap_or(JsonValue::Null);

        let mut out = match (&source, ctx.parameter_bool("keepOnlySet", index)?) {
            (JsonValue::Object(fields), false) => fields.clone(),
            _ => Map::new(),
        };
        for (key, value) in values {
            let resolved = ParameterValue::from(value).resolve(&source, index)?;
            out.insert(key, resolved);
        }

        Ok(ItemOutput::single(JsonValue::Object(out)))
    }
}

pub struct SetNodeFactory;

impl NodeFactory for SetNodeFactory {
    fn create(&self, _parameters: &HashMap<String, ParameterValue>) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(SetNode::new()))
    }
}
