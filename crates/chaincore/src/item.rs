use crate::NodeError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};

/// One unit of data flowing along a port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionItem {
    pub json: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ItemError>,
    /// Index of the input item this item was produced from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paired_item: Option<usize>,
}

/// Error details carried by an error-shaped item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemError {
    pub kind: String,
    pub message: String,
    pub parameters: Map<String, JsonValue>,
}

impl ExecutionItem {
    pub fn new(json: JsonValue) -> Self {
        Self {
            json,
            error: None,
            paired_item: None,
        }
    }

    pub fn empty() -> Self {
        Self::new(JsonValue::Object(Map::new()))
    }

    pub fn failure(error: &NodeError, parameters: Map<String, JsonValue>, index: usize) -> Self {
        let message = error.to_string();
        Self {
            json: json!({ "success": false, "error": message }),
            error: Some(ItemError {
                kind: error.kind().to_string(),
                message,
                parameters,
            }),
            paired_item: Some(index),
        }
    }

    pub fn paired_with(mut self, index: usize) -> Self {
        self.paired_item = Some(index);
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl From<JsonValue> for ExecutionItem {
    fn from(json: JsonValue) -> Self {
        ExecutionItem::new(json)
    }
}

/// Items emitted on one port.
pub type PortItems = Vec<ExecutionItem>;

/// A node's full output: one item sequence per output port.
pub type NodeOutput = Vec<PortItems>;

/// What a node produced for a single input item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemOutput {
    pub port: usize,
    pub items: Vec<JsonValue>,
}

impl ItemOutput {
    pub fn single(json: JsonValue) -> Self {
        Self {
            port: 0,
            items: vec![json],
        }
    }

    pub fn many(items: Vec<JsonValue>) -> Self {
        Self { port: 0, items }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn on_port(mut self, port: usize) -> Self {
        self.port = port;
        self
    }
}
