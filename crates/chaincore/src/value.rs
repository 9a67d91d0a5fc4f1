use crate::NodeError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

/// Parameter value as stored on a node instance.
///
/// In the document form a parameter is plain JSON. Strings starting with `=`
/// are expressions evaluated per item, e.g. `"={{ $json.amount }}"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum ParameterValue {
    Literal(JsonValue),
    Expression(String),
}

impl ParameterValue {
    pub fn expression(source: impl Into<String>) -> Self {
        ParameterValue::Expression(source.into())
    }

    /// Resolve against the payload of the item at `index`. Literals are
    /// returned unchanged for every index.
    pub fn resolve(&self, item: &JsonValue, index: usize) -> Result<JsonValue, NodeError> {
        match self {
            ParameterValue::Literal(v) => Ok(v.clone()),
            ParameterValue::Expression(expr) => evaluate(expr, item, index),
        }
    }
}

impl From<JsonValue> for ParameterValue {
    fn from(v: JsonValue) -> Self {
        match v {
            JsonValue::String(s) if s.starts_with('=') => ParameterValue::Expression(s[1..].to_string()),
            other => ParameterValue::Literal(other),
        }
    }
}

impl From<ParameterValue> for JsonValue {
    fn from(p: ParameterValue) -> Self {
        match p {
            ParameterValue::Literal(v) => v,
            ParameterValue::Expression(expr) => JsonValue::String(format!("={}", expr)),
        }
    }
}

impl From<&str> for ParameterValue {
    fn from(s: &str) -> Self {
        ParameterValue::from(JsonValue::String(s.to_string()))
    }
}

impl From<String> for ParameterValue {
    fn from(s: String) -> Self {
        ParameterValue::from(JsonValue::String(s))
    }
}

impl From<f64> for ParameterValue {
    fn from(n: f64) -> Self {
        ParameterValue::Literal(json!(n))
    }
}

impl From<i64> for ParameterValue {
    fn from(n: i64) -> Self {
        ParameterValue::Literal(json!(n))
    }
}

impl From<bool> for ParameterValue {
    fn from(b: bool) -> Self {
        ParameterValue::Literal(JsonValue::Bool(b))
    }
}

fn evaluate(expr: &str, item: &JsonValue, index: usize) -> Result<JsonValue, NodeError> {
    if let Some(reference) = single_placeholder(expr.trim()) {
        return lookup(reference, item, index);
    }

    let mut out = String::new();
    let mut rest = expr;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| NodeError::Expression(format!("unterminated placeholder in '{}'", expr)))?;
        match lookup(after[..end].trim(), item, index)? {
            JsonValue::String(s) => out.push_str(&s),
            other => out.push_str(&other.to_string()),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(JsonValue::String(out))
}

fn single_placeholder(s: &str) -> Option<&str> {
    let inner = s.strip_prefix("{{")?.strip_suffix("}}")?;
    if inner.contains("{{") || inner.contains("}}") {
        return None;
    }
    Some(inner.trim())
}

fn lookup(reference: &str, item: &JsonValue, index: usize) -> Result<JsonValue, NodeError> {
    if reference == "$index" {
        return Ok(json!(index));
    }

    let path = if reference == "$json" {
        ""
    } else if let Some(path) = reference.strip_prefix("$json.") {
        path
    } else {
        return Err(NodeError::Expression(format!("unsupported reference '{}'", reference)));
    };

    let mut current = item;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        current = match current {
            JsonValue::Object(map) => map.get(segment),
            JsonValue::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
        .ok_or_else(|| NodeError::Expression(format!("'{}' not found in item {}", reference, index)))?;
    }
    Ok(current.clone())
}
