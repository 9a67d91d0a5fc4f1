use async_trait::async_trait;
use chaincore::{
    ExecutionContext, ItemOutput, Node, NodeDescription, NodeError, ParameterKind, ParameterSpec, ParameterValue,
};
use chainruntime::NodeFactory;
use reqwest::header::HeaderMap;
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;

/// HTTP request node
pub struct HttpRequestNode {
    description: NodeDescription,
}

impl HttpRequestNode {
    pub fn new() -> Self {
        Self {
            description: NodeDescription::new("http.request", "HTTP Request")
                .with_description("Make HTTP requests")
                .with_category("http")
                .with_parameter(ParameterSpec::new("url", ParameterKind::String).required())
                .with_parameter(ParameterSpec::new("method", ParameterKind::String).with_default(json!("GET")))
                .with_parameter(ParameterSpec::new("body", ParameterKind::Any))
                .with_parameter(ParameterSpec::new("headers", ParameterKind::Object))
                .with_parameter(
                    ParameterSpec::new("failOnStatus", ParameterKind::Boolean)
                        .with_default(json!(true))
                        .with_description("Fail the item on 4xx/5xx responses"),
                ),
        }
    }
}

impl Default for HttpRequestNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for HttpRequestNode {
    fn description(&self) -> &NodeDescription {
        &self.description
    }

    async fn execute_item(&self, ctx: &ExecutionContext, index: usize) -> Result<ItemOutput, NodeError> {
        let url = ctx.parameter_str("url", index)?;
        let method = ctx.parameter_str("method", index)?;
        let body = ctx.optional_parameter("body", index)?;
        let headers = ctx.optional_parameter("headers", index)?;

        tracing::debug!(node = ctx.node_id(), "{} {}", method, url);

        let mut request = build_request(ctx.http(), &method, &url, body.as_ref())?;
        if let Some(JsonValue::Object(headers)) = headers {
            for (key, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(key, value);
                }
            }
        }

        let response = request.send().await?;
        let status = response.status();
        let body = read_body(response).await?;

        if status.as_u16() >= 400 && ctx.parameter_bool("failOnStatus", index)? {
            return Err(NodeError::Http(format!("{} returned {}: {}", url, status, body)));
        }

        Ok(ItemOutput::single(json!({
            "status": status.as_u16(),
            "body": body,
        })))
    }
}

/// Start a request for `method` with an optional JSON or text body.
pub(crate) fn build_request(
    client: &reqwest::Client,
    method: &str,
    url: &str,
    body: Option<&JsonValue>,
) -> Result<reqwest::RequestBuilder, NodeError> {
    let request = match method.to_uppercase().as_str() {
        "GET" => client.get(url),
        "POST" => client.post(url),
        "PUT" => client.put(url),
        "PATCH" => client.patch(url),
        "DELETE" => client.delete(url),
        _ => return Err(NodeError::ExecutionFailed(format!("Unsupported method: {}", method))),
    };

    Ok(match body {
        Some(JsonValue::String(text)) => request.body(text.clone()),
        Some(JsonValue::Null) | None => request,
        Some(json) => request.json(json),
    })
}

/// Response body as JSON when it parses, as text otherwise.
pub(crate) async fn read_body(response: reqwest::Response) -> Result<JsonValue, NodeError> {
    let text = response.text().await?;
    Ok(serde_json::from_str(&text).unwrap_or(JsonValue::String(text)))
}

pub(crate) fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

pub struct HttpRequestNodeFactory;

impl NodeFactory for HttpRequestNodeFactory {
    fn create(&self, _parameters: &HashMap<String, ParameterValue>) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(HttpRequestNode::new()))
    }
}
