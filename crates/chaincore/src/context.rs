use crate::events::{ExecutionId, NoopNotifier, NotificationSink};
use crate::{json_type_name, ExecutionItem, NodeDescription, NodeError, NodeId, ParameterValue, PortItems};
use serde_json::{Map, Value as JsonValue};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Dependencies injected into every node invocation.
///
/// Built once by the owner of the runtime and shared read-only with nodes.
/// Nodes look up what they need here instead of constructing clients.
pub struct Collaborators {
    http: reqwest::Client,
    notifier: Arc<dyn NotificationSink>,
    capabilities: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Collaborators {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            notifier: Arc::new(NoopNotifier),
            capabilities: HashMap::new(),
        }
    }

    pub fn with_http(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Register a capability, keyed by its type. Trait objects are registered
    /// wrapped, e.g. `Arc<dyn PaymentSigner>`.
    pub fn with<T: Any + Send + Sync>(mut self, capability: T) -> Self {
        self.insert(capability);
        self
    }

    pub fn insert<T: Any + Send + Sync>(&mut self, capability: T) {
        self.capabilities.insert(TypeId::of::<T>(), Arc::new(capability));
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.capabilities
            .get(&TypeId::of::<T>())
            .and_then(|c| c.downcast_ref::<T>())
    }

    pub fn require<T: Any + Send + Sync>(&self) -> Result<&T, NodeError> {
        self.get::<T>()
            .ok_or_else(|| NodeError::MissingCollaborator(std::any::type_name::<T>().to_string()))
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn notifier(&self) -> &Arc<dyn NotificationSink> {
        &self.notifier
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-invocation handle passed to a node.
///
/// Built by the executor once per node invocation, not per item.
pub struct ExecutionContext {
    execution_id: ExecutionId,
    node_id: NodeId,
    description: NodeDescription,
    parameters: HashMap<String, ParameterValue>,
    inputs: Vec<PortItems>,
    collaborators: Arc<Collaborators>,
    cancellation: CancellationToken,
}

impl ExecutionContext {
    pub fn new(
        execution_id: ExecutionId,
        node_id: impl Into<NodeId>,
        description: NodeDescription,
        parameters: HashMap<String, ParameterValue>,
        inputs: Vec<PortItems>,
        collaborators: Arc<Collaborators>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            execution_id,
            node_id: node_id.into(),
            description,
            parameters,
            inputs,
            collaborators,
            cancellation,
        }
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn node_type(&self) -> &str {
        &self.description.name
    }

    /// Merged items on the default input port.
    pub fn input_items(&self) -> &[ExecutionItem] {
        self.input_items_on(0)
    }

    pub fn input_items_on(&self, port: usize) -> &[ExecutionItem] {
        self.inputs.get(port).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn item(&self, index: usize) -> Option<&ExecutionItem> {
        self.input_items().get(index)
    }

    pub fn item_count(&self) -> usize {
        self.input_items().len()
    }

    /// Resolve a parameter for the item at `index`.
    ///
    /// Falls back to the declared default; fails when neither exists.
    pub fn parameter(&self, name: &str, index: usize) -> Result<JsonValue, NodeError> {
        self.resolve(name, index, None)?
            .ok_or_else(|| NodeError::MissingRequiredParameter(name.to_string()))
    }

    /// Like [`parameter`](Self::parameter) with a caller-supplied default.
    pub fn parameter_or(&self, name: &str, index: usize, default: JsonValue) -> Result<JsonValue, NodeError> {
        self.resolve(name, index, Some(default))?
            .ok_or_else(|| NodeError::MissingRequiredParameter(name.to_string()))
    }

    /// `None` when the parameter is absent or null and has no default.
    pub fn optional_parameter(&self, name: &str, index: usize) -> Result<Option<JsonValue>, NodeError> {
        if self.is_required(name) {
            return self.parameter(name, index).map(Some);
        }
        Ok(self.resolve(name, index, None)?.filter(|v| !v.is_null()))
    }

    pub fn parameter_str(&self, name: &str, index: usize) -> Result<String, NodeError> {
        let value = self.parameter(name, index)?;
        match value {
            JsonValue::String(s) => Ok(s),
            other => Err(mismatch(name, "string", &other)),
        }
    }

    pub fn parameter_f64(&self, name: &str, index: usize) -> Result<f64, NodeError> {
        let value = self.parameter(name, index)?;
        value.as_f64().ok_or_else(|| mismatch(name, "number", &value))
    }

    pub fn parameter_bool(&self, name: &str, index: usize) -> Result<bool, NodeError> {
        let value = self.parameter(name, index)?;
        value.as_bool().ok_or_else(|| mismatch(name, "boolean", &value))
    }

    /// Best-effort view of every parameter for one item. Values that fail to
    /// resolve are reported in their raw form.
    pub fn resolved_parameters(&self, index: usize) -> Map<String, JsonValue> {
        let mut names: Vec<&str> = self.description.parameters.iter().map(|p| p.name.as_str()).collect();
        let mut extra: Vec<&str> = self
            .parameters
            .keys()
            .map(String::as_str)
            .filter(|n| !names.contains(n))
            .collect();
        extra.sort_unstable();
        names.extend(extra);

        let mut out = Map::new();
        for name in names {
            match self.resolve(name, index, None) {
                Ok(Some(value)) => {
                    out.insert(name.to_string(), value);
                }
                Ok(None) => {}
                Err(_) => {
                    if let Some(raw) = self.parameters.get(name) {
                        out.insert(name.to_string(), raw.clone().into());
                    }
                }
            }
        }
        out
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    pub fn http(&self) -> &reqwest::Client {
        self.collaborators.http()
    }

    pub fn notifier(&self) -> &Arc<dyn NotificationSink> {
        self.collaborators.notifier()
    }

    /// Look up an injected capability by type.
    pub fn capability<T: Any + Send + Sync>(&self) -> Result<&T, NodeError> {
        self.collaborators.require::<T>()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    fn is_required(&self, name: &str) -> bool {
        self.description.parameter(name).is_some_and(|p| p.required)
    }

    fn resolve(&self, name: &str, index: usize, fallback: Option<JsonValue>) -> Result<Option<JsonValue>, NodeError> {
        let spec = self.description.parameter(name);
        let value = match self.parameters.get(name) {
            Some(raw) => {
                let item = self.item(index).map(|i| &i.json).unwrap_or(&JsonValue::Null);
                Some(raw.resolve(item, index)?)
            }
            None => spec.and_then(|s| s.default.clone()).or(fallback),
        };

        if let (Some(spec), Some(v)) = (spec, value.as_ref()) {
            let optional_null = v.is_null() && !spec.required;
            if !optional_null && !spec.kind.accepts(v) {
                return Err(mismatch(name, spec.kind.as_str(), v));
            }
        }
        Ok(value)
    }
}

fn mismatch(name: &str, expected: &str, actual: &JsonValue) -> NodeError {
    NodeError::ParameterTypeMismatch {
        name: name.to_string(),
        expected: expected.to_string(),
        actual: json_type_name(actual).to_string(),
    }
}
