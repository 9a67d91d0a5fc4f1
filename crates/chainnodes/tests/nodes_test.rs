// crates/chainnodes/tests/nodes_test.rs

use chaincore::{Collaborators, ExecutionItem, FlowError, NodeInstance, ParameterValue, WorkflowDefinition};
use chainruntime::{ExecutionResult, NodeRegistry, RunState, WorkflowExecutor};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn executor() -> WorkflowExecutor {
    let mut registry = NodeRegistry::new();
    chainnodes::register_all(&mut registry);
    WorkflowExecutor::new(Arc::new(registry), Arc::new(Collaborators::new()))
}

async fn run_single(node: NodeInstance, items: Vec<JsonValue>) -> ExecutionResult {
    let mut wf = WorkflowDefinition::new("single");
    wf.add_node(node);
    executor()
        .execute_with_input(&wf, items.into_iter().map(ExecutionItem::new).collect())
        .await
        .unwrap()
}

#[test]
fn registers_every_builtin() {
    let mut registry = NodeRegistry::new();
    chainnodes::register_all(&mut registry);

    assert_eq!(
        registry.list_node_types(),
        vec!["debug.log", "http.request", "math.scale", "time.delay", "transform.set", "x402.request"]
    );
    let description = registry.describe("x402.request").unwrap();
    assert_eq!(description.parameter("network").unwrap().default, Some(json!("solana-devnet")));
    assert_eq!(description.parameter("maxAmount").unwrap().display_name, "Max amount");
    assert_eq!(description.parameter("asset").unwrap().display_name, "asset");
}

#[tokio::test]
async fn fetch_lift_and_scale() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/price"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": 5 })))
        .expect(1)
        .mount(&server)
        .await;

    let mut wf = WorkflowDefinition::new("fetch-scale");
    wf.add_node(NodeInstance::new("fetch", "http.request").with_parameter("url", format!("{}/price", server.uri())));
    wf.add_node(
        NodeInstance::new("lift", "transform.set")
            .with_parameter("values", ParameterValue::Literal(json!({ "value": "={{ $json.body.value }}" })))
            .with_parameter("keepOnlySet", true),
    );
    wf.add_node(NodeInstance::new("transform", "math.scale").with_parameter("factor", 2i64));
    wf.connect("fetch", "lift");
    wf.connect("lift", "transform");

    let result = executor().execute(&wf).await.unwrap();

    assert_eq!(result.status, RunState::Completed);
    assert_eq!(result.items("fetch")[0].json, json!({ "status": 200, "body": { "value": 5 } }));
    assert_eq!(result.items("transform")[0].json, json!({ "value": 10.0 }));
}

#[tokio::test]
async fn http_posts_json_body_with_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/swap"))
        .and(header("x-api-key", "secret"))
        .and(body_json(json!({ "inputMint": "SOL", "amount": 3 })))
        .respond_with(ResponseTemplate::new(200).set_body_string("queued"))
        .expect(1)
        .mount(&server)
        .await;

    let node = NodeInstance::new("swap", "http.request")
        .with_parameter("url", format!("{}/swap", server.uri()))
        .with_parameter("method", "POST")
        .with_parameter("headers", ParameterValue::Literal(json!({ "x-api-key": "secret" })))
        .with_parameter("body", ParameterValue::Literal(json!({ "inputMint": "SOL", "amount": 3 })));
    let result = run_single(node, vec![json!({})]).await;

    assert_eq!(result.items("swap")[0].json, json!({ "status": 200, "body": "queued" }));
}

#[tokio::test]
async fn http_error_status_fails_only_that_item() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/vault/ok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "apy": 4.2 })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/vault/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such vault"))
        .mount(&server)
        .await;

    let node = NodeInstance::new("vault", "http.request")
        .with_parameter("url", format!("={}/vault/{{{{ $json.name }}}}", server.uri()));
    let result = run_single(node, vec![json!({ "name": "ok" }), json!({ "name": "missing" })]).await;
    let items = result.items("vault");

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].json["body"], json!({ "apy": 4.2 }));
    let error = items[1].error.as_ref().unwrap();
    assert_eq!(error.kind, "http");
    assert!(error.message.contains("no such vault"));
    assert_eq!(error.parameters["url"], json!(format!("{}/vault/missing", server.uri())));
}

#[tokio::test]
async fn scale_rejects_non_numeric_field() {
    let node = NodeInstance::new("s", "math.scale")
        .with_parameter("factor", 10i64)
        .with_parameter("field", "amount");
    let result = run_single(node, vec![json!({ "amount": 1.5 }), json!({ "amount": "lots" })]).await;
    let items = result.items("s");

    assert_eq!(items[0].json, json!({ "amount": 15.0 }));
    assert!(items[1].error.as_ref().unwrap().message.contains("not a number"));
}

#[tokio::test]
async fn scale_with_literal_string_factor_fails_construction() {
    let mut wf = WorkflowDefinition::new("bad-factor");
    wf.add_node(NodeInstance::new("s", "math.scale").with_parameter("factor", "two"));

    assert!(matches!(
        executor().execute(&wf).await,
        Err(FlowError::NodeConstructionFailed { node, .. }) if node == "s"
    ));
}

#[tokio::test]
async fn set_merges_and_evaluates_values() {
    let node = NodeInstance::new("set", "transform.set").with_parameter(
        "values",
        ParameterValue::Literal(json!({ "label": "={{ $json.symbol }}-{{ $index }}", "network": "solana-devnet" })),
    );
    let result = run_single(node, vec![json!({ "symbol": "JUP" })]).await;

    assert_eq!(
        result.items("set")[0].json,
        json!({ "symbol": "JUP", "label": "JUP-0", "network": "solana-devnet" })
    );
}

#[tokio::test]
async fn debug_passes_items_through() {
    let node = NodeInstance::new("log", "debug.log");
    let result = run_single(node, vec![json!({ "a": 1 }), json!({ "b": 2 })]).await;
    let items: Vec<&JsonValue> = result.items("log").iter().map(|i| &i.json).collect();

    assert_eq!(items, vec![&json!({ "a": 1 }), &json!({ "b": 2 })]);
}

#[tokio::test]
async fn delay_is_cancellable() {
    let mut wf = WorkflowDefinition::new("wait");
    wf.add_node(NodeInstance::new("wait", "time.delay").with_parameter("delayMs", 60_000i64));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let err = executor().execute_with_cancel(&wf, None, cancel).await.unwrap_err();

    assert!(matches!(err, FlowError::Cancelled));
    assert!(started.elapsed() < std::time::Duration::from_secs(5));
}

#[tokio::test]
async fn negative_delay_fails_construction() {
    let mut wf = WorkflowDefinition::new("bad-delay");
    wf.add_node(NodeInstance::new("wait", "time.delay").with_parameter("delayMs", -5i64));

    assert!(matches!(
        executor().execute(&wf).await,
        Err(FlowError::NodeConstructionFailed { .. })
    ));
}
