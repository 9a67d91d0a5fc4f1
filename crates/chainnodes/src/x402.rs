//! Payment-gated HTTP resources (HTTP 402 challenge/response).
//!
//! The node issues the request; on `402 Payment Required` it reads the
//! machine-readable requirements from the body, checks them against its own
//! configuration, asks the injected [`PaymentSigner`] for a proof and
//! re-issues the request with the proof in the `X-PAYMENT` header. A second
//! 402 is final.

use crate::http::{build_request, header_str, read_body};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use chaincore::{
    ExecutionContext, ItemOutput, Node, NodeDescription, NodeError, ParameterKind, ParameterSpec, ParameterValue,
};
use chainruntime::NodeFactory;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Arc;

pub const PAYMENT_HEADER: &str = "X-PAYMENT";
pub const PAYMENT_RESPONSE_HEADER: &str = "X-PAYMENT-RESPONSE";

/// Body of a 402 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    #[serde(default = "default_version")]
    pub x402_version: u32,
    #[serde(default)]
    pub accepts: Vec<PaymentRequirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn default_version() -> u32 {
    1
}

/// One acceptable way to pay for a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub scheme: String,
    pub network: String,
    pub asset: String,
    /// Amount in the asset's base units.
    #[serde(default)]
    pub max_amount_required: String,
    #[serde(default)]
    pub pay_to: String,
    #[serde(default)]
    pub resource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<JsonValue>,
}

/// Signed payment attached to the retried request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentProof {
    pub x402_version: u32,
    pub scheme: String,
    pub network: String,
    pub payload: JsonValue,
}

impl PaymentProof {
    /// Header form: base64 of the JSON encoding.
    pub fn to_header(&self) -> Result<String, NodeError> {
        let raw = serde_json::to_vec(self).map_err(|e| NodeError::ExecutionFailed(e.to_string()))?;
        Ok(BASE64_STANDARD.encode(raw))
    }

    pub fn from_header(value: &str) -> Result<Self, NodeError> {
        let raw = BASE64_STANDARD
            .decode(value)
            .map_err(|e| NodeError::ExecutionFailed(format!("invalid payment header: {}", e)))?;
        serde_json::from_slice(&raw).map_err(|e| NodeError::ExecutionFailed(format!("invalid payment header: {}", e)))
    }
}

/// Wallet capability that turns requirements into a payment proof.
///
/// Registered on the collaborators as `Arc<dyn PaymentSigner>`.
#[async_trait]
pub trait PaymentSigner: Send + Sync {
    async fn create_payment(&self, requirements: &PaymentRequirements) -> Result<PaymentProof, NodeError>;
}

/// What the node is willing to pay with.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectedPayment {
    pub scheme: String,
    pub network: String,
    pub asset: String,
    pub max_amount: Option<u128>,
}

impl ExpectedPayment {
    /// Pick the first offer matching scheme, network and asset. With no
    /// match the first offer's first differing field is reported.
    pub fn select<'a>(&self, offers: &'a [PaymentRequirements]) -> Result<&'a PaymentRequirements, NodeError> {
        let first = offers
            .first()
            .ok_or_else(|| NodeError::ExecutionFailed("402 response carried no payment requirements".into()))?;

        let offer = offers
            .iter()
            .find(|o| o.scheme == self.scheme && o.network == self.network && o.asset == self.asset)
            .ok_or_else(|| self.mismatch(first))?;

        if let Some(max) = self.max_amount {
            let required: u128 = offer.max_amount_required.parse().map_err(|_| NodeError::PaymentRequirementMismatch {
                field: "maxAmountRequired".into(),
                expected: format!("<= {}", max),
                actual: offer.max_amount_required.clone(),
            })?;
            if required > max {
                return Err(NodeError::PaymentRequirementMismatch {
                    field: "maxAmountRequired".into(),
                    expected: format!("<= {}", max),
                    actual: required.to_string(),
                });
            }
        }
        Ok(offer)
    }

    fn mismatch(&self, offer: &PaymentRequirements) -> NodeError {
        let (field, expected, actual) = if offer.scheme != self.scheme {
            ("scheme", &self.scheme, &offer.scheme)
        } else if offer.network != self.network {
            ("network", &self.network, &offer.network)
        } else {
            ("asset", &self.asset, &offer.asset)
        };
        NodeError::PaymentRequirementMismatch {
            field: field.to_string(),
            expected: expected.clone(),
            actual: actual.clone(),
        }
    }
}

/// Calls a payment-gated HTTP resource
pub struct PaidRequestNode {
    description: NodeDescription,
}

impl PaidRequestNode {
    pub fn new() -> Self {
        Self {
            description: NodeDescription::new("x402.request", "Paid API Request")
                .with_description("Call an HTTP resource that requires payment")
                .with_category("payments")
                .with_parameter(ParameterSpec::new("url", ParameterKind::String).required())
                .with_parameter(ParameterSpec::new("method", ParameterKind::String).with_default(json!("GET")))
                .with_parameter(ParameterSpec::new("body", ParameterKind::Any))
                .with_parameter(ParameterSpec::new("scheme", ParameterKind::String).with_default(json!("exact")))
                .with_parameter(
                    ParameterSpec::new("network", ParameterKind::String).with_default(json!("solana-devnet")),
                )
                .with_parameter(ParameterSpec::new("asset", ParameterKind::String).with_default(json!("USDC")))
                .with_parameter(
                    ParameterSpec::new("maxAmount", ParameterKind::String)
                        .with_display_name("Max amount")
                        .with_description("Upper bound in base units, e.g. \"1000000\""),
                ),
        }
    }

    fn expected(ctx: &ExecutionContext, index: usize) -> Result<ExpectedPayment, NodeError> {
        let max_amount = match ctx.optional_parameter("maxAmount", index)? {
            Some(JsonValue::String(s)) => Some(s.parse().map_err(|_| NodeError::ParameterTypeMismatch {
                name: "maxAmount".into(),
                expected: "integer string".into(),
                actual: s.clone(),
            })?),
            _ => None,
        };
        Ok(ExpectedPayment {
            scheme: ctx.parameter_str("scheme", index)?,
            network: ctx.parameter_str("network", index)?,
            asset: ctx.parameter_str("asset", index)?,
            max_amount,
        })
    }
}

impl Default for PaidRequestNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for PaidRequestNode {
    fn description(&self) -> &NodeDescription {
        &self.description
    }

    async fn execute_item(&self, ctx: &ExecutionContext, index: usize) -> Result<ItemOutput, NodeError> {
        let url = ctx.parameter_str("url", index)?;
        let method = ctx.parameter_str("method", index)?;
        let body = ctx.optional_parameter("body", index)?;
        let expected = Self::expected(ctx, index)?;

        let first = build_request(ctx.http(), &method, &url, body.as_ref())?.send().await?;
        if first.status() != StatusCode::PAYMENT_REQUIRED {
            return finish(first, None).await;
        }

        let challenge: PaymentRequired = first
            .json()
            .await
            .map_err(|e| NodeError::ExecutionFailed(format!("unreadable payment requirements: {}", e)))?;
        let requirements = expected.select(&challenge.accepts)?.clone();

        let signer = ctx.capability::<Arc<dyn PaymentSigner>>()?;
        let proof = signer.create_payment(&requirements).await?;
        tracing::info!(
            node = ctx.node_id(),
            network = %requirements.network,
            amount = %requirements.max_amount_required,
            "paying for {}",
            url
        );

        let second = build_request(ctx.http(), &method, &url, body.as_ref())?
            .header(PAYMENT_HEADER, proof.to_header()?)
            .send()
            .await?;

        if second.status() == StatusCode::PAYMENT_REQUIRED {
            let reason = second
                .json::<PaymentRequired>()
                .await
                .ok()
                .and_then(|r| r.error)
                .unwrap_or_else(|| "payment was not accepted".to_string());
            return Err(NodeError::PaymentRejected(reason));
        }

        finish(second, Some(requirements)).await
    }
}

async fn finish(response: reqwest::Response, paid: Option<PaymentRequirements>) -> Result<ItemOutput, NodeError> {
    let status = response.status();
    let settlement = header_str(response.headers(), PAYMENT_RESPONSE_HEADER)
        .and_then(|v| BASE64_STANDARD.decode(v).ok())
        .and_then(|raw| serde_json::from_slice::<JsonValue>(&raw).ok());
    let data = read_body(response).await?;

    if !status.is_success() {
        return Err(NodeError::Http(format!("resource returned {}: {}", status, data)));
    }

    Ok(ItemOutput::single(json!({
        "success": true,
        "status": status.as_u16(),
        "data": data,
        "paymentResponse": settlement,
        "payment": paid,
    })))
}

pub struct PaidRequestNodeFactory;

impl NodeFactory for PaidRequestNodeFactory {
    fn create(&self, _parameters: &HashMap<String, ParameterValue>) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(PaidRequestNode::new()))
    }
}
