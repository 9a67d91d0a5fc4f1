//! Standard node library
//!
//! Built-in nodes for common operations, including the paid-resource node
//! that settles HTTP 402 challenges through an injected wallet.

mod debug;
mod http;
mod time;
mod transform;
pub mod x402;

pub use debug::{DebugNode, DebugNodeFactory};
pub use http::{HttpRequestNode, HttpRequestNodeFactory};
pub use time::{DelayNode, DelayNodeFactory};
pub use transform::{ScaleNode, ScaleNodeFactory, SetNode, SetNodeFactory};
pub use x402::{PaidRequestNode, PaidRequestNodeFactory, PaymentProof, PaymentRequirements, PaymentSigner};

use chainruntime::NodeRegistry;

/// Register all standard nodes with a registry
pub fn register_all(registry: &mut NodeRegistry) {
    registry.register("debug.log", DebugNodeFactory);
    registry.register("http.request", HttpRequestNodeFactory);
    registry.register("math.scale", ScaleNodeFactory);
    registry.register("time.delay", DelayNodeFactory);
    registry.register("transform.set", SetNodeFactory);
    registry.register("x402.request", PaidRequestNodeFactory);
}
