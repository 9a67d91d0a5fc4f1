mod base;
mod sink;

pub use base::{EventBus, ExecutionEvent, ExecutionId};
pub use sink::{NoopNotifier, NotificationSink};
