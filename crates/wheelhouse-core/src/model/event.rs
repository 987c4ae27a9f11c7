// ── Change events ──

use std::sync::Arc;

use super::{EventType, ResourceType, Scope};

/// A fine-grained change notification produced by the transport layer.
///
/// Immutable after creation; the payload travels as raw JSON through
/// the type-erased registry and is deserialized by each interested
/// collection store. For `Deleted` events the server may send only the
/// resource id.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub resource_type: ResourceType,
    pub event_type: EventType,
    pub resource: Arc<serde_json::Value>,
    pub scope: Scope,
}

impl ChangeEvent {
    /// The id of the affected resource, when the payload carries one.
    pub fn resource_id(&self) -> Option<&str> {
        self.resource.get("id").and_then(serde_json::Value::as_str)
    }
}
