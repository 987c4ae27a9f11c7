// ── Listener registry ──
//
// Process-wide fan-out table mapping resource type to the set of
// interested callbacks. Pure in-memory, no I/O. Dispatch always runs
// against a snapshot of the current set, so a callback that
// unsubscribes (or subscribes) mid-pass never affects the pass in
// flight.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use strum::IntoEnumIterator;

use crate::model::{ChangeEvent, ResourceType};

type EventCallback = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;
type FailureCallback = Arc<dyn Fn(&str) + Send + Sync>;

type ListenerId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListenerKind {
    Event,
    Failure,
}

/// Fan-out table for change events and session-failure notices.
///
/// Callbacks run synchronously on the dispatching task; a panicking
/// callback is isolated and logged without stopping the rest of the
/// pass. Events for a type with no listeners are dropped silently.
pub struct ListenerRegistry {
    event_listeners: DashMap<ResourceType, Vec<(ListenerId, EventCallback)>>,
    failure_listeners: DashMap<ResourceType, Vec<(ListenerId, FailureCallback)>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            event_listeners: DashMap::new(),
            failure_listeners: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a callback for one resource type. The returned guard
    /// removes the entry when dropped -- hold it for as long as the
    /// consumer wants events.
    pub fn subscribe(
        self: &Arc<Self>,
        resource_type: ResourceType,
        callback: impl Fn(&ChangeEvent) + Send + Sync + 'static,
    ) -> ListenerGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.event_listeners
            .entry(resource_type)
            .or_default()
            .push((id, Arc::new(callback)));

        ListenerGuard {
            registry: Arc::downgrade(self),
            resource_type,
            id,
            kind: ListenerKind::Event,
        }
    }

    /// Register a callback invoked when a session covering
    /// `resource_type` terminates with a transport failure.
    pub fn subscribe_failures(
        self: &Arc<Self>,
        resource_type: ResourceType,
        callback: impl Fn(&str) + Send + Sync + 'static,
    ) -> ListenerGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.failure_listeners
            .entry(resource_type)
            .or_default()
            .push((id, Arc::new(callback)));

        ListenerGuard {
            registry: Arc::downgrade(self),
            resource_type,
            id,
            kind: ListenerKind::Failure,
        }
    }

    /// Deliver an event to every listener registered for its type.
    pub fn dispatch(&self, event: &ChangeEvent) {
        let snapshot: Vec<EventCallback> = {
            let Some(entry) = self.event_listeners.get(&event.resource_type) else {
                tracing::trace!(resource_type = %event.resource_type, "event has no listeners");
                return;
            };
            entry.iter().map(|(_, cb)| Arc::clone(cb)).collect()
        };

        for callback in snapshot {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                tracing::warn!(
                    resource_type = %event.resource_type,
                    "listener panicked during dispatch; continuing with remaining listeners"
                );
            }
        }
    }

    /// Report a session transport failure to the stores covering the
    /// session's filter. An empty filter means the session covered every
    /// type it was authorized for, so all failure listeners are told.
    pub fn dispatch_failure(&self, filter: &[ResourceType], message: &str) {
        let types: Vec<ResourceType> = if filter.is_empty() {
            ResourceType::iter().collect()
        } else {
            filter.to_vec()
        };

        for resource_type in types {
            let snapshot: Vec<FailureCallback> = {
                let Some(entry) = self.failure_listeners.get(&resource_type) else {
                    continue;
                };
                entry.iter().map(|(_, cb)| Arc::clone(cb)).collect()
            };

            for callback in snapshot {
                if catch_unwind(AssertUnwindSafe(|| callback(message))).is_err() {
                    tracing::warn!(
                        %resource_type,
                        "failure listener panicked; continuing with remaining listeners"
                    );
                }
            }
        }
    }

    /// Number of event listeners currently registered for a type.
    pub fn listener_count(&self, resource_type: ResourceType) -> usize {
        self.event_listeners
            .get(&resource_type)
            .map_or(0, |entry| entry.len())
    }

    fn unsubscribe(&self, kind: ListenerKind, resource_type: ResourceType, id: ListenerId) {
        match kind {
            ListenerKind::Event => {
                if let Some(mut entry) = self.event_listeners.get_mut(&resource_type) {
                    entry.retain(|(listener_id, _)| *listener_id != id);
                }
            }
            ListenerKind::Failure => {
                if let Some(mut entry) = self.failure_listeners.get_mut(&resource_type) {
                    entry.retain(|(listener_id, _)| *listener_id != id);
                }
            }
        }
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a registered listener; unregisters on drop.
///
/// A consuming view that tears down without dropping its guard would
/// leak its registry entry -- tying unregistration to `Drop` makes that
/// class of leak impossible.
#[must_use = "dropping the guard immediately unsubscribes the listener"]
pub struct ListenerGuard {
    registry: Weak<ListenerRegistry>,
    resource_type: ResourceType,
    id: ListenerId,
    kind: ListenerKind,
}

impl ListenerGuard {
    /// Explicitly unsubscribe (equivalent to dropping the guard).
    pub fn unsubscribe(self) {}
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(self.kind, self.resource_type, self.id);
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
