// ── Reconciled resource collection ──
//
// One store per resource type per consuming view. Holds a page of items
// plus a total count, merges live change events into the loaded page,
// and replaces the whole snapshot on an explicit paged fetch. Every
// mutation publishes a fresh `Arc<CollectionState<T>>` through a watch
// channel, so consumers can use pointer or value equality for change
// detection.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::model::{ChangeEvent, EventType, Resource, Scope};
use crate::registry::{ListenerGuard, ListenerRegistry};
use crate::transport::PageSource;

/// Observable state of one resource collection.
///
/// `total_count` is authoritative only right after a paged fetch; live
/// created/deleted events keep it approximately correct in between.
/// `items` never contains two entries with the same id.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionState<T> {
    pub items: Vec<Arc<T>>,
    pub total_count: u64,
    pub loading: bool,
    pub error: Option<String>,
}

impl<T> CollectionState<T> {
    fn new() -> Self {
        Self {
            items: Vec::new(),
            total_count: 0,
            loading: false,
            error: None,
        }
    }
}

impl<T> Default for CollectionState<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A reconciled, reactive collection of one resource type.
///
/// Dropping the store unregisters its listeners -- a torn-down view
/// cannot leak registry entries.
pub struct CollectionStore<T: Resource> {
    state: watch::Sender<Arc<CollectionState<T>>>,
    pages: Arc<dyn PageSource>,
    _event_listener: ListenerGuard,
    _failure_listener: ListenerGuard,
}

impl<T: Resource> CollectionStore<T> {
    /// Create a store and register it with the registry.
    ///
    /// Registration happens here, before any stream session can be
    /// started through the same facade, so no relevant event can arrive
    /// unobserved.
    pub(crate) fn attach(registry: &Arc<ListenerRegistry>, pages: Arc<dyn PageSource>) -> Self {
        let (state, _) = watch::channel(Arc::new(CollectionState::new()));

        let event_state = state.clone();
        let event_listener = registry.subscribe(T::RESOURCE_TYPE, move |event| {
            apply_event::<T>(&event_state, event);
        });

        let failure_state = state.clone();
        let failure_listener = registry.subscribe_failures(T::RESOURCE_TYPE, move |message| {
            let message = message.to_owned();
            update(&failure_state, move |next| {
                next.error = Some(message);
            });
        });

        Self {
            state,
            pages,
            _event_listener: event_listener,
            _failure_listener: failure_listener,
        }
    }

    // ── Reactive getters ─────────────────────────────────────────────

    /// Current state snapshot (cheap `Arc` clone).
    pub fn snapshot(&self) -> Arc<CollectionState<T>> {
        self.state.borrow().clone()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<Arc<CollectionState<T>>> {
        self.state.subscribe()
    }

    pub fn items(&self) -> Vec<Arc<T>> {
        self.state.borrow().items.clone()
    }

    pub fn total_count(&self) -> u64 {
        self.state.borrow().total_count
    }

    pub fn loading(&self) -> bool {
        self.state.borrow().loading
    }

    pub fn error(&self) -> Option<String> {
        self.state.borrow().error.clone()
    }

    // ── Paged fetch ──────────────────────────────────────────────────

    /// Fetch one page and replace the snapshot wholesale.
    ///
    /// This is the authoritative source for "what page N looks like";
    /// it implicitly discards live-event drift accumulated outside the
    /// fetched window (live events patch only the loaded page, never
    /// unseen pages).
    pub async fn load_page(
        &self,
        page_size: u32,
        page_index: u32,
        scope: Scope,
    ) -> Result<(), CoreError> {
        update(&self.state, |next| {
            next.loading = true;
        });

        let fetched = self
            .pages
            .load_page(T::RESOURCE_TYPE, scope, page_size, page_index)
            .await;

        match fetched {
            Ok(page) => {
                let mut items: Vec<Arc<T>> = Vec::with_capacity(page.items.len());
                for value in page.items {
                    match serde_json::from_value::<T>(value) {
                        Ok(item) => {
                            if items.iter().any(|existing| existing.id() == item.id()) {
                                warn!(
                                    resource_type = %T::RESOURCE_TYPE,
                                    id = item.id(),
                                    "server page contained a duplicate id; keeping first"
                                );
                            } else {
                                items.push(Arc::new(item));
                            }
                        }
                        Err(e) => {
                            warn!(
                                resource_type = %T::RESOURCE_TYPE,
                                error = %e,
                                "skipping undecodable item in fetched page"
                            );
                        }
                    }
                }

                debug!(
                    resource_type = %T::RESOURCE_TYPE,
                    page_index,
                    count = items.len(),
                    total = page.total_count,
                    "page loaded"
                );

                update(&self.state, move |next| {
                    next.items = items;
                    next.total_count = page.total_count;
                    next.loading = false;
                    next.error = None;
                });
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                warn!(resource_type = %T::RESOURCE_TYPE, error = %message, "page fetch failed");
                update(&self.state, move |next| {
                    next.loading = false;
                    next.error = Some(message);
                });
                Err(e)
            }
        }
    }

    // ── Optimistic update ────────────────────────────────────────────

    /// Patch an item in place before server confirmation arrives.
    ///
    /// Returns `false` if no item with that id is loaded. A later
    /// server-confirmed `updated`/`deleted` event for the same id is
    /// authoritative and overwrites the patch.
    pub fn patch_optimistic(&self, id: &str, patch: impl FnOnce(&mut T)) -> bool {
        let mut found = false;
        self.state.send_if_modified(|current| {
            let Some(position) = current.items.iter().position(|item| item.id() == id) else {
                return false;
            };
            found = true;
            let mut next = (**current).clone();
            let mut item = (*next.items[position]).clone();
            patch(&mut item);
            next.items[position] = Arc::new(item);
            *current = Arc::new(next);
            true
        });
        found
    }
}

/// Rebuild the published snapshot through a mutation closure.
fn update<T: Clone>(
    state: &watch::Sender<Arc<CollectionState<T>>>,
    mutate: impl FnOnce(&mut CollectionState<T>),
) {
    state.send_modify(|current| {
        let mut next = (**current).clone();
        mutate(&mut next);
        *current = Arc::new(next);
    });
}

/// Merge one change event into the collection.
fn apply_event<T: Resource>(state: &watch::Sender<Arc<CollectionState<T>>>, event: &ChangeEvent) {
    match event.event_type {
        EventType::Created => {
            let item: T = match serde_json::from_value((*event.resource).clone()) {
                Ok(item) => item,
                Err(e) => {
                    warn!(
                        resource_type = %event.resource_type,
                        error = %e,
                        "dropping undecodable created-event payload"
                    );
                    return;
                }
            };
            state.send_if_modified(|current| {
                // Idempotent against duplicate delivery.
                if current.items.iter().any(|existing| existing.id() == item.id()) {
                    return false;
                }
                let mut next = (**current).clone();
                next.items.insert(0, Arc::new(item));
                next.total_count += 1;
                *current = Arc::new(next);
                true
            });
        }
        EventType::Updated => {
            let item: T = match serde_json::from_value((*event.resource).clone()) {
                Ok(item) => item,
                Err(e) => {
                    warn!(
                        resource_type = %event.resource_type,
                        error = %e,
                        "dropping undecodable updated-event payload"
                    );
                    return;
                }
            };
            state.send_if_modified(|current| {
                // An unknown id may live on a page that is not loaded;
                // inserting it here would corrupt pagination order.
                let Some(position) = current
                    .items
                    .iter()
                    .position(|existing| existing.id() == item.id())
                else {
                    return false;
                };
                let mut next = (**current).clone();
                next.items[position] = Arc::new(item);
                *current = Arc::new(next);
                true
            });
        }
        EventType::Deleted => {
            // Delete payloads may carry only the id.
            let Some(id) = event.resource_id().map(str::to_owned) else {
                warn!(
                    resource_type = %event.resource_type,
                    "dropping deleted event without a resource id"
                );
                return;
            };
            state.send_if_modified(|current| {
                let before = current.items.len();
                if !current.items.iter().any(|existing| existing.id() == id) {
                    return false;
                }
                let mut next = (**current).clone();
                next.items.retain(|existing| existing.id() != id);
                let removed = u64::try_from(before - next.items.len()).unwrap_or(0);
                next.total_count = next.total_count.saturating_sub(removed);
                *current = Arc::new(next);
                true
            });
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures_util::future::BoxFuture;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::{ResourceType, Router, Scope};
    use crate::transport::Page;

    // ── Fixtures ─────────────────────────────────────────────────────

    struct StaticPages {
        result: Result<Page, String>,
    }

    impl StaticPages {
        fn ok(items: Vec<serde_json::Value>, total_count: u64) -> Arc<Self> {
            Arc::new(Self {
                result: Ok(Page { items, total_count }),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                result: Err(message.to_owned()),
            })
        }
    }

    impl PageSource for StaticPages {
        fn load_page(
            &self,
            _resource_type: ResourceType,
            _scope: Scope,
            _page_size: u32,
            _page_index: u32,
        ) -> BoxFuture<'static, Result<Page, CoreError>> {
            let result = self.result.clone().map_err(|message| CoreError::Fetch {
                message,
                status: Some(500),
            });
            Box::pin(async move { result })
        }
    }

    fn router_json(id: &str, name: &str, rule: &str) -> serde_json::Value {
        serde_json::json!({ "id": id, "name": name, "rule": rule, "service": format!("{name}-svc") })
    }

    fn event(event_type: EventType, payload: serde_json::Value) -> ChangeEvent {
        ChangeEvent {
            resource_type: ResourceType::Router,
            event_type,
            resource: Arc::new(payload),
            scope: Scope::Profile("7".into()),
        }
    }

    fn store_with(
        items: Vec<serde_json::Value>,
        total: u64,
    ) -> (Arc<ListenerRegistry>, CollectionStore<Router>) {
        let registry = Arc::new(ListenerRegistry::new());
        let store = CollectionStore::<Router>::attach(&registry, StaticPages::ok(items, total));
        (registry, store)
    }

    fn ids(store: &CollectionStore<Router>) -> Vec<String> {
        store.items().iter().map(|r| r.id.clone()).collect()
    }

    async fn loaded_store() -> (Arc<ListenerRegistry>, CollectionStore<Router>) {
        let (registry, store) = store_with(
            vec![
                router_json("r-1", "web", "Host(`a.example`)"),
                router_json("r-2", "api", "Host(`b.example`)"),
                router_json("r-3", "admin", "Host(`c.example`)"),
            ],
            3,
        );
        store.load_page(10, 0, Scope::Profile("7".into())).await.unwrap();
        (registry, store)
    }

    // ── Paged fetch ──────────────────────────────────────────────────

    #[tokio::test]
    async fn load_page_replaces_snapshot_wholesale() {
        let (_registry, store) = loaded_store().await;

        assert_eq!(ids(&store), vec!["r-1", "r-2", "r-3"]);
        assert_eq!(store.total_count(), 3);
        assert!(!store.loading());
        assert!(store.error().is_none());
    }

    #[tokio::test]
    async fn load_page_failure_is_captured_into_error() {
        let registry = Arc::new(ListenerRegistry::new());
        let store =
            CollectionStore::<Router>::attach(&registry, StaticPages::failing("listing broke"));

        let result = store.load_page(10, 0, Scope::Global).await;

        assert!(result.is_err());
        assert!(!store.loading());
        assert!(store.error().unwrap().contains("listing broke"));
    }

    #[tokio::test]
    async fn load_page_clears_previous_error() {
        let (_registry, store) = loaded_store().await;

        registry_failure(&store);
        assert!(store.error().is_some());

        store.load_page(10, 0, Scope::Profile("7".into())).await.unwrap();
        assert!(store.error().is_none());
    }

    fn registry_failure(store: &CollectionStore<Router>) {
        update(&store.state, |next| {
            next.error = Some("stream died".into());
        });
    }

    // ── Reconciliation ───────────────────────────────────────────────

    #[tokio::test]
    async fn created_event_prepends_and_increments() {
        let (registry, store) = loaded_store().await;

        registry.dispatch(&event(
            EventType::Created,
            router_json("r-4", "metrics", "Host(`d.example`)"),
        ));

        assert_eq!(ids(&store), vec!["r-4", "r-1", "r-2", "r-3"]);
        assert_eq!(store.total_count(), 4);
    }

    #[tokio::test]
    async fn created_event_is_idempotent() {
        let (registry, store) = loaded_store().await;
        let payload = router_json("r-4", "metrics", "Host(`d.example`)");

        registry.dispatch(&event(EventType::Created, payload.clone()));
        let after_first = store.snapshot();

        registry.dispatch(&event(EventType::Created, payload));
        let after_second = store.snapshot();

        assert_eq!(after_first, after_second);
        assert_eq!(store.total_count(), 4);
    }

    #[tokio::test]
    async fn updated_event_replaces_in_place() {
        let (registry, store) = loaded_store().await;

        registry.dispatch(&event(
            EventType::Updated,
            router_json("r-2", "api", "Host(`renamed.example`)"),
        ));

        assert_eq!(ids(&store), vec!["r-1", "r-2", "r-3"], "position preserved");
        assert_eq!(store.items()[1].rule, "Host(`renamed.example`)");
        assert_eq!(store.total_count(), 3);
    }

    #[tokio::test]
    async fn updated_event_for_unknown_id_is_a_noop() {
        let (registry, store) = loaded_store().await;
        let before = store.snapshot();

        registry.dispatch(&event(
            EventType::Updated,
            router_json("r-99", "ghost", "Host(`x.example`)"),
        ));

        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test]
    async fn deleted_event_removes_exactly_one() {
        let (registry, store) = loaded_store().await;

        registry.dispatch(&event(EventType::Deleted, serde_json::json!({ "id": "r-1" })));

        assert_eq!(ids(&store), vec!["r-2", "r-3"]);
        assert_eq!(store.total_count(), 2);
    }

    #[tokio::test]
    async fn deleted_event_for_absent_id_is_a_noop() {
        let (registry, store) = loaded_store().await;
        let before = store.snapshot();

        registry.dispatch(&event(EventType::Deleted, serde_json::json!({ "id": "r-99" })));

        assert_eq!(store.snapshot(), before);
        assert_eq!(store.total_count(), 3, "count never decremented for a no-op");
    }

    #[tokio::test]
    async fn total_count_never_goes_below_zero() {
        let (registry, store) = store_with(vec![], 0);
        store.load_page(10, 0, Scope::Global).await.unwrap();

        registry.dispatch(&event(
            EventType::Created,
            router_json("r-1", "web", "Host(`a.example`)"),
        ));
        registry.dispatch(&event(EventType::Deleted, serde_json::json!({ "id": "r-1" })));
        registry.dispatch(&event(EventType::Deleted, serde_json::json!({ "id": "r-1" })));

        assert_eq!(store.total_count(), 0);
    }

    #[tokio::test]
    async fn count_and_list_stay_consistent_over_event_sequences() {
        let (registry, store) = loaded_store().await;

        let creates = 4_u64;
        for i in 0..creates {
            registry.dispatch(&event(
                EventType::Created,
                router_json(&format!("n-{i}"), "bulk", "Host(`n.example`)"),
            ));
        }
        registry.dispatch(&event(
            EventType::Updated,
            router_json("n-2", "bulk", "Host(`edited.example`)"),
        ));
        registry.dispatch(&event(EventType::Deleted, serde_json::json!({ "id": "r-3" })));
        registry.dispatch(&event(EventType::Deleted, serde_json::json!({ "id": "n-0" })));

        let state = store.snapshot();
        assert_eq!(state.total_count, 3 + creates - 2);
        assert_eq!(state.items.len() as u64, state.total_count);

        let mut seen = std::collections::HashSet::new();
        assert!(
            state.items.iter().all(|item| seen.insert(item.id.clone())),
            "no duplicate ids at any observable instant"
        );
    }

    #[tokio::test]
    async fn undecodable_event_payload_is_dropped() {
        let (registry, store) = loaded_store().await;
        let before = store.snapshot();

        registry.dispatch(&event(
            EventType::Created,
            serde_json::json!({ "id": 42, "nonsense": true }),
        ));
        registry.dispatch(&event(EventType::Deleted, serde_json::json!({ "gone": true })));

        assert_eq!(store.snapshot(), before);
    }

    // ── End-to-end scenario ──────────────────────────────────────────

    #[tokio::test]
    async fn router_page_tracks_live_events() {
        let (registry, store) = loaded_store().await;
        assert_eq!(store.items().len(), 3);
        assert_eq!(store.total_count(), 3);

        registry.dispatch(&event(
            EventType::Created,
            router_json("r-4", "new", "Host(`new.example`)"),
        ));
        assert_eq!(store.items().len(), 4);
        assert_eq!(store.total_count(), 4);

        registry.dispatch(&event(
            EventType::Updated,
            router_json("r-2", "api", "PathPrefix(`/v2`)"),
        ));
        let items = store.items();
        assert_eq!(items.len(), 4);
        assert_eq!(
            items.iter().find(|r| r.id == "r-2").unwrap().rule,
            "PathPrefix(`/v2`)"
        );

        registry.dispatch(&event(EventType::Deleted, serde_json::json!({ "id": "r-1" })));
        assert_eq!(store.items().len(), 3);
        assert_eq!(store.total_count(), 3);
        assert!(store.items().iter().all(|r| r.id != "r-1"));
    }

    // ── Optimistic updates ───────────────────────────────────────────

    #[tokio::test]
    async fn optimistic_patch_applies_immediately() {
        let (_registry, store) = loaded_store().await;

        let found = store.patch_optimistic("r-1", |router| {
            router.enabled = false;
        });

        assert!(found);
        assert!(!store.items()[0].enabled);
        assert!(!store.patch_optimistic("r-99", |_| {}));
    }

    #[tokio::test]
    async fn server_event_overwrites_optimistic_patch() {
        let (registry, store) = loaded_store().await;

        store.patch_optimistic("r-1", |router| {
            router.rule = "Host(`optimistic.example`)".into();
        });

        registry.dispatch(&event(
            EventType::Updated,
            router_json("r-1", "web", "Host(`confirmed.example`)"),
        ));

        assert_eq!(store.items()[0].rule, "Host(`confirmed.example`)");
    }

    // ── Teardown ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn dropping_the_store_removes_its_registry_entry() {
        let (registry, store) = loaded_store().await;
        assert_eq!(registry.listener_count(ResourceType::Router), 1);

        drop(store);
        assert_eq!(registry.listener_count(ResourceType::Router), 0);
    }

    #[tokio::test]
    async fn every_mutation_publishes_a_new_observable_value() {
        let (registry, store) = loaded_store().await;
        let mut rx = store.subscribe();
        rx.mark_unchanged();

        registry.dispatch(&event(
            EventType::Created,
            router_json("r-4", "new", "Host(`new.example`)"),
        ));
        assert!(rx.has_changed().unwrap());
        rx.mark_unchanged();

        // A no-op apply publishes nothing.
        registry.dispatch(&event(
            EventType::Updated,
            router_json("r-99", "ghost", "Host(`x.example`)"),
        ));
        assert!(!rx.has_changed().unwrap());
    }
}
