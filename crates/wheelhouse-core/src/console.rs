// ── Console facade ──
//
// The main entry point for consumers. Wires the listener registry, the
// scope controller, the coarse invalidator, and the transport seams
// together behind one cheaply-cloneable handle.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::config::ConsoleConfig;
use crate::error::CoreError;
use crate::invalidator::{CoarseInvalidator, NotifyCategory};
use crate::model::{ChangeEvent, ProfileId, Resource, ResourceType};
use crate::registry::{ListenerGuard, ListenerRegistry};
use crate::scope::ScopeController;
use crate::session::SessionState;
use crate::store::CollectionStore;
use crate::transport::{ApiTransport, EventSource, NotifySource, PageSource};

/// Client for one management server.
///
/// Create collection stores first, then start scopes: stores register
/// their listeners at construction, so the ordering guarantees no
/// relevant event arrives before anyone is listening.
#[derive(Clone)]
pub struct Console {
    inner: Arc<ConsoleInner>,
}

struct ConsoleInner {
    registry: Arc<ListenerRegistry>,
    scopes: ScopeController,
    pages: Arc<dyn PageSource>,
    invalidator: CoarseInvalidator,
    authenticated: watch::Sender<bool>,
    active_profile: watch::Sender<Option<ProfileId>>,
}

impl Console {
    /// Connect the facade to a real server.
    ///
    /// Builds the HTTP/WebSocket/SSE clients; no network traffic happens
    /// until a scope is started or a page is loaded.
    pub fn new(config: &ConsoleConfig) -> Result<Self, CoreError> {
        let transport = Arc::new(ApiTransport::new(config)?);
        Ok(Self::with_sources(
            Arc::clone(&transport) as Arc<dyn EventSource>,
            Arc::clone(&transport) as Arc<dyn PageSource>,
            transport as Arc<dyn NotifySource>,
        ))
    }

    /// Assemble the facade from explicit transport seams.
    ///
    /// This is the constructor tests use to substitute in-memory
    /// sources.
    pub fn with_sources(
        events: Arc<dyn EventSource>,
        pages: Arc<dyn PageSource>,
        notify: Arc<dyn NotifySource>,
    ) -> Self {
        let registry = Arc::new(ListenerRegistry::new());
        let (authenticated, authenticated_rx) = watch::channel(false);
        let (active_profile, active_profile_rx) = watch::channel(None);

        let scopes = ScopeController::new(Arc::clone(&registry), events);
        let invalidator = CoarseInvalidator::spawn(notify, authenticated_rx, active_profile_rx);

        Self {
            inner: Arc::new(ConsoleInner {
                registry,
                scopes,
                pages,
                invalidator,
                authenticated,
                active_profile,
            }),
        }
    }

    // ── Collections ──────────────────────────────────────────────────

    /// Create a reconciled collection store for one resource type.
    ///
    /// One store per consuming view; drop it when the view is torn
    /// down and its registry entries disappear with it.
    pub fn collection<T: Resource>(&self) -> CollectionStore<T> {
        CollectionStore::attach(&self.inner.registry, Arc::clone(&self.inner.pages))
    }

    /// Register a raw event callback for one resource type.
    pub fn subscribe(
        &self,
        resource_type: ResourceType,
        callback: impl Fn(&ChangeEvent) + Send + Sync + 'static,
    ) -> ListenerGuard {
        self.inner.registry.subscribe(resource_type, callback)
    }

    // ── Scope lifecycle ──────────────────────────────────────────────

    /// Switch the profile-scoped session to `profile_id`.
    ///
    /// Any previous profile session is superseded; by the time this
    /// returns, its in-flight events can no longer be applied.
    pub async fn start_profile_scope(&self, profile_id: ProfileId, filter: Vec<ResourceType>) {
        debug!(%profile_id, "starting profile scope");
        self.inner.active_profile.send_replace(Some(profile_id.clone()));
        self.inner.scopes.start_profile_scope(profile_id, filter).await;
    }

    /// Stop the profile-scoped session. Never surfaces an error.
    pub async fn stop_profile_scope(&self) {
        self.inner.active_profile.send_replace(None);
        self.inner.scopes.stop_profile_scope().await;
    }

    /// Start the global-scoped session.
    pub async fn start_global_scope(&self, filter: Vec<ResourceType>) {
        self.inner.scopes.start_global_scope(filter).await;
    }

    /// Stop the global-scoped session.
    pub async fn stop_global_scope(&self) {
        self.inner.scopes.stop_global_scope().await;
    }

    /// Observe the profile session's lifecycle, if one is running.
    pub async fn profile_session_state(&self) -> Option<watch::Receiver<SessionState>> {
        self.inner.scopes.profile_session_state().await
    }

    /// Observe the global session's lifecycle, if one is running.
    pub async fn global_session_state(&self) -> Option<watch::Receiver<SessionState>> {
        self.inner.scopes.global_session_state().await
    }

    // ── Coarse invalidation ──────────────────────────────────────────

    /// Register the full-refetch handler for one notification category.
    pub fn on_invalidate(
        &self,
        category: NotifyCategory,
        handler: impl Fn(&str) + Send + Sync + 'static,
    ) {
        self.inner.invalidator.on_category(category, handler);
    }

    // ── Session context ──────────────────────────────────────────────

    /// Tell the invalidator whether the consumer is logged in.
    pub fn set_authenticated(&self, authenticated: bool) {
        self.inner.authenticated.send_replace(authenticated);
    }

    /// The profile currently driving the profile scope, if any.
    pub fn active_profile(&self) -> Option<ProfileId> {
        self.inner.active_profile.borrow().clone()
    }
}
