// ── Scope controller ──
//
// Enforces "at most one live stream session per scope category": one
// slot for the profile scope, one for the global scope, each with its
// own generation counter. Superseding a session cancels it without
// waiting for teardown; the generation check inside the session makes
// any still-in-flight event from the old session inert.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, watch};
use tracing::debug;

use crate::model::{ProfileId, ResourceType, Scope};
use crate::registry::ListenerRegistry;
use crate::session::{SessionState, StreamSession};
use crate::transport::{EventSource, SubscriptionRequest};

struct ScopeSlot {
    current_generation: Arc<AtomicU64>,
    session: Option<StreamSession>,
}

impl ScopeSlot {
    fn new() -> Self {
        Self {
            current_generation: Arc::new(AtomicU64::new(0)),
            session: None,
        }
    }
}

/// Owns the profile-scoped and global-scoped session slots.
pub struct ScopeController {
    registry: Arc<ListenerRegistry>,
    source: Arc<dyn EventSource>,
    profile: Mutex<ScopeSlot>,
    global: Mutex<ScopeSlot>,
}

impl ScopeController {
    pub fn new(registry: Arc<ListenerRegistry>, source: Arc<dyn EventSource>) -> Self {
        Self {
            registry,
            source,
            profile: Mutex::new(ScopeSlot::new()),
            global: Mutex::new(ScopeSlot::new()),
        }
    }

    /// Start (or re-scope) the profile-scoped session.
    ///
    /// Once this returns, no event from a previous profile session can
    /// be applied: the generation counter was bumped before the new
    /// session existed, so every old dispatch path fails its
    /// is-current check.
    pub async fn start_profile_scope(&self, profile_id: ProfileId, filter: Vec<ResourceType>) {
        self.start(&self.profile, Scope::Profile(profile_id), filter)
            .await;
    }

    /// Cancel and clear the profile-scoped session, if any.
    pub async fn stop_profile_scope(&self) {
        Self::stop(&self.profile, "profile").await;
    }

    /// Start (or restart) the global-scoped session.
    pub async fn start_global_scope(&self, filter: Vec<ResourceType>) {
        self.start(&self.global, Scope::Global, filter).await;
    }

    /// Cancel and clear the global-scoped session, if any.
    pub async fn stop_global_scope(&self) {
        Self::stop(&self.global, "global").await;
    }

    /// Observe the current profile session's state, if one exists.
    pub async fn profile_session_state(&self) -> Option<watch::Receiver<SessionState>> {
        self.profile.lock().await.session.as_ref().map(StreamSession::state)
    }

    /// Observe the current global session's state, if one exists.
    pub async fn global_session_state(&self) -> Option<watch::Receiver<SessionState>> {
        self.global.lock().await.session.as_ref().map(StreamSession::state)
    }

    async fn start(&self, slot: &Mutex<ScopeSlot>, scope: Scope, filter: Vec<ResourceType>) {
        let mut slot = slot.lock().await;

        // Bump first: in-flight events from the old session become
        // stale before the cancellation even lands.
        let generation = slot.current_generation.fetch_add(1, Ordering::AcqRel) + 1;

        if let Some(old) = slot.session.take() {
            debug!(
                old_generation = old.generation(),
                new_generation = generation,
                ?scope,
                "superseding active session"
            );
            old.cancel();
        }

        let request = SubscriptionRequest {
            scope,
            resource_types: filter,
        };
        slot.session = Some(StreamSession::spawn(
            Arc::clone(&self.source),
            Arc::clone(&self.registry),
            request,
            generation,
            Arc::clone(&slot.current_generation),
        ));
    }

    async fn stop(slot: &Mutex<ScopeSlot>, category: &str) {
        let mut slot = slot.lock().await;
        slot.current_generation.fetch_add(1, Ordering::AcqRel);
        if let Some(session) = slot.session.take() {
            debug!(category, generation = session.generation(), "stopping scope session");
            session.cancel();
        }
    }
}
