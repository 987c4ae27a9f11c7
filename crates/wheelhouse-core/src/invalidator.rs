// ── Coarse invalidator ──
//
// Consumes the shared low-frequency notification channel. Instead of
// granular reconciliation, a notification triggers a full refetch of
// the affected category's listing via a registered handler. Used for
// aggregate resources where per-event patching is not worth it.

use std::str::FromStr;
use std::sync::Arc;

use dashmap::DashMap;
use strum::{Display, EnumString};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use futures_util::StreamExt;

use crate::model::ProfileId;
use crate::transport::{Notification, NotifySource};

/// Category tags carried by the shared notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum NotifyCategory {
    Profile,
    TraefikConfig,
    User,
    Dns,
    Agent,
    Error,
}

type RefetchHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Drives the notification loop and fans categories out to handlers.
///
/// Handlers run synchronously on the loop task; a handler that needs to
/// do async work should spawn it.
pub struct CoarseInvalidator {
    handlers: Arc<DashMap<NotifyCategory, RefetchHandler>>,
    cancel: CancellationToken,
    _task: JoinHandle<()>,
}

impl CoarseInvalidator {
    /// Open the channel and start consuming.
    ///
    /// `authenticated` and `active_profile` gate delivery: nothing is
    /// handled while logged out, and profile-bound categories are
    /// dropped while no profile is selected.
    pub fn spawn(
        source: Arc<dyn NotifySource>,
        authenticated: watch::Receiver<bool>,
        active_profile: watch::Receiver<Option<ProfileId>>,
    ) -> Self {
        let handlers: Arc<DashMap<NotifyCategory, RefetchHandler>> = Arc::new(DashMap::new());
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_invalidator(
            source,
            Arc::clone(&handlers),
            authenticated,
            active_profile,
            cancel.clone(),
        ));

        Self {
            handlers,
            cancel,
            _task: task,
        }
    }

    /// Register the refetch handler for one category, replacing any
    /// previous handler. The handler receives the notification message.
    pub fn on_category(&self, category: NotifyCategory, handler: impl Fn(&str) + Send + Sync + 'static) {
        self.handlers.insert(category, Arc::new(handler));
    }

    /// Stop consuming the channel.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for CoarseInvalidator {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_invalidator(
    source: Arc<dyn NotifySource>,
    handlers: Arc<DashMap<NotifyCategory, RefetchHandler>>,
    authenticated: watch::Receiver<bool>,
    active_profile: watch::Receiver<Option<ProfileId>>,
    cancel: CancellationToken,
) {
    let opened = tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        opened = source.open(cancel.clone()) => opened,
    };

    let mut notifications = match opened {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "notification channel failed to open");
            return;
        }
    };

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            next = notifications.next() => next,
        };

        match next {
            Some(Ok(notification)) => {
                handle_notification(&notification, &handlers, &authenticated, &active_profile);
            }
            Some(Err(e)) => {
                warn!(error = %e, "notification channel failed");
                return;
            }
            None => {
                info!("notification channel ended");
                return;
            }
        }
    }
}

/// Apply the delivery guards, then run the category's handler.
fn handle_notification(
    notification: &Notification,
    handlers: &DashMap<NotifyCategory, RefetchHandler>,
    authenticated: &watch::Receiver<bool>,
    active_profile: &watch::Receiver<Option<ProfileId>>,
) {
    let Ok(category) = NotifyCategory::from_str(&notification.category) else {
        warn!(category = %notification.category, "dropping notification with unknown category");
        return;
    };

    if !*authenticated.borrow() {
        debug!(%category, "dropping notification while unauthenticated");
        return;
    }

    // Proxy-config notifications are meaningless without a selected
    // profile to refetch against.
    if category == NotifyCategory::TraefikConfig && active_profile.borrow().is_none() {
        debug!("dropping traefik-config notification with no profile selected");
        return;
    }

    if category == NotifyCategory::Error {
        warn!(message = %notification.message, "server reported an error over the notification channel");
    }

    let handler = {
        let Some(entry) = handlers.get(&category) else {
            debug!(%category, "no refetch handler registered");
            return;
        };
        Arc::clone(entry.value())
    };
    handler(&notification.message);
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn notification(category: &str, message: &str) -> Notification {
        Notification {
            kind: "invalidate".into(),
            category: category.to_owned(),
            message: message.to_owned(),
        }
    }

    struct Fixture {
        handlers: Arc<DashMap<NotifyCategory, RefetchHandler>>,
        authenticated: watch::Sender<bool>,
        active_profile: watch::Sender<Option<ProfileId>>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                handlers: Arc::new(DashMap::new()),
                authenticated: watch::channel(true).0,
                active_profile: watch::channel(Some(ProfileId::from("7"))).0,
            }
        }

        fn deliver(&self, n: &Notification) {
            handle_notification(
                n,
                &self.handlers,
                &self.authenticated.subscribe(),
                &self.active_profile.subscribe(),
            );
        }
    }

    #[test]
    fn category_wire_forms() {
        assert_eq!(NotifyCategory::TraefikConfig.to_string(), "traefik-config");
        assert_eq!(
            NotifyCategory::from_str("traefik-config").unwrap(),
            NotifyCategory::TraefikConfig
        );
        assert_eq!(NotifyCategory::from_str("dns").unwrap(), NotifyCategory::Dns);
        assert!(NotifyCategory::from_str("bogus").is_err());
    }

    #[test]
    fn valid_notification_triggers_handler_with_message() {
        let fixture = Fixture::new();
        let messages: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let m = Arc::clone(&messages);
        fixture
            .handlers
            .insert(NotifyCategory::Dns, Arc::new(move |msg: &str| {
                m.lock().unwrap().push(msg.to_owned());
            }));

        fixture.deliver(&notification("dns", "provider rotated"));

        assert_eq!(*messages.lock().unwrap(), vec!["provider rotated"]);
    }

    #[test]
    fn unknown_category_is_dropped() {
        let fixture = Fixture::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        fixture
            .handlers
            .insert(NotifyCategory::Agent, Arc::new(move |_: &str| {
                h.fetch_add(1, Ordering::SeqCst);
            }));

        fixture.deliver(&notification("not-a-category", ""));

        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unauthenticated_consumer_ignores_notifications() {
        let fixture = Fixture::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        fixture
            .handlers
            .insert(NotifyCategory::Agent, Arc::new(move |_: &str| {
                h.fetch_add(1, Ordering::SeqCst);
            }));

        fixture.authenticated.send_replace(false);
        fixture.deliver(&notification("agent", ""));
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        fixture.authenticated.send_replace(true);
        fixture.deliver(&notification("agent", ""));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn config_notification_requires_a_selected_profile() {
        let fixture = Fixture::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        fixture
            .handlers
            .insert(NotifyCategory::TraefikConfig, Arc::new(move |_: &str| {
                h.fetch_add(1, Ordering::SeqCst);
            }));

        fixture.active_profile.send_replace(None);
        fixture.deliver(&notification("traefik-config", ""));
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        fixture.active_profile.send_replace(Some(ProfileId::from("7")));
        fixture.deliver(&notification("traefik-config", ""));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn notification_without_handler_is_ignored() {
        let fixture = Fixture::new();
        fixture.deliver(&notification("user", "password changed"));
    }
}
