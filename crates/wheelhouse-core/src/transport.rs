// ── Transport seams ──
//
// The core never talks HTTP or WebSocket directly: it programs against
// three narrow traits, one per consumed surface. `ApiTransport` bridges
// them to the concrete wheelhouse-api clients; tests substitute
// in-memory implementations.

use std::str::FromStr;
use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use wheelhouse_api::{NotifyClient, RawChangeEvent, RestClient, StreamClient, WsSubscribe};

use crate::config::{ConsoleConfig, TlsVerification};
use crate::error::CoreError;
use crate::model::{ChangeEvent, EventType, ProfileId, ResourceType, Scope};

// ── Requests and items ───────────────────────────────────────────────

/// What a stream session asks the server to deliver.
///
/// An empty `resource_types` filter means "everything the caller is
/// authorized to see".
#[derive(Debug, Clone)]
pub struct SubscriptionRequest {
    pub scope: Scope,
    pub resource_types: Vec<ResourceType>,
}

/// One fetched page, items still untyped.
#[derive(Debug, Clone)]
pub struct Page {
    pub items: Vec<serde_json::Value>,
    pub total_count: u64,
}

/// A message from the shared coarse notification channel, category not
/// yet validated.
#[derive(Debug, Clone)]
pub struct Notification {
    pub kind: String,
    pub category: String,
    pub message: String,
}

pub type EventStream = BoxStream<'static, Result<ChangeEvent, CoreError>>;
pub type NotificationStream = BoxStream<'static, Result<Notification, CoreError>>;

// ── Seams ────────────────────────────────────────────────────────────

/// The cancellable server-streaming change-event call.
pub trait EventSource: Send + Sync + 'static {
    fn open(
        &self,
        request: SubscriptionRequest,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<EventStream, CoreError>>;
}

/// The paged-list fetch, one call per page.
pub trait PageSource: Send + Sync + 'static {
    fn load_page(
        &self,
        resource_type: ResourceType,
        scope: Scope,
        page_size: u32,
        page_index: u32,
    ) -> BoxFuture<'static, Result<Page, CoreError>>;
}

/// The shared one-way notification channel.
pub trait NotifySource: Send + Sync + 'static {
    fn open(
        &self,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<NotificationStream, CoreError>>;
}

// ── Concrete bridge to wheelhouse-api ────────────────────────────────

/// Bundles the three wheelhouse-api clients behind the core seams.
pub struct ApiTransport {
    stream: StreamClient,
    rest: RestClient,
    notify: NotifyClient,
}

impl ApiTransport {
    pub fn new(config: &ConsoleConfig) -> Result<Self, CoreError> {
        let transport = wheelhouse_api::TransportConfig {
            tls: match &config.tls {
                TlsVerification::SystemDefaults => wheelhouse_api::TlsMode::System,
                TlsVerification::CustomCa(path) => {
                    wheelhouse_api::TlsMode::CustomCa(path.clone())
                }
                TlsVerification::DangerAcceptInvalid => {
                    wheelhouse_api::TlsMode::DangerAcceptInvalid
                }
            },
            timeout: config.timeout,
            token: config.token.clone(),
        };

        Ok(Self {
            stream: StreamClient::new(&config.url, &transport)?,
            rest: RestClient::new(config.url.clone(), &transport)?,
            notify: NotifyClient::new(&config.url, &transport)?,
        })
    }
}

impl EventSource for ApiTransport {
    fn open(
        &self,
        request: SubscriptionRequest,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<EventStream, CoreError>> {
        let client = self.stream.clone();
        Box::pin(async move {
            let subscribe = WsSubscribe {
                scope: match request.scope {
                    Scope::Global => "global".into(),
                    Scope::Profile(_) => "profile".into(),
                },
                profile_id: request.scope.profile_id().map(ToString::to_string),
                resource_types: request
                    .resource_types
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
            };

            let raw = client.open(&subscribe, cancel).await.map_err(CoreError::from)?;
            let events = raw
                .filter_map(|item| {
                    futures_util::future::ready(match item {
                        Ok(raw_event) => convert_event(raw_event).map(Ok),
                        Err(e) => Some(Err(CoreError::from(e))),
                    })
                })
                .boxed();
            Ok(events)
        })
    }
}

impl PageSource for ApiTransport {
    fn load_page(
        &self,
        resource_type: ResourceType,
        scope: Scope,
        page_size: u32,
        page_index: u32,
    ) -> BoxFuture<'static, Result<Page, CoreError>> {
        let client = self.rest.clone();
        Box::pin(async move {
            let profile_id = scope.profile_id().map(ProfileId::as_str).map(str::to_owned);
            let page = client
                .list_page(
                    &resource_type.to_string(),
                    profile_id.as_deref(),
                    page_size,
                    page_index,
                )
                .await?;
            Ok(Page {
                items: page.items,
                total_count: page.total_count,
            })
        })
    }
}

impl NotifySource for ApiTransport {
    fn open(
        &self,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<NotificationStream, CoreError>> {
        let client = self.notify.clone();
        Box::pin(async move {
            let raw = client.open(cancel).await.map_err(CoreError::from)?;
            let notifications = raw
                .map(|item| {
                    item.map(|n| Notification {
                        kind: n.kind,
                        category: n.category,
                        message: n.message,
                    })
                    .map_err(CoreError::from)
                })
                .boxed();
            Ok(notifications)
        })
    }
}

/// Map a wire event into the typed core event, or drop it.
///
/// Unknown resource types or event types are not errors -- a newer
/// server may emit tags this client does not know yet.
fn convert_event(raw: RawChangeEvent) -> Option<ChangeEvent> {
    let resource_type = match ResourceType::from_str(&raw.resource_type) {
        Ok(rt) => rt,
        Err(_) => {
            tracing::debug!(resource_type = %raw.resource_type, "ignoring event for unknown resource type");
            return None;
        }
    };
    let event_type = match EventType::from_str(&raw.event_type) {
        Ok(et) => et,
        Err(_) => {
            tracing::warn!(event_type = %raw.event_type, "ignoring event with unknown event type");
            return None;
        }
    };
    let scope = match raw.profile_id {
        Some(id) => Scope::Profile(ProfileId::from(id)),
        None => Scope::Global,
    };

    Some(ChangeEvent {
        resource_type,
        event_type,
        resource: Arc::new(raw.data),
        scope,
    })
}

// Seam impls for `Arc`-wrapped sources, so one shared transport can be
// handed to multiple owners.
impl<T: EventSource> EventSource for Arc<T> {
    fn open(
        &self,
        request: SubscriptionRequest,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<EventStream, CoreError>> {
        (**self).open(request, cancel)
    }
}

impl<T: PageSource> PageSource for Arc<T> {
    fn load_page(
        &self,
        resource_type: ResourceType,
        scope: Scope,
        page_size: u32,
        page_index: u32,
    ) -> BoxFuture<'static, Result<Page, CoreError>> {
        (**self).load_page(resource_type, scope, page_size, page_index)
    }
}

impl<T: NotifySource> NotifySource for Arc<T> {
    fn open(
        &self,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<NotificationStream, CoreError>> {
        (**self).open(cancel)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn convert_event_maps_known_tags() {
        let raw = RawChangeEvent {
            resource_type: "router".into(),
            event_type: "updated".into(),
            profile_id: Some("7".into()),
            data: serde_json::json!({ "id": "r-1" }),
        };

        let event = convert_event(raw).unwrap();
        assert_eq!(event.resource_type, ResourceType::Router);
        assert_eq!(event.event_type, EventType::Updated);
        assert_eq!(event.scope, Scope::Profile(ProfileId::from("7")));
        assert_eq!(event.resource_id(), Some("r-1"));
    }

    #[test]
    fn convert_event_drops_unknown_tags() {
        let unknown_type = RawChangeEvent {
            resource_type: "flux_capacitor".into(),
            event_type: "created".into(),
            profile_id: None,
            data: serde_json::json!({}),
        };
        assert!(convert_event(unknown_type).is_none());

        let unknown_event = RawChangeEvent {
            resource_type: "router".into(),
            event_type: "exploded".into(),
            profile_id: None,
            data: serde_json::json!({}),
        };
        assert!(convert_event(unknown_event).is_none());
    }
}
