// wheelhouse-core: Reactive sync layer between wheelhouse-api and consumers.

pub mod config;
pub mod console;
pub mod error;
pub mod invalidator;
pub mod model;
pub mod reconnect;
pub mod registry;
pub mod scope;
pub mod session;
pub mod store;
pub mod transport;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{ConsoleConfig, TlsVerification};
pub use console::Console;
pub use error::CoreError;
pub use invalidator::{CoarseInvalidator, NotifyCategory};
pub use reconnect::{ReconnectPolicy, supervise};
pub use registry::{ListenerGuard, ListenerRegistry};
pub use scope::ScopeController;
pub use session::{SessionState, StreamSession};
pub use store::{CollectionState, CollectionStore};
pub use transport::{
    ApiTransport, EventSource, EventStream, Notification, NotificationStream, NotifySource, Page,
    PageSource, SubscriptionRequest,
};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    // Identity and scoping
    ProfileId, Scope,
    // Events
    ChangeEvent, EventType, ResourceType,
    // Resources
    Agent, DnsProvider, EntryPoint, Middleware, Profile, Resource, Router, Service,
};
