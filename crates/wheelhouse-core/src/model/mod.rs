// ── Domain model ──
//
// Canonical types shared by the registry, sessions, and stores.

pub mod event;
pub mod resources;
pub mod scope;

pub use event::ChangeEvent;
pub use resources::{
    Agent, DnsProvider, EntryPoint, Middleware, Profile, Resource, Router, Service,
};
pub use scope::{EventType, ProfileId, ResourceType, Scope};
