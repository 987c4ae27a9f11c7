// ── Scope and resource-type tags ──

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Identifier of a profile (tenant) on the management server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(String);

impl ProfileId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProfileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProfileId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for ProfileId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The subscription boundary a session is attached to.
///
/// Profile-scoped sessions receive events for one tenant's resources;
/// the global scope covers cross-tenant resources (agents, profiles,
/// DNS providers).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Global,
    Profile(ProfileId),
}

impl Scope {
    pub fn profile_id(&self) -> Option<&ProfileId> {
        match self {
            Self::Global => None,
            Self::Profile(id) => Some(id),
        }
    }
}

/// Tag identifying which domain entity an event or listing concerns.
///
/// The wire form is the snake_case name (`"entry_point"`,
/// `"dns_provider"`, ...), shared by the REST paths, the WebSocket
/// frames, and the serde representation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Router,
    Service,
    Middleware,
    EntryPoint,
    Agent,
    DnsProvider,
    Profile,
}

/// What happened to a resource.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Created,
    Updated,
    Deleted,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn resource_type_wire_form_round_trips() {
        assert_eq!(ResourceType::DnsProvider.to_string(), "dns_provider");
        assert_eq!(ResourceType::EntryPoint.to_string(), "entry_point");
        assert_eq!(
            ResourceType::from_str("dns_provider").unwrap(),
            ResourceType::DnsProvider
        );
        assert!(ResourceType::from_str("unknown_thing").is_err());
    }

    #[test]
    fn event_type_wire_form() {
        assert_eq!(EventType::Created.to_string(), "created");
        assert_eq!(EventType::from_str("deleted").unwrap(), EventType::Deleted);
    }

    #[test]
    fn scope_profile_id_accessor() {
        assert!(Scope::Global.profile_id().is_none());
        let scope = Scope::Profile(ProfileId::from("7"));
        assert_eq!(scope.profile_id().map(ProfileId::as_str), Some("7"));
    }
}
