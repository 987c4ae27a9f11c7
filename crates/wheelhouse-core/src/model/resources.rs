// ── Domain resources ──
//
// Canonical representations of the entities the console manages. Each
// implements [`Resource`] so a `CollectionStore` can be instantiated
// for it. Fields mirror the server's JSON; optional tuning fields get
// serde defaults so partial server payloads still decode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ResourceType;

/// An entity that can live in a reconciled collection.
pub trait Resource:
    serde::de::DeserializeOwned + Serialize + Clone + PartialEq + Send + Sync + 'static
{
    const RESOURCE_TYPE: ResourceType;

    /// Stable unique id, the reconciliation key.
    fn id(&self) -> &str;
}

/// An HTTP router: matches requests by rule and forwards to a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Router {
    pub id: String,
    pub name: String,
    /// Matching rule, e.g. `` Host(`example.com`) && PathPrefix(`/api`) ``.
    pub rule: String,
    pub service: String,
    #[serde(default)]
    pub entry_points: Vec<String>,
    #[serde(default)]
    pub middlewares: Vec<String>,
    #[serde(default)]
    pub priority: i64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Resource for Router {
    const RESOURCE_TYPE: ResourceType = ResourceType::Router;

    fn id(&self) -> &str {
        &self.id
    }
}

/// A backend service routers forward to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub server_urls: Vec<String>,
    #[serde(default = "default_true")]
    pub pass_host_header: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Resource for Service {
    const RESOURCE_TYPE: ResourceType = ResourceType::Service;

    fn id(&self) -> &str {
        &self.id
    }
}

/// A middleware attached to routers; `config` stays schemaless because
/// each middleware kind carries its own options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Middleware {
    pub id: String,
    pub name: String,
    /// Middleware kind, e.g. `"stripPrefix"`, `"basicAuth"`.
    pub kind: String,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Resource for Middleware {
    const RESOURCE_TYPE: ResourceType = ResourceType::Middleware;

    fn id(&self) -> &str {
        &self.id
    }
}

/// A listening entry point on the proxy (address like `":443"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryPoint {
    pub id: String,
    pub name: String,
    pub address: String,
}

impl Resource for EntryPoint {
    const RESOURCE_TYPE: ResourceType = ResourceType::EntryPoint;

    fn id(&self) -> &str {
        &self.id
    }
}

/// A remote agent reporting configuration into the console.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub hostname: String,
    #[serde(default)]
    pub public_ip: Option<String>,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

impl Resource for Agent {
    const RESOURCE_TYPE: ResourceType = ResourceType::Agent;

    fn id(&self) -> &str {
        &self.id
    }
}

/// DNS provider credentials used for automatic record management.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsProvider {
    pub id: String,
    pub name: String,
    /// Provider kind, e.g. `"cloudflare"`, `"route53"`.
    pub provider: String,
    #[serde(default)]
    pub is_default: bool,
}

impl Resource for DnsProvider {
    const RESOURCE_TYPE: ResourceType = ResourceType::DnsProvider;

    fn id(&self) -> &str {
        &self.id
    }
}

/// A profile: one managed proxy configuration namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl Resource for Profile {
    const RESOURCE_TYPE: ResourceType = ResourceType::Profile;

    fn id(&self) -> &str {
        &self.id
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn router_decodes_with_defaults() {
        let json = r#"{ "id": "r-1", "name": "web", "rule": "Host(`a.example`)", "service": "web-svc" }"#;
        let router: Router = serde_json::from_str(json).unwrap();
        assert!(router.enabled);
        assert!(router.entry_points.is_empty());
        assert_eq!(router.priority, 0);
    }

    #[test]
    fn middleware_config_stays_schemaless() {
        let json = r#"{ "id": "m-1", "name": "auth", "kind": "basicAuth",
                        "config": { "users": ["admin:hash"] } }"#;
        let mw: Middleware = serde_json::from_str(json).unwrap();
        assert_eq!(mw.config["users"][0], "admin:hash");
    }
}
