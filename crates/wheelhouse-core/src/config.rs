// ── Runtime connection configuration ──
//
// Describes *how* to reach the management server. Carries credential
// data and connection tuning, never touches disk -- the embedding
// application constructs a `ConsoleConfig` and hands it in.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (self-signed dev servers).
    DangerAcceptInvalid,
}

/// Configuration for connecting to a single management server.
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    /// Server base URL (e.g., `https://console.example.com`).
    pub url: Url,
    /// Bearer token, if the server requires authentication.
    pub token: Option<SecretString>,
    /// TLS verification strategy.
    pub tls: TlsVerification,
    /// Request timeout for paged fetches.
    pub timeout: Duration,
}

impl ConsoleConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            token: None,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_token(mut self, token: SecretString) -> Self {
        self.token = Some(token);
        self
    }
}
