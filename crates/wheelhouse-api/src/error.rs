// ── Transport-layer errors ──
//
// Everything that can go wrong talking to the management server.
// Consumers (wheelhouse-core) translate these into domain errors;
// nothing here is meant for direct display to end users.

use thiserror::Error;

/// Unified error type for the transport crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Server rejected request (status {status}): {message}")]
    Api { message: String, status: u16 },

    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    #[error("Notification channel error: {0}")]
    Notify(String),

    #[error("Deserialization error: {message}")]
    Deserialization { message: String },

    #[error("TLS error: {0}")]
    Tls(String),
}
