// ── Core error types ──
//
// User-facing errors from wheelhouse-core. These are NOT API-specific --
// consumers never see HTTP status codes or JSON parse failures directly.
// The `From<wheelhouse_api::Error>` impl translates transport-layer
// errors into domain-appropriate variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to server at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Transport failure: {message}")]
    Transport { message: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Fetch rejected by server: {message}")]
    Fetch {
        message: String,
        status: Option<u16>,
    },

    #[error("Decode failure: {message}")]
    Decode { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<wheelhouse_api::Error> for CoreError {
    fn from(err: wheelhouse_api::Error) -> Self {
        match err {
            wheelhouse_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            wheelhouse_api::Error::Transport(ref e) => {
                if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map(|u| u.to_string())
                            .unwrap_or_else(|| "<unknown>".into()),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Transport {
                        message: e.to_string(),
                    }
                }
            }
            wheelhouse_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            wheelhouse_api::Error::Api { message, status } => CoreError::Fetch {
                message,
                status: Some(status),
            },
            wheelhouse_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket connection failed: {reason}"),
            },
            wheelhouse_api::Error::WebSocketClosed { code, reason } => CoreError::Transport {
                message: format!("WebSocket closed (code {code}): {reason}"),
            },
            wheelhouse_api::Error::Notify(reason) => CoreError::Transport {
                message: format!("Notification channel failed: {reason}"),
            },
            wheelhouse_api::Error::Deserialization { message } => CoreError::Decode { message },
            wheelhouse_api::Error::Tls(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {reason}"),
            },
        }
    }
}
