// ── WebSocket change-event stream ──
//
// Opens the server's event endpoint, sends a single subscribe frame
// describing the requested scope and resource-type filter, then yields
// each decoded change event until the connection drops or the caller
// cancels. One connection per subscription -- there is no multiplexing
// of scopes over a single socket.

use std::sync::Arc;

use futures_util::stream::BoxStream;
use futures_util::{SinkExt, StreamExt};
use rustls_pki_types::CertificateDer;
use rustls_pki_types::pem::PemObject;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio_tungstenite::Connector;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::transport::{TlsMode, TransportConfig};

// ── Wire frames ──────────────────────────────────────────────────────

/// Subscribe frame sent once after the upgrade.
///
/// An empty `resource_types` list asks the server for the caller's full
/// authorized set.
#[derive(Debug, Clone, Serialize)]
pub struct WsSubscribe {
    /// `"global"` or `"profile"`.
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
    pub resource_types: Vec<String>,
}

/// A change event as it arrives off the wire, payload still untyped.
#[derive(Debug, Clone, Deserialize)]
pub struct RawChangeEvent {
    /// Resource tag, e.g. `"router"`, `"dns_provider"`.
    pub resource_type: String,
    /// `"created"`, `"updated"`, or `"deleted"`.
    pub event_type: String,
    /// Profile the event belongs to; absent on global-scope events.
    #[serde(default)]
    pub profile_id: Option<String>,
    /// The resource payload (full object, or just `{"id": ...}` for deletes).
    pub data: serde_json::Value,
}

// ── StreamClient ─────────────────────────────────────────────────────

/// Client for the server-streaming change-event endpoint.
#[derive(Debug, Clone)]
pub struct StreamClient {
    ws_url: Url,
    token: Option<SecretString>,
    tls: TlsMode,
}

impl StreamClient {
    /// Derive the WebSocket endpoint from the server base URL.
    ///
    /// The TLS mode and bearer token come from the same
    /// [`TransportConfig`] the REST and notification clients use, so a
    /// custom CA or disabled verification covers all three surfaces.
    pub fn new(base_url: &Url, config: &TransportConfig) -> Result<Self, Error> {
        let mut ws_url = base_url.join("api/events/ws")?;
        let scheme = match ws_url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        ws_url
            .set_scheme(scheme)
            .map_err(|()| Error::WebSocketConnect(format!("cannot derive ws url from {base_url}")))?;
        Ok(Self {
            ws_url,
            token: config.token.clone(),
            tls: config.tls.clone(),
        })
    }

    /// Open a subscription.
    ///
    /// Connects, sends the subscribe frame, and returns a stream of
    /// decoded events. The stream ends cleanly on cancellation, a close
    /// frame, or the peer going away; a transport failure is yielded as
    /// the final `Err` item. Undecodable text frames are skipped with a
    /// logged warning -- they never terminate the stream.
    pub async fn open(
        &self,
        subscribe: &WsSubscribe,
        cancel: CancellationToken,
    ) -> Result<BoxStream<'static, Result<RawChangeEvent, Error>>, Error> {
        let uri: tungstenite::http::Uri = self
            .ws_url
            .as_str()
            .parse()
            .map_err(|e: tungstenite::http::uri::InvalidUri| {
                Error::WebSocketConnect(e.to_string())
            })?;

        let mut request = ClientRequestBuilder::new(uri);
        if let Some(ref token) = self.token {
            request = request.with_header(
                "Authorization",
                format!("Bearer {}", token.expose_secret()),
            );
        }

        tracing::info!(url = %self.ws_url, "connecting to event stream");

        let connector = build_connector(&self.tls)?;
        let (ws_stream, _response) =
            tokio_tungstenite::connect_async_tls_with_config(request, None, false, connector)
                .await
                .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        let (mut write, mut read) = ws_stream.split();

        let frame = serde_json::to_string(subscribe).map_err(|e| Error::Deserialization {
            message: e.to_string(),
        })?;
        write
            .send(tungstenite::Message::Text(frame.into()))
            .await
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        tracing::debug!(
            scope = %subscribe.scope,
            filter = subscribe.resource_types.len(),
            "event subscription established"
        );

        let events = async_stream::stream! {
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    frame = read.next() => {
                        match frame {
                            Some(Ok(tungstenite::Message::Text(text))) => {
                                if let Some(event) = parse_event_frame(&text) {
                                    yield Ok(event);
                                }
                            }
                            Some(Ok(tungstenite::Message::Ping(_))) => {
                                // tungstenite answers pongs automatically
                                tracing::trace!("event stream ping");
                            }
                            Some(Ok(tungstenite::Message::Close(frame))) => {
                                if let Some(ref cf) = frame {
                                    tracing::info!(code = %cf.code, reason = %cf.reason, "event stream closed by server");
                                } else {
                                    tracing::info!("event stream closed by server (no payload)");
                                }
                                break;
                            }
                            Some(Err(e)) => {
                                yield Err(Error::WebSocketConnect(e.to_string()));
                                break;
                            }
                            None => {
                                tracing::info!("event stream ended");
                                break;
                            }
                            _ => {
                                // Binary, Pong, Frame -- ignore
                            }
                        }
                    }
                }
            }
            // Keep the write half alive for the lifetime of the stream
            // so the server does not see a premature half-close.
            drop(write);
        };

        Ok(events.boxed())
    }
}

/// Translate the shared TLS mode into a tungstenite connector.
///
/// `None` keeps tungstenite's built-in webpki-roots verification; the
/// other modes mirror what [`TransportConfig::build_client`] does for
/// the HTTP clients.
fn build_connector(tls: &TlsMode) -> Result<Option<Connector>, Error> {
    match tls {
        TlsMode::System => Ok(None),
        TlsMode::CustomCa(path) => {
            let mut roots = rustls::RootCertStore::empty();
            let certs = CertificateDer::pem_file_iter(path)
                .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
            for cert in certs {
                let cert = cert.map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                roots
                    .add(cert)
                    .map_err(|e| Error::Tls(format!("rejected CA cert: {e}")))?;
            }
            let config = rustls::ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth();
            Ok(Some(Connector::Rustls(Arc::new(config))))
        }
        TlsMode::DangerAcceptInvalid => {
            let config = rustls::ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
                .with_no_client_auth();
            Ok(Some(Connector::Rustls(Arc::new(config))))
        }
    }
}

/// Verifier that accepts every server certificate. Only reachable
/// through [`TlsMode::DangerAcceptInvalid`].
#[derive(Debug)]
struct AcceptAnyServerCert;

impl rustls::client::danger::ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &rustls_pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls_pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

/// Decode a text frame into a change event, or skip it with a warning.
fn parse_event_frame(text: &str) -> Option<RawChangeEvent> {
    match serde_json::from_str::<RawChangeEvent>(text) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!(error = %e, "skipping undecodable event frame");
            None
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_derived_from_https_base() {
        let base = Url::parse("https://console.example.com/").unwrap();
        let client = StreamClient::new(&base, &TransportConfig::default()).unwrap();
        assert_eq!(client.ws_url.as_str(), "wss://console.example.com/api/events/ws");
    }

    #[test]
    fn ws_url_derived_from_http_base() {
        let base = Url::parse("http://127.0.0.1:3000/").unwrap();
        let client = StreamClient::new(&base, &TransportConfig::default()).unwrap();
        assert_eq!(client.ws_url.as_str(), "ws://127.0.0.1:3000/api/events/ws");
    }

    #[test]
    fn system_tls_uses_default_verification() {
        assert!(build_connector(&TlsMode::System).unwrap().is_none());
    }

    #[test]
    fn disabled_verification_builds_a_custom_connector() {
        let connector = build_connector(&TlsMode::DangerAcceptInvalid).unwrap();
        assert!(matches!(connector, Some(Connector::Rustls(_))));
    }

    #[test]
    fn unreadable_ca_cert_is_a_tls_error() {
        let missing = std::path::PathBuf::from("/nonexistent/ca.pem");
        let err = build_connector(&TlsMode::CustomCa(missing)).map(|_| ()).unwrap_err();
        assert!(matches!(err, Error::Tls(_)));
    }

    #[test]
    fn parse_valid_event_frame() {
        let text = r#"{
            "resource_type": "router",
            "event_type": "updated",
            "profile_id": "7",
            "data": { "id": "r-1", "name": "web", "rule": "Host(`example.com`)", "service": "web-svc" }
        }"#;

        let event = parse_event_frame(text).unwrap();
        assert_eq!(event.resource_type, "router");
        assert_eq!(event.event_type, "updated");
        assert_eq!(event.profile_id.as_deref(), Some("7"));
        assert_eq!(event.data["rule"], "Host(`example.com`)");
    }

    #[test]
    fn parse_global_event_without_profile() {
        let text = r#"{"resource_type":"agent","event_type":"created","data":{"id":"a-1","hostname":"edge-1"}}"#;

        let event = parse_event_frame(text).unwrap();
        assert_eq!(event.resource_type, "agent");
        assert!(event.profile_id.is_none());
    }

    #[test]
    fn malformed_frame_is_skipped() {
        assert!(parse_event_frame("not json at all").is_none());
        assert!(parse_event_frame(r#"{"resource_type":"router"}"#).is_none());
    }

    #[test]
    fn subscribe_frame_omits_absent_profile() {
        let frame = WsSubscribe {
            scope: "global".into(),
            profile_id: None,
            resource_types: vec!["agent".into()],
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(!json.contains("profile_id"));
    }
}
