// ── Coarse notification channel (SSE) ──
//
// The server exposes a single text event stream carrying low-frequency
// category notifications: `data: {"type": "...", "category": "...",
// "message": "..."}` lines. Unlike the WebSocket change stream this
// channel is shared across all scopes; the consumer decides what each
// category means.

use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// A notification as it arrives off the shared channel.
#[derive(Debug, Clone, Deserialize)]
pub struct RawNotification {
    /// Message kind, e.g. `"invalidate"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Category tag: `"profile"`, `"traefik-config"`, `"user"`, `"dns"`,
    /// `"agent"`, or `"error"`.
    pub category: String,
    /// Human-readable detail.
    #[serde(default)]
    pub message: String,
}

/// Client for the server's SSE notification endpoint.
#[derive(Debug, Clone)]
pub struct NotifyClient {
    http: reqwest::Client,
    url: Url,
}

impl NotifyClient {
    pub fn new(base_url: &Url, config: &TransportConfig) -> Result<Self, Error> {
        // The SSE response never completes, so the client must not carry
        // a whole-request timeout.
        let mut config = config.clone();
        config.timeout = std::time::Duration::ZERO;

        Ok(Self {
            http: config.build_client()?,
            url: base_url.join("api/notifications/stream")?,
        })
    }

    /// Open the notification stream.
    ///
    /// Yields parsed notifications until cancellation or transport
    /// failure. Lines that are not well-formed `data:` payloads are
    /// skipped with a logged warning.
    pub async fn open(
        &self,
        cancel: CancellationToken,
    ) -> Result<BoxStream<'static, Result<RawNotification, Error>>, Error> {
        tracing::info!(url = %self.url, "connecting to notification stream");

        let response = self
            .http
            .get(self.url.clone())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                message,
                status: status.as_u16(),
            });
        }

        let mut chunks = response.bytes_stream();

        let notifications = async_stream::stream! {
            let mut buffer = String::new();
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    chunk = chunks.next() => {
                        match chunk {
                            Some(Ok(bytes)) => {
                                buffer.push_str(&String::from_utf8_lossy(&bytes));
                                for line in take_complete_lines(&mut buffer) {
                                    if let Some(notification) = parse_sse_line(&line) {
                                        yield Ok(notification);
                                    }
                                }
                            }
                            Some(Err(e)) => {
                                yield Err(Error::Notify(e.to_string()));
                                break;
                            }
                            None => {
                                tracing::info!("notification stream ended");
                                break;
                            }
                        }
                    }
                }
            }
        };

        Ok(notifications.boxed())
    }
}

/// Longest partial line kept while waiting for a newline. Real
/// notifications are tiny; anything bigger is a misbehaving server.
const MAX_PARTIAL_LINE_BYTES: usize = 64 * 1024;

/// Split off every complete line, leaving the trailing partial line in
/// the buffer. A partial line that outgrows the cap is discarded so a
/// server that stops sending newlines cannot grow the buffer without
/// bound.
fn take_complete_lines(buffer: &mut String) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = buffer.find('\n') {
        let line = buffer[..pos].trim_end_matches('\r').to_owned();
        buffer.drain(..=pos);
        lines.push(line);
    }
    if buffer.len() > MAX_PARTIAL_LINE_BYTES {
        tracing::warn!(
            bytes = buffer.len(),
            "discarding oversized partial notification line"
        );
        buffer.clear();
    }
    lines
}

/// Parse one SSE line. Comment lines, keep-alives, and field lines other
/// than `data:` are ignored silently; a `data:` line that fails to parse
/// is dropped with a warning.
fn parse_sse_line(line: &str) -> Option<RawNotification> {
    let data = line.strip_prefix("data:")?;
    match serde_json::from_str::<RawNotification>(data.trim()) {
        Ok(notification) => Some(notification),
        Err(e) => {
            tracing::warn!(error = %e, "skipping unparseable notification payload");
            None
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
