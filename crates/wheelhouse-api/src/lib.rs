// wheelhouse-api: Async transport client for the Wheelhouse management server.
//
// Three consumed surfaces, each treated as a black box by the core:
//   - REST paged-list fetches (`rest`)
//   - the per-scope WebSocket change-event stream (`stream`)
//   - the shared SSE notification channel (`notify`)

pub mod error;
pub mod notify;
pub mod rest;
pub mod stream;
pub mod transport;

// ── Primary re-exports ──────────────────────────────────────────────
pub use error::Error;
pub use notify::{NotifyClient, RawNotification};
pub use rest::{Page, RestClient};
pub use stream::{RawChangeEvent, StreamClient, WsSubscribe};
pub use transport::{TlsMode, TransportConfig};
