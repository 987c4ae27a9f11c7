// ── Stream session ──
//
// Owns exactly one open streaming subscription and pumps it into the
// listener registry. Sessions are single-use: a terminal state is never
// left, and a rescope always constructs a fresh session.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::registry::ListenerRegistry;
use crate::transport::{EventSource, SubscriptionRequest};

/// Lifecycle of a session.
///
/// `Idle → Connecting → Streaming → {Cancelled | Failed | Ended}`.
/// Events are dispatched only while connecting or streaming; terminal
/// states are never reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Streaming,
    /// Terminated by its owner. Not an error; never surfaced to stores.
    Cancelled,
    /// Terminated by the transport. Reported to failure listeners.
    Failed { message: String },
    /// The server closed the stream cleanly.
    Ended,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Failed { .. } | Self::Ended)
    }
}

/// Handle to one running stream session.
pub struct StreamSession {
    generation: u64,
    cancel: CancellationToken,
    state: watch::Receiver<SessionState>,
    // Held so tests can await task completion; the task itself never
    // needs to be joined for correctness.
    _task: JoinHandle<()>,
}

impl StreamSession {
    /// Spawn the pump task for one subscription.
    ///
    /// `current_generation` is the owning scope slot's counter; the
    /// session discards any event once its own `generation` is no
    /// longer current.
    pub(crate) fn spawn(
        source: Arc<dyn EventSource>,
        registry: Arc<ListenerRegistry>,
        request: SubscriptionRequest,
        generation: u64,
        current_generation: Arc<AtomicU64>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);

        let task = tokio::spawn(run_session(
            source,
            registry,
            request,
            generation,
            current_generation,
            cancel.clone(),
            state_tx,
        ));

        Self {
            generation,
            cancel,
            state: state_rx,
            _task: task,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Observe state transitions.
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Signal cooperative cancellation. Returns immediately; the pump
    /// task observes the token at its next suspension point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// The pump: open the stream, forward each event, classify termination.
async fn run_session(
    source: Arc<dyn EventSource>,
    registry: Arc<ListenerRegistry>,
    request: SubscriptionRequest,
    generation: u64,
    current_generation: Arc<AtomicU64>,
    cancel: CancellationToken,
    state: watch::Sender<SessionState>,
) {
    let filter = request.resource_types.clone();
    let scope = request.scope.clone();
    let _ = state.send(SessionState::Connecting);

    let opened = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            debug!(?scope, generation, "session cancelled before connect completed");
            let _ = state.send(SessionState::Cancelled);
            return;
        }
        opened = source.open(request, cancel.clone()) => opened,
    };

    let mut events = match opened {
        Ok(stream) => stream,
        Err(e) => {
            if cancel.is_cancelled() {
                let _ = state.send(SessionState::Cancelled);
            } else {
                warn!(?scope, generation, error = %e, "session failed to connect");
                registry.dispatch_failure(&filter, &e.to_string());
                let _ = state.send(SessionState::Failed {
                    message: e.to_string(),
                });
            }
            return;
        }
    };

    let _ = state.send(SessionState::Streaming);
    debug!(?scope, generation, "session streaming");

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = state.send(SessionState::Cancelled);
                return;
            }
            next = events.next() => next,
        };

        match next {
            Some(Ok(event)) => {
                // Both checks run before every dispatch: a session that
                // was cancelled or superseded mid-iteration must not
                // mutate state that now belongs to a newer scope.
                if cancel.is_cancelled() {
                    debug!(?scope, generation, "discarding event after cancellation");
                    let _ = state.send(SessionState::Cancelled);
                    return;
                }
                if current_generation.load(Ordering::Acquire) != generation {
                    debug!(?scope, generation, "discarding event from superseded generation");
                    let _ = state.send(SessionState::Cancelled);
                    return;
                }
                registry.dispatch(&event);
            }
            Some(Err(e)) => {
                if cancel.is_cancelled() {
                    let _ = state.send(SessionState::Cancelled);
                } else {
                    warn!(?scope, generation, error = %e, "session stream failed");
                    registry.dispatch_failure(&filter, &e.to_string());
                    let _ = state.send(SessionState::Failed {
                        message: e.to_string(),
                    });
                }
                return;
            }
            None => {
                debug!(?scope, generation, "session stream ended");
                let _ = state.send(SessionState::Ended);
                return;
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
