// ── Reconnection policy ──
//
// Sessions never restart themselves; cancellation must stay silent and
// a transport failure is only reported. Consumers that do want
// resilience opt in by running `supervise` with a policy -- retry
// behavior stays an explicit, testable layer on top of the session
// machinery.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::CoreError;
use crate::session::SessionState;

/// Exponential backoff configuration for session resurrection.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay before the first retry. Default: 1s.
    pub initial_delay: Duration,
    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,
    /// Maximum retries before giving up. `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

impl ReconnectPolicy {
    /// Backoff delay for the given attempt.
    ///
    /// `delay = min(initial * 2^attempt, max) + jitter`, with the
    /// jitter deterministically derived from the attempt number so
    /// retry schedules stay reproducible in tests.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * 2.0_f64.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
        let capped = base.min(self.max_delay.as_secs_f64());

        let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
        Duration::from_secs_f64((capped * jitter_factor).max(0.0))
    }
}

/// Drive a scope connect operation under a retry policy.
///
/// `connect` starts (or restarts) a session and returns its state
/// receiver; `supervise` waits for the session to reach a terminal
/// state and decides what happens next:
///   - `Cancelled` stops supervision immediately (never retried),
///   - `Ended` reconnects with the attempt counter reset; sessions that
///     end within `initial_delay` of connecting wait out that floor
///     first so an immediately-closing server cannot cause a spin,
///   - `Failed` retries after backoff, bounded by `max_retries`.
pub async fn supervise<F, Fut>(policy: ReconnectPolicy, cancel: CancellationToken, mut connect: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<watch::Receiver<SessionState>, CoreError>>,
{
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return;
        }

        match connect().await {
            Ok(mut state) => {
                let connected_at = tokio::time::Instant::now();
                let terminal = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return,
                    result = state.wait_for(SessionState::is_terminal) => match result {
                        Ok(terminal) => (*terminal).clone(),
                        // Sender dropped without a terminal state: the
                        // session owner went away, nothing to supervise.
                        Err(_) => return,
                    },
                };

                match terminal {
                    SessionState::Cancelled => return,
                    SessionState::Ended => {
                        info!("session ended cleanly, reconnecting");
                        attempt = 0;
                        // A clean end skips backoff, but a server that
                        // closes right after accepting would otherwise
                        // produce a zero-delay reconnect spin.
                        if connected_at.elapsed() < policy.initial_delay {
                            tokio::select! {
                                biased;
                                () = cancel.cancelled() => return,
                                () = tokio::time::sleep(policy.initial_delay) => {}
                            }
                        }
                    }
                    SessionState::Failed { message } => {
                        warn!(attempt, error = %message, "session failed");
                        if !backoff(&policy, &cancel, &mut attempt).await {
                            return;
                        }
                    }
                    SessionState::Idle | SessionState::Connecting | SessionState::Streaming => {
                        // wait_for only yields terminal states.
                        return;
                    }
                }
            }
            Err(e) => {
                warn!(attempt, error = %e, "session connect failed");
                if !backoff(&policy, &cancel, &mut attempt).await {
                    return;
                }
            }
        }
    }
}

/// Sleep out the backoff for the current attempt. Returns `false` when
/// the retry budget is exhausted or supervision was cancelled.
async fn backoff(policy: &ReconnectPolicy, cancel: &CancellationToken, attempt: &mut u32) -> bool {
    if let Some(max) = policy.max_retries {
        if *attempt >= max {
            warn!(max_retries = max, "retry limit reached, giving up");
            return false;
        }
    }

    let delay = policy.delay_for(*attempt);
    info!(delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), attempt = *attempt, "waiting before reconnect");

    let slept = tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(delay) => true,
    };

    *attempt += 1;
    slept
}

// ── Tests ────────────────────────────────────────────────────────────
