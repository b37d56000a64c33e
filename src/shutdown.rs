use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::inflight::InflightTracker;
use crate::server;

#[derive(Error, Debug)]
pub enum ShutdownError {
    #[error("listener failed to close within {0:?}")]
    ListenerClose(Duration),
}

/// Single-shot broadcast that cancels inflight request handlers. Firing is
/// idempotent and monotonic; handlers observe it cooperatively through
/// derived child tokens.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Request-scoped observation handle for one handler invocation.
    pub fn subscribe(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn fire(&self) {
        self.token.cancel();
    }

    pub fn is_fired(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    Idle,
    Draining,
    Completed,
    ForcedAbort,
    ListenerClosing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// All inflight requests finished within the grace period.
    Completed,
    /// The grace period expired and the cancellation signal was fired.
    ForcedAbort,
}

impl From<DrainOutcome> for DrainState {
    fn from(outcome: DrainOutcome) -> Self {
        match outcome {
            DrainOutcome::Completed => DrainState::Completed,
            DrainOutcome::ForcedAbort => DrainState::ForcedAbort,
        }
    }
}

/// One-shot drain episode. Races the inflight tracker against the grace
/// period, fires the cancellation signal on timeout, then closes the listener
/// bounded by its own deadline.
#[derive(Debug, Clone)]
pub struct Drain {
    signal: ShutdownSignal,
    tracker: InflightTracker,
    grace: Duration,
    close_timeout: Duration,
    triggered: Arc<AtomicBool>,
    state: Arc<watch::Sender<DrainState>>,
}

impl Drain {
    pub fn new(
        signal: ShutdownSignal,
        tracker: InflightTracker,
        grace: Duration,
        close_timeout: Duration,
    ) -> Self {
        let (state, _) = watch::channel(DrainState::Idle);
        Self {
            signal,
            tracker,
            grace,
            close_timeout,
            triggered: Arc::new(AtomicBool::new(false)),
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> watch::Receiver<DrainState> {
        self.state.subscribe()
    }

    /// Wait for inflight requests to finish or the grace period to expire,
    /// firing the cancellation signal in the latter case. Returns `None` when
    /// a drain is already in progress; duplicate triggers are swallowed.
    pub async fn decide(&self) -> Option<DrainOutcome> {
        if self.triggered.swap(true, Ordering::SeqCst) {
            debug!("drain already in progress, ignoring trigger");
            return None;
        }
        self.state.send_replace(DrainState::Draining);
        info!(
            inflight = self.tracker.count(),
            grace_secs = self.grace.as_secs(),
            "start drain, waiting for inflight requests"
        );

        let outcome = tokio::select! {
            _ = self.tracker.wait_idle() => {
                info!("all inflight requests finished within grace period");
                DrainOutcome::Completed
            }
            _ = tokio::time::sleep(self.grace) => {
                warn!(
                    inflight = self.tracker.count(),
                    "grace period expired, cancelling inflight requests"
                );
                self.signal.fire();
                DrainOutcome::ForcedAbort
            }
        };
        self.state.send_replace(outcome.into());
        Some(outcome)
    }

    /// Run the full episode: decide the drain outcome, then stop the listener
    /// and close remaining connections bounded by the close deadline. Failure
    /// of the bounded close is fatal and not retried.
    pub async fn run(
        &self,
        server: &server::Server,
    ) -> Result<Option<DrainOutcome>, ShutdownError> {
        let Some(outcome) = self.decide().await else {
            return Ok(None);
        };

        self.state.send_replace(DrainState::ListenerClosing);
        server.stop_accepting();
        debug!(
            close_secs = self.close_timeout.as_secs(),
            "closing remaining connections"
        );
        if !server.close_bounded(self.close_timeout).await {
            return Err(ShutdownError::ListenerClose(self.close_timeout));
        }

        self.state.send_replace(DrainState::Closed);
        info!("listener closed");
        Ok(Some(outcome))
    }
}
