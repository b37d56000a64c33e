use tokio::sync::watch;
use tracing::trace;

/// Counter of in-flight long-running requests. Owned by the server and passed
/// by reference to request-handling code, never a global.
#[derive(Debug, Clone)]
pub struct InflightTracker {
    count: watch::Sender<usize>,
}

/// Decrements the tracker on drop, so handler panics and early returns still
/// deregister exactly once.
#[derive(Debug)]
pub struct InflightGuard {
    count: watch::Sender<usize>,
}

impl InflightTracker {
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self { count }
    }

    /// Register one in-flight operation. Must be called before starting any
    /// work that should block shutdown.
    pub fn enter(&self) -> InflightGuard {
        self.count.send_modify(|n| *n += 1);
        trace!(inflight = *self.count.borrow(), "request entered tracker");
        InflightGuard {
            count: self.count.clone(),
        }
    }

    pub fn count(&self) -> usize {
        *self.count.borrow()
    }

    /// Resolves once the count reaches zero, immediately if already zero.
    pub async fn wait_idle(&self) {
        let mut rx = self.count.subscribe();
        // wait_for checks the current value before suspending
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

impl Default for InflightTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        // saturating: a guard can only ever undo its own increment
        self.count.send_modify(|n| *n = n.saturating_sub(1));
        trace!(inflight = *self.count.borrow(), "request left tracker");
    }
}
