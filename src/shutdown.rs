//! Signal intake, in-flight draining, ordered cleanup (spec.md §4.9).
//!
//! The in-flight counter mirrors the teacher's `CancellationManager`,
//! whose `Debug` impl reports `active_tokens` by locking its map and
//! counting it; here the count is a plain atomic since all we need is
//! cardinality, not the entries themselves (spec.md §5: "a concurrent set
//! with atomic cardinality").

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::session::lifecycle::LifecycleManager;

/// Default drain timeout (spec.md §4.9: "bounded by a configurable
/// timeout (default 30 s)").
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Polling granularity while waiting for in-flight requests to drain
/// (spec.md §4.9: "Polling granularity ≤100 ms").
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

type CleanupHandler = Box<dyn Fn() -> Result<(), String> + Send + Sync>;

/// RAII guard incrementing/decrementing the in-flight counter.
pub struct InFlightGuard {
    counter: Arc<AtomicUsize>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct ShutdownCoordinator {
    lifecycle: Arc<LifecycleManager>,
    in_flight: Arc<AtomicUsize>,
    shutting_down: Arc<AtomicBool>,
    cleanup_handlers: std::sync::Mutex<Vec<(String, CleanupHandler)>>,
    drain_timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(lifecycle: Arc<LifecycleManager>) -> Self {
        Self::with_drain_timeout(lifecycle, DEFAULT_DRAIN_TIMEOUT)
    }

    pub fn with_drain_timeout(lifecycle: Arc<LifecycleManager>, drain_timeout: Duration) -> Self {
        Self {
            lifecycle,
            in_flight: Arc::new(AtomicUsize::new(0)),
            shutting_down: Arc::new(AtomicBool::new(false)),
            cleanup_handlers: std::sync::Mutex::new(Vec::new()),
            drain_timeout,
        }
    }

    /// Track one in-flight request/stream. Rejected once shutdown has
    /// begun (spec.md §4.9 step 1: "new requests rejected").
    pub fn begin_request(&self) -> Option<InFlightGuard> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return None;
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        Some(InFlightGuard { counter: self.in_flight.clone() })
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Register a cleanup handler, run in registration order on shutdown.
    /// Must be idempotent and must not abort the sequence on error
    /// (spec.md §4.9 step 3).
    pub fn register_cleanup<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn() -> Result<(), String> + Send + Sync + 'static,
    {
        self.cleanup_handlers.lock().unwrap().push((name.into(), Box::new(handler)));
    }

    /// Run the full shutdown sequence once. A second concurrent call is a
    /// no-op (the "second signal forces immediate exit" behaviour in
    /// spec.md step 4 is the caller's responsibility — this method
    /// expresses the orderly path).
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            warn!("shutdown already in progress");
            return;
        }

        info!("beginning graceful shutdown");
        self.lifecycle.begin_shutdown();

        let deadline = tokio::time::Instant::now() + self.drain_timeout;
        while self.in_flight_count() > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
        if self.in_flight_count() > 0 {
            warn!(remaining = self.in_flight_count(), "drain timeout elapsed with requests still in flight");
        }

        let handlers: Vec<(String, CleanupHandler)> = {
            let mut guard = self.cleanup_handlers.lock().unwrap();
            std::mem::take(&mut *guard)
        };
        for (name, handler) in &handlers {
            if let Err(err) = handler() {
                error!(handler = %name, error = %err, "cleanup handler failed, continuing");
            }
        }

        for session_id in self.lifecycle.session_ids() {
            self.lifecycle.close(&session_id);
        }
        info!("shutdown complete");
    }
}
