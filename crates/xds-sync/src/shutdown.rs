//! Shutdown coordination for a cache node.
//!
//! A [`ShutdownController`] is shared by the cache actor, the sync barrier
//! and the facade. Triggering it stops the actor loop after its current
//! request, cancels barrier waits, and then waits for in-flight
//! operations (tracked by [`OperationGuard`]) up to a grace period.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

/// Shared shutdown state for one node.
#[derive(Debug, Clone)]
pub struct ShutdownController {
    inner: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    tx: watch::Sender<bool>,
    in_flight: AtomicUsize,
    drained: Notify,
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownController {
    /// Create a controller that has not been triggered.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Shared {
                tx,
                in_flight: AtomicUsize::new(0),
                drained: Notify::new(),
            }),
        }
    }

    /// Receiver that flips to `true` when shutdown starts.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.tx.subscribe()
    }

    /// Whether shutdown has started.
    pub fn is_shutdown(&self) -> bool {
        *self.inner.tx.borrow()
    }

    /// Future resolving once shutdown starts.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        let mut rx = self.subscribe();
        ShutdownSignal {
            fut: Box::pin(async move {
                // A closed channel means the controller is gone, which is
                // as final as a shutdown.
                let _ = rx.wait_for(|stopped| *stopped).await;
            }),
        }
    }

    /// Start shutdown and wait up to `grace_period` for in-flight
    /// operations.
    ///
    /// Returns `false` if operations were still running when the grace
    /// period ran out. A second call returns `true` immediately.
    pub async fn shutdown(&self, grace_period: Duration) -> bool {
        let first = self.inner.tx.send_if_modified(|stopped| {
            let was = *stopped;
            *stopped = true;
            !was
        });
        if !first {
            return true;
        }

        info!(grace_period = ?grace_period, "shutting down cache node");

        match tokio::time::timeout(grace_period, self.drain()).await {
            Ok(()) => {
                info!("cache node shut down cleanly");
                true
            }
            Err(_) => {
                warn!(
                    in_flight = self.active_operations(),
                    "grace period elapsed with operations still running"
                );
                false
            }
        }
    }

    async fn drain(&self) {
        loop {
            let notified = self.inner.drained.notified();
            if self.inner.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Track an operation until the returned guard is dropped.
    pub fn register_operation(&self) -> OperationGuard {
        let count = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(in_flight = count, "operation started");
        OperationGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Number of operations currently tracked.
    pub fn active_operations(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }
}

/// Keeps an operation counted as in flight while alive.
#[derive(Debug)]
pub struct OperationGuard {
    inner: Arc<Shared>,
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        let remaining = self.inner.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining == 0 {
            self.inner.drained.notify_waiters();
        }
    }
}

/// Future returned by [`ShutdownController::shutdown_signal`].
pub struct ShutdownSignal {
    fut: Pin<Box<dyn Future<Output = ()> + Send>>,
}

impl std::fmt::Debug for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownSignal").finish_non_exhaustive()
    }
}

impl Future for ShutdownSignal {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.fut.as_mut().poll(cx)
    }
}
