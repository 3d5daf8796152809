//! Waiting for proxies to catch up.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};
use xds_core::{XdsError, XdsResult};

use crate::delivery::DeliveryStream;
use crate::metrics::SyncMetrics;
use crate::shutdown::ShutdownController;

/// Blocks until a cluster's proxies acknowledge the latest resources.
///
/// Polls [`DeliveryStream::is_in_sync`] at a fixed interval. The wait ends
/// with [`XdsError::Timeout`] once the configured limit passes and with
/// [`XdsError::Shutdown`] when the node shuts down.
#[derive(Clone)]
pub struct SyncBarrier {
    stream: Arc<dyn DeliveryStream>,
    poll_interval: Duration,
    timeout: Option<Duration>,
    shutdown: ShutdownController,
    metrics: SyncMetrics,
}

impl std::fmt::Debug for SyncBarrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncBarrier")
            .field("poll_interval", &self.poll_interval)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl SyncBarrier {
    /// Create a barrier over `stream`.
    pub fn new(
        stream: Arc<dyn DeliveryStream>,
        poll_interval: Duration,
        timeout: Option<Duration>,
        shutdown: ShutdownController,
        metrics: SyncMetrics,
    ) -> Self {
        Self {
            stream,
            poll_interval,
            timeout,
            shutdown,
            metrics,
        }
    }

    /// Wait for `cluster` using the configured limit.
    pub async fn wait_until_in_sync(&self, cluster: &str) -> XdsResult<()> {
        self.wait_with_limit(cluster, self.timeout).await
    }

    /// Wait for `cluster` with an explicit limit. `None` waits forever.
    pub async fn wait_with_limit(&self, cluster: &str, limit: Option<Duration>) -> XdsResult<()> {
        let start = Instant::now();

        let result = match limit {
            Some(limit) => match tokio::time::timeout(limit, self.wait_cancellable(cluster)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(cluster, limit = ?limit, "proxies did not sync in time");
                    self.metrics.record_barrier_timeout();
                    Err(XdsError::Timeout {
                        operation: format!("sync of cluster {cluster}"),
                    })
                }
            },
            None => self.wait_cancellable(cluster).await,
        };

        let waited = start.elapsed();
        self.metrics.record_barrier_wait(waited);
        if result.is_ok() {
            debug!(cluster, waited_ms = waited.as_millis() as u64, "cluster in sync");
        }
        result
    }

    async fn wait_cancellable(&self, cluster: &str) -> XdsResult<()> {
        if self.shutdown.is_shutdown() {
            return Err(XdsError::Shutdown);
        }
        tokio::select! {
            () = self.shutdown.shutdown_signal() => Err(XdsError::Shutdown),
            () = self.poll(cluster) => Ok(()),
        }
    }

    async fn poll(&self, cluster: &str) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if self.stream.is_in_sync(cluster) {
                return;
            }
            trace!(cluster, "waiting for proxies");
        }
    }
}
