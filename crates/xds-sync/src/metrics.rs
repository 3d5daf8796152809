//! Metrics for the cache actor and the replication layer.
//!
//! Recorded through the `metrics` facade, so any installed recorder
//! (Prometheus or otherwise) picks them up:
//!
//! - batch, event and fetch-failure counters
//! - regeneration counters and latency histogram
//! - per-type notification counters
//! - replication and sync barrier outcomes

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use xds_core::{EventKind, ResourceType};

/// Metrics for one cache node.
///
/// Cheap to clone; clones share the local counters.
#[derive(Debug, Clone, Default)]
pub struct SyncMetrics {
    inner: Arc<SyncMetricsInner>,
}

#[derive(Debug, Default)]
struct SyncMetricsInner {
    /// Batches applied by the local actor.
    batches: AtomicU64,
    /// Regeneration passes completed.
    regenerations: AtomicU64,
    /// Events skipped because the source failed.
    fetch_failures: AtomicU64,
    /// Submits that ended in partial replication.
    partial_replications: AtomicU64,
}

impl SyncMetrics {
    /// Create a new metrics instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event being applied.
    pub fn record_event(&self, kind: EventKind) {
        counter!("xds_sync_events_total", "kind" => kind.as_str()).increment(1);
    }

    /// Record a batch fully applied.
    pub fn record_batch(&self, events: usize) {
        self.inner.batches.fetch_add(1, Ordering::Relaxed);
        counter!("xds_sync_batches_total").increment(1);
        histogram!("xds_sync_batch_size").record(events as f64);
    }

    /// Record an event skipped because its config could not be fetched.
    pub fn record_fetch_failure(&self) {
        self.inner.fetch_failures.fetch_add(1, Ordering::Relaxed);
        counter!("xds_sync_fetch_failures_total").increment(1);
    }

    /// Record a completed regeneration.
    pub fn record_regeneration(&self, latency: Duration, resources: usize) {
        self.inner.regenerations.fetch_add(1, Ordering::Relaxed);
        counter!("xds_sync_regenerations_total").increment(1);
        histogram!("xds_sync_generation_latency_ms").record(latency.as_secs_f64() * 1000.0);
        histogram!("xds_sync_generated_resources").record(resources as f64);
    }

    /// Record a hash notification sent to the delivery stream.
    pub fn record_notification(&self, resource_type: ResourceType) {
        counter!("xds_sync_notifications_total", "type_url" => resource_type.type_url())
            .increment(1);
    }

    /// Record the number of records held by the store.
    pub fn set_records(&self, count: usize) {
        gauge!("xds_sync_records").set(count as f64);
    }

    /// Record a submit that could not reach every node.
    pub fn record_partial_replication(&self, failed_nodes: usize) {
        self.inner.partial_replications.fetch_add(1, Ordering::Relaxed);
        counter!("xds_sync_replication_partial_total").increment(1);
        histogram!("xds_sync_replication_failed_nodes").record(failed_nodes as f64);
    }

    /// Record a finished sync barrier wait.
    pub fn record_barrier_wait(&self, waited: Duration) {
        histogram!("xds_sync_barrier_wait_ms").record(waited.as_secs_f64() * 1000.0);
    }

    /// Record a sync barrier wait that hit its deadline.
    pub fn record_barrier_timeout(&self) {
        counter!("xds_sync_barrier_timeouts_total").increment(1);
    }

    /// Batches applied so far.
    pub fn batches(&self) -> u64 {
        self.inner.batches.load(Ordering::Relaxed)
    }

    /// Regenerations completed so far.
    pub fn regenerations(&self) -> u64 {
        self.inner.regenerations.load(Ordering::Relaxed)
    }

    /// Events skipped on fetch failure so far.
    pub fn fetch_failures(&self) -> u64 {
        self.inner.fetch_failures.load(Ordering::Relaxed)
    }

    /// Partial replications so far.
    pub fn partial_replications(&self) -> u64 {
        self.inner.partial_replications.load(Ordering::Relaxed)
    }
}
