//! Store statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics for store operations.
///
/// All counters are atomic and can be safely accessed from multiple threads.
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Number of record puts.
    records_put: AtomicU64,
    /// Number of deletes that removed a record.
    records_deleted: AtomicU64,
    /// Number of record lookups that found a record.
    record_hits: AtomicU64,
    /// Number of record lookups that found nothing.
    record_misses: AtomicU64,
    /// Number of resource set replacements.
    resource_sets_stored: AtomicU64,
    /// Number of resource reads.
    resource_reads: AtomicU64,
}

impl CacheStats {
    /// Create new statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a put.
    #[inline]
    pub fn record_put(&self) {
        self.records_put.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a delete that removed something.
    #[inline]
    pub fn record_delete(&self) {
        self.records_deleted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a lookup hit.
    #[inline]
    pub fn record_hit(&self) {
        self.record_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a lookup miss.
    #[inline]
    pub fn record_miss(&self) {
        self.record_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a resource set replacement.
    #[inline]
    pub fn record_resources_stored(&self) {
        self.resource_sets_stored.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a resource read.
    #[inline]
    pub fn record_resource_read(&self) {
        self.resource_reads.fetch_add(1, Ordering::Relaxed);
    }

    /// Total puts.
    #[inline]
    pub fn records_put(&self) -> u64 {
        self.records_put.load(Ordering::Relaxed)
    }

    /// Total deletes that removed a record.
    #[inline]
    pub fn records_deleted(&self) -> u64 {
        self.records_deleted.load(Ordering::Relaxed)
    }

    /// Total lookup hits.
    #[inline]
    pub fn record_hits(&self) -> u64 {
        self.record_hits.load(Ordering::Relaxed)
    }

    /// Total lookup misses.
    #[inline]
    pub fn record_misses(&self) -> u64 {
        self.record_misses.load(Ordering::Relaxed)
    }

    /// Total resource set replacements.
    #[inline]
    pub fn resource_sets_stored(&self) -> u64 {
        self.resource_sets_stored.load(Ordering::Relaxed)
    }

    /// Total resource reads.
    #[inline]
    pub fn resource_reads(&self) -> u64 {
        self.resource_reads.load(Ordering::Relaxed)
    }

    /// Calculate record lookup hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.record_hits() as f64;
        let total = hits + self.record_misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    /// Reset all statistics.
    pub fn reset(&self) {
        self.records_put.store(0, Ordering::Relaxed);
        self.records_deleted.store(0, Ordering::Relaxed);
        self.record_hits.store(0, Ordering::Relaxed);
        self.record_misses.store(0, Ordering::Relaxed);
        self.resource_sets_stored.store(0, Ordering::Relaxed);
        self.resource_reads.store(0, Ordering::Relaxed);
    }
}
