//! ConfigStore: the two keyed tables of the cache.
//!
//! One table holds the latest [`ApiConfigRecord`] per `(cluster, api_id)`,
//! the other the latest generated [`ResourceSet`] per `(cluster, type)`.
//! Both use `DashMap` so readers never wait on the cache actor.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, trace};
use xds_core::{ApiConfigRecord, BoxResource, ContentHash, ResourceSet, ResourceType, XdsResult};

use crate::stats::CacheStats;

type RecordKey = (String, String);
type ResourceKey = (String, ResourceType);

/// Concurrent configuration and resource tables.
///
/// ## Thread Safety
///
/// Every operation is safe to call concurrently. Values are stored behind
/// `Arc` and replaced whole, so a reader sees either the old or the new
/// value, never a mix.
///
/// Mutations are expected to come from a single writer per node (the cache
/// actor). The store does not enforce this; it only guarantees per-key
/// atomicity.
///
/// ## Important
///
/// No `DashMap` reference is held while user code runs: folds collect the
/// matching records first and call the closure afterwards.
#[derive(Debug)]
pub struct ConfigStore {
    /// Latest record per `(cluster, api_id)`.
    configs: DashMap<RecordKey, Arc<ApiConfigRecord>>,
    /// Latest generated resources per `(cluster, type)`.
    resources: DashMap<ResourceKey, ResourceSet>,
    /// Statistics.
    stats: CacheStats,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    /// Create an empty store sized for `capacity` records.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            configs: DashMap::with_capacity(capacity),
            resources: DashMap::with_capacity(capacity),
            stats: CacheStats::new(),
        }
    }

    /// Get store statistics.
    #[inline]
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Insert a record, replacing any record with the same key.
    pub fn put(&self, record: ApiConfigRecord) {
        let key = (record.cluster().to_string(), record.api_id().to_string());
        debug!(
            cluster = %record.cluster(),
            api_id = %record.api_id(),
            hash = %record.content_hash(),
            "put api config"
        );
        self.configs.insert(key, Arc::new(record));
        self.stats.record_put();
    }

    /// Remove a record. Removing an absent record does nothing.
    ///
    /// Returns the removed record, if there was one.
    pub fn delete(&self, cluster: &str, api_id: &str) -> Option<Arc<ApiConfigRecord>> {
        let removed = self
            .configs
            .remove(&(cluster.to_string(), api_id.to_string()))
            .map(|(_, record)| record);

        if removed.is_some() {
            self.stats.record_delete();
            debug!(cluster = %cluster, api_id = %api_id, "deleted api config");
        } else {
            trace!(cluster = %cluster, api_id = %api_id, "delete of absent api config");
        }

        removed
    }

    /// Look up a record.
    pub fn get(&self, cluster: &str, api_id: &str) -> Option<Arc<ApiConfigRecord>> {
        // Clone the Arc and drop the Ref immediately.
        let result = self
            .configs
            .get(&(cluster.to_string(), api_id.to_string()))
            .map(|r| Arc::clone(&*r));

        if result.is_some() {
            self.stats.record_hit();
            trace!(cluster = %cluster, api_id = %api_id, "record hit");
        } else {
            self.stats.record_miss();
            trace!(cluster = %cluster, api_id = %api_id, "record miss");
        }

        result
    }

    /// Accumulate a value over every record of a cluster, in unspecified order.
    ///
    /// The records are collected before `f` runs, so `f` may call back into
    /// the store. Concurrent writes may or may not be visible.
    pub fn fold_by_cluster<B, F>(&self, cluster: &str, init: B, mut f: F) -> B
    where
        F: FnMut(B, &ApiConfigRecord) -> B,
    {
        self.cluster_records(cluster)
            .iter()
            .fold(init, |acc, record| f(acc, record.as_ref()))
    }

    /// All records of a cluster, ordered by api id.
    pub fn cluster_records(&self, cluster: &str) -> Vec<Arc<ApiConfigRecord>> {
        let mut records: Vec<Arc<ApiConfigRecord>> = self
            .configs
            .iter()
            .filter(|r| r.key().0 == cluster)
            .map(|r| Arc::clone(r.value()))
            .collect();
        records.sort_by(|a, b| a.api_id().cmp(b.api_id()));
        records
    }

    /// Number of records in a cluster.
    pub fn record_count(&self, cluster: &str) -> usize {
        self.configs.iter().filter(|r| r.key().0 == cluster).count()
    }

    /// Total number of records across all clusters.
    pub fn total_records(&self) -> usize {
        self.configs.len()
    }

    /// Clusters that currently hold at least one record, sorted.
    pub fn clusters(&self) -> Vec<String> {
        let clusters: BTreeSet<String> = self.configs.iter().map(|r| r.key().0.clone()).collect();
        clusters.into_iter().collect()
    }

    /// Replace the stored resources of one `(cluster, type)`.
    pub fn put_resources(
        &self,
        cluster: &str,
        resource_type: ResourceType,
        resources: impl Into<Arc<[BoxResource]>>,
    ) {
        let set = ResourceSet::new(cluster, resource_type, resources);
        debug!(
            cluster = %cluster,
            resource_type = %resource_type,
            resources = set.len(),
            "stored resource set"
        );
        self.resources
            .insert((cluster.to_string(), resource_type), set);
        self.stats.record_resources_stored();
    }

    /// Get the stored resources of one `(cluster, type)`; empty when none
    /// were ever generated.
    pub fn get_resources(&self, cluster: &str, resource_type: ResourceType) -> Arc<[BoxResource]> {
        self.stats.record_resource_read();
        self.resources
            .get(&(cluster.to_string(), resource_type))
            .map(|r| r.shared())
            .unwrap_or_else(|| Arc::from(Vec::new()))
    }

    /// Get the stored resource set of one `(cluster, type)`.
    pub fn get_resource_set(
        &self,
        cluster: &str,
        resource_type: ResourceType,
    ) -> Option<ResourceSet> {
        self.resources
            .get(&(cluster.to_string(), resource_type))
            .map(|r| r.clone())
    }

    /// Hash of the stored resources of one `(cluster, type)`, computed now.
    pub fn resource_hash(
        &self,
        cluster: &str,
        resource_type: ResourceType,
    ) -> XdsResult<ContentHash> {
        ContentHash::of_resources(&self.get_resources(cluster, resource_type))
    }
}
