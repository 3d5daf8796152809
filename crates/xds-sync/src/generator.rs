//! Resource regeneration.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error};
use xds_cache::ConfigStore;
use xds_core::{ResourceBundle, XdsError, XdsResult};

use crate::adapter::Adapter;
use crate::metrics::SyncMetrics;

/// Turns a cluster's stored records into a validated [`ResourceBundle`].
///
/// Every failure is reported as [`XdsError::GenerationFailed`], which the
/// cache actor treats as fatal.
#[derive(Clone)]
pub struct ResourceGenerator {
    adapter: Arc<dyn Adapter>,
    store: Arc<ConfigStore>,
    metrics: SyncMetrics,
}

impl std::fmt::Debug for ResourceGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceGenerator").finish_non_exhaustive()
    }
}

impl ResourceGenerator {
    /// Create a generator over `store` using `adapter` for translation.
    pub fn new(adapter: Arc<dyn Adapter>, store: Arc<ConfigStore>, metrics: SyncMetrics) -> Self {
        Self {
            adapter,
            store,
            metrics,
        }
    }

    /// Generate the full resource bundle for `cluster`.
    pub async fn generate(
        &self,
        cluster: &str,
        changed: &BTreeSet<String>,
    ) -> XdsResult<ResourceBundle> {
        let records = self.store.cluster_records(cluster);
        let start = Instant::now();

        let bundle = self
            .adapter
            .generate(cluster, &records, changed)
            .await
            .and_then(|bundle| bundle.validate().map(|()| bundle))
            .map_err(|err| {
                error!(cluster, error = %err, "resource generation failed");
                generation_failed(cluster, err)
            })?;

        let elapsed = start.elapsed();
        self.metrics
            .record_regeneration(elapsed, bundle.total_resources());
        debug!(
            cluster,
            records = records.len(),
            changed = changed.len(),
            resources = bundle.total_resources(),
            elapsed_us = elapsed.as_micros() as u64,
            "generated resources"
        );

        Ok(bundle)
    }
}

/// Wrap any error as a generation failure for `cluster`.
pub(crate) fn generation_failed(cluster: &str, err: XdsError) -> XdsError {
    match err {
        err @ XdsError::GenerationFailed { .. } => err,
        other => XdsError::GenerationFailed {
            cluster: cluster.to_string(),
            message: other.to_string(),
        },
    }
}
