//! Publishing regenerated resources.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::trace;
use xds_cache::ConfigStore;
use xds_core::{ContentHash, ResourceBundle, ResourceType, XdsResult};

use crate::delivery::DeliveryStream;
use crate::metrics::SyncMetrics;

/// Content hash of each published resource type.
pub type ResourceHashes = BTreeMap<ResourceType, ContentHash>;

/// Stores a cluster's regenerated resources and announces their hashes.
///
/// Every resource type is published on every pass, including types the
/// bundle leaves empty, so stale entries from an earlier pass are replaced.
#[derive(Clone)]
pub struct ChangeNotifier {
    store: Arc<ConfigStore>,
    stream: Arc<dyn DeliveryStream>,
    metrics: SyncMetrics,
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier").finish_non_exhaustive()
    }
}

impl ChangeNotifier {
    /// Create a notifier writing to `store` and announcing on `stream`.
    pub fn new(
        store: Arc<ConfigStore>,
        stream: Arc<dyn DeliveryStream>,
        metrics: SyncMetrics,
    ) -> Self {
        Self {
            store,
            stream,
            metrics,
        }
    }

    /// Publish `bundle` as the complete resource state of `cluster`.
    ///
    /// Every type is hashed before anything is stored, so a resource that
    /// fails to encode leaves the cluster's published state untouched. The
    /// store is updated before the stream hears about a type, so a proxy
    /// reacting to the notification reads the new resources.
    pub fn publish(&self, cluster: &str, mut bundle: ResourceBundle) -> XdsResult<ResourceHashes> {
        let mut staged = Vec::with_capacity(ResourceType::ALL.len());
        for resource_type in ResourceType::ALL {
            let resources = bundle.take(resource_type);
            let hash = ContentHash::of_resources(&resources)?;
            staged.push((resource_type, resources, hash));
        }

        let mut hashes = ResourceHashes::new();
        for (resource_type, resources, hash) in staged {
            self.store.put_resources(cluster, resource_type, resources);
            self.stream.notify(cluster, resource_type, hash);
            self.metrics.record_notification(resource_type);

            trace!(cluster, resource_type = %resource_type, hash = %hash, "notified");
            hashes.insert(resource_type, hash);
        }

        Ok(hashes)
    }
}
