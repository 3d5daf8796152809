//! The delivery seam towards data-plane proxies.

use xds_core::{ContentHash, ResourceType};

/// Pushes resource changes to proxies and reports their sync state.
pub trait DeliveryStream: Send + Sync + 'static {
    /// Announce a new content hash for `(cluster, resource_type)`.
    ///
    /// Must not block; delivery happens in the background.
    fn notify(&self, cluster: &str, resource_type: ResourceType, hash: ContentHash);

    /// Whether every proxy of `cluster` has acknowledged the latest hashes.
    fn is_in_sync(&self, cluster: &str) -> bool;
}
