//! The configuration source seam.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use xds_core::{ApiConfigRecord, ResourceBundle, XdsResult};

/// A pluggable source of truth for API configuration.
///
/// The adapter owns its own state (connections, caches of its own) and is
/// shared as `Arc<dyn Adapter>`. Calls for different clusters may run
/// concurrently, for example when several nodes in one process share an
/// adapter.
#[async_trait]
pub trait Adapter: Send + Sync + 'static {
    /// Prepare the adapter. Called once, before bootstrap.
    async fn init(&self) -> XdsResult<()> {
        Ok(())
    }

    /// Read every record the source knows about.
    ///
    /// The outer error means the source could not be read at all and
    /// fails startup. Inner errors are per-record and are skipped.
    async fn bootstrap_all(&self) -> XdsResult<Vec<XdsResult<ApiConfigRecord>>>;

    /// Fetch the current config for one API.
    ///
    /// `Ok(None)` means the source no longer has it.
    async fn get_api_config(&self, cluster: &str, api_id: &str)
        -> XdsResult<Option<ApiConfigRecord>>;

    /// Build the full resource set for a cluster from its current records.
    ///
    /// `records` is every record the cache holds for `cluster`, sorted by
    /// api id. `changed` names the api ids that triggered this pass; it
    /// is a hint only and the result must cover all of `records`.
    async fn generate(
        &self,
        cluster: &str,
        records: &[Arc<ApiConfigRecord>],
        changed: &BTreeSet<String>,
    ) -> XdsResult<ResourceBundle>;
}
