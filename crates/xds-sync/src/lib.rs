//! # xds-sync
//!
//! Replicated cache pipeline for xDS control planes.
//!
//! Each node runs one [`CacheActor`] that owns all writes to its
//! [`ConfigStore`](xds_cache::ConfigStore). Change events are pure signals:
//! the actor re-reads every changed API config from an [`Adapter`],
//! regenerates the cluster's resources, stores them, and announces their
//! content hashes on a [`DeliveryStream`]. Submitting a batch through
//! [`ControlCache`] replicates it to every node in the [`Membership`] and
//! then waits until the local proxies acknowledge the new resources.
//!
//! - [`ControlCache`] - Facade for one node
//! - [`ControlCacheBuilder`] - Wiring and startup
//! - [`CacheActor`] / [`CacheActorHandle`] - Single-writer loop
//! - [`ReplicationProtocol`] - Cluster-wide fan-out
//! - [`SyncBarrier`] - Wait for proxies to catch up
//! - [`MemoryAdapter`] / [`WatchStream`] - In-process source and delivery
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use xds_core::{ConfigEvent, ResourceType};
//! use xds_sync::{ControlCacheBuilder, MemoryAdapter};
//!
//! let adapter = Arc::new(MemoryAdapter::new());
//! let cache = ControlCacheBuilder::new()
//!     .node_id("node-a")
//!     .adapter(adapter.clone())
//!     .start()
//!     .await?;
//!
//! adapter.upsert("edge", "api1", serde_json::json!({ "listeners": [{ "name": "l1" }] }));
//! let outcome = cache.submit_events("edge", vec![ConfigEvent::created("api1")]).await?;
//! assert!(outcome.is_synced());
//! assert_eq!(cache.get_resources("edge", ResourceType::Listener).len(), 1);
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod actor;
mod adapter;
mod barrier;
mod builder;
mod config;
mod delivery;
mod generator;
mod membership;
mod memory;
mod metrics;
mod notifier;
mod replication;
mod shutdown;
mod watch;

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{debug, info};
use xds_cache::ConfigStore;
use xds_core::{
    ApiConfigRecord, BoxResource, ConfigEvent, NodeId, ResourceType, XdsError, XdsResult,
};

pub use crate::metrics::SyncMetrics;
pub use actor::{
    BatchReport, BootstrapReport, CacheActor, CacheActorHandle, CacheRequest, StartedActor,
};
pub use adapter::Adapter;
pub use barrier::SyncBarrier;
pub use builder::ControlCacheBuilder;
pub use config::SyncConfig;
pub use delivery::DeliveryStream;
pub use generator::ResourceGenerator;
pub use membership::{InMemoryMembership, Membership, NodeReply};
pub use memory::{payload_key, translate, MemoryAdapter};
pub use notifier::{ChangeNotifier, ResourceHashes};
pub use replication::{ReplicationProtocol, SubmitOutcome};
pub use shutdown::{OperationGuard, ShutdownController, ShutdownSignal};
pub use watch::{ResourceChange, Watch, WatchId, WatchStream};

/// One node of the replicated control cache.
///
/// Reads (`get_resources`, `fold_configs`) go straight to the store and
/// never wait on the actor. Writes go through the actor.
pub struct ControlCache {
    node: NodeId,
    store: Arc<ConfigStore>,
    actor: CacheActorHandle,
    actor_task: Mutex<Option<JoinHandle<()>>>,
    membership: Arc<dyn Membership>,
    replication: ReplicationProtocol,
    barrier: SyncBarrier,
    config: SyncConfig,
    metrics: SyncMetrics,
    shutdown: ShutdownController,
    bootstrap: BootstrapReport,
}

impl std::fmt::Debug for ControlCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlCache")
            .field("node", &self.node)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ControlCache {
    /// Start configuring a node.
    pub fn builder() -> ControlCacheBuilder {
        ControlCacheBuilder::new()
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn assemble(
        node: NodeId,
        store: Arc<ConfigStore>,
        started: StartedActor,
        membership: Arc<dyn Membership>,
        replication: ReplicationProtocol,
        barrier: SyncBarrier,
        config: SyncConfig,
        metrics: SyncMetrics,
        shutdown: ShutdownController,
    ) -> Self {
        Self {
            node,
            store,
            actor: started.handle,
            actor_task: Mutex::new(Some(started.task)),
            membership,
            replication,
            barrier,
            config,
            metrics,
            shutdown,
            bootstrap: started.bootstrap,
        }
    }

    /// Submit a batch of events for `cluster` to every node.
    ///
    /// Resolves once all nodes applied the batch and the local proxies are
    /// in sync, or with [`SubmitOutcome::PartialFailure`] as soon as some
    /// node failed to acknowledge.
    pub async fn submit_events(
        &self,
        cluster: &str,
        events: Vec<ConfigEvent>,
    ) -> XdsResult<SubmitOutcome> {
        let _guard = self.begin()?;
        debug!(node = %self.node, cluster, events = events.len(), "submitting events");
        self.replication.submit(cluster, events).await
    }

    /// Insert a record on this node only, regenerate its cluster and wait
    /// for the local proxies to sync.
    ///
    /// Mark the record [`retained`](ApiConfigRecord::retained) to keep it
    /// when the source does not know it.
    pub async fn load_single(
        &self,
        cluster: &str,
        record: ApiConfigRecord,
    ) -> XdsResult<BatchReport> {
        let _guard = self.begin()?;
        if record.cluster() != cluster {
            return Err(XdsError::Configuration(format!(
                "record {} belongs to cluster {}, not {cluster}",
                record.api_id(),
                record.cluster()
            )));
        }
        let report = self.actor.load_single(record).await?;
        self.barrier.wait_until_in_sync(cluster).await?;
        Ok(report)
    }

    /// Regenerate `cluster` from its stored records and wait for sync.
    pub async fn resync(&self, cluster: &str) -> XdsResult<BatchReport> {
        let _guard = self.begin()?;
        let report = self.actor.resync(cluster).await?;
        self.barrier.wait_until_in_sync(cluster).await?;
        Ok(report)
    }

    /// Wait until the local proxies of `cluster` are in sync.
    pub async fn wait_until_in_sync(&self, cluster: &str) -> XdsResult<()> {
        let _guard = self.begin()?;
        self.barrier.wait_until_in_sync(cluster).await
    }

    /// Current resources of one type for a cluster. Empty if none.
    pub fn get_resources(&self, cluster: &str, resource_type: ResourceType) -> Arc<[BoxResource]> {
        self.store.get_resources(cluster, resource_type)
    }

    /// Fold over the records of a cluster in api id order.
    pub fn fold_configs<B, F>(&self, cluster: &str, init: B, f: F) -> B
    where
        F: FnMut(B, &ApiConfigRecord) -> B,
    {
        self.store.fold_by_cluster(cluster, init, f)
    }

    /// This node's id.
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// The node's store.
    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    /// Handle to the node's cache actor.
    pub fn actor(&self) -> &CacheActorHandle {
        &self.actor
    }

    /// Current members of the cluster.
    pub fn members(&self) -> Vec<NodeId> {
        self.membership.members()
    }

    /// The configuration the node runs with.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The node's metrics.
    pub fn metrics(&self) -> &SyncMetrics {
        &self.metrics
    }

    /// What the startup load did.
    pub fn bootstrap_report(&self) -> &BootstrapReport {
        &self.bootstrap
    }

    /// The node's shutdown controller.
    pub fn shutdown_controller(&self) -> &ShutdownController {
        &self.shutdown
    }

    /// Leave the membership, stop the actor and wait for in-flight
    /// operations.
    ///
    /// Returns `false` if operations were still running when the grace
    /// period ran out.
    pub async fn shutdown(&self) -> bool {
        self.membership.leave(&self.node);
        let graceful = self.shutdown.shutdown(self.config.shutdown_grace_period).await;

        let task = self.actor_task.lock().ok().and_then(|mut task| task.take());
        if let Some(task) = task {
            if let Err(err) = task.await {
                tracing::warn!(node = %self.node, error = %err, "cache actor task failed");
            }
        }

        info!(node = %self.node, graceful, "control cache stopped");
        graceful
    }

    fn begin(&self) -> XdsResult<OperationGuard> {
        if self.shutdown.is_shutdown() {
            return Err(XdsError::Shutdown);
        }
        Ok(self.shutdown.register_operation())
    }
}
