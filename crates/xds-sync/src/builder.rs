//! Builder for a [`ControlCache`] node.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use xds_cache::ConfigStore;
use xds_core::{NodeId, XdsError, XdsResult};

use crate::actor::CacheActor;
use crate::adapter::Adapter;
use crate::barrier::SyncBarrier;
use crate::config::SyncConfig;
use crate::delivery::DeliveryStream;
use crate::membership::{InMemoryMembership, Membership};
use crate::metrics::SyncMetrics;
use crate::replication::ReplicationProtocol;
use crate::shutdown::ShutdownController;
use crate::watch::WatchStream;
use crate::ControlCache;

/// Builder for a [`ControlCache`].
///
/// # Example
///
/// ```rust,ignore
/// use xds_sync::{ControlCacheBuilder, MemoryAdapter, WatchStream};
/// use std::sync::Arc;
///
/// let cache = ControlCacheBuilder::new()
///     .node_id("node-a")
///     .adapter(Arc::new(MemoryAdapter::new()))
///     .stream(Arc::new(WatchStream::new()))
///     .start()
///     .await?;
/// ```
#[derive(Default)]
pub struct ControlCacheBuilder {
    node: Option<NodeId>,
    adapter: Option<Arc<dyn Adapter>>,
    stream: Option<Arc<dyn DeliveryStream>>,
    membership: Option<Arc<dyn Membership>>,
    store: Option<Arc<ConfigStore>>,
    config: SyncConfig,
}

impl std::fmt::Debug for ControlCacheBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlCacheBuilder")
            .field("node", &self.node)
            .field("has_adapter", &self.adapter.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ControlCacheBuilder {
    /// Create a builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set this node's id. Defaults to [`NodeId::local`].
    pub fn node_id(mut self, node: impl Into<NodeId>) -> Self {
        self.node = Some(node.into());
        self
    }

    /// Set the configuration source.
    ///
    /// This is required.
    pub fn adapter(mut self, adapter: Arc<dyn Adapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Set the delivery stream.
    ///
    /// Defaults to an auto-acknowledging [`WatchStream`].
    pub fn stream(mut self, stream: Arc<dyn DeliveryStream>) -> Self {
        self.stream = Some(stream);
        self
    }

    /// Set the membership this node joins.
    ///
    /// Defaults to a membership holding only this node.
    pub fn membership(mut self, membership: Arc<dyn Membership>) -> Self {
        self.membership = Some(membership);
        self
    }

    /// Use an existing store.
    pub fn store(mut self, store: Arc<ConfigStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the actor mailbox capacity.
    pub fn mailbox_capacity(mut self, capacity: usize) -> Self {
        self.config.mailbox_capacity = capacity;
        self
    }

    /// Set the per-node acknowledgement timeout.
    pub fn ack_timeout(mut self, timeout: Duration) -> Self {
        self.config.ack_timeout = timeout;
        self
    }

    /// Set the sync barrier poll interval.
    pub fn sync_poll_interval(mut self, interval: Duration) -> Self {
        self.config.sync_poll_interval = interval;
        self
    }

    /// Bound sync barrier waits. `None` waits forever.
    pub fn sync_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.sync_timeout = timeout;
        self
    }

    /// Regenerate resources for delete-only batches.
    pub fn regenerate_on_delete(mut self, enabled: bool) -> Self {
        self.config.regenerate_on_delete = enabled;
        self
    }

    /// Set how long shutdown waits for in-flight operations.
    pub fn shutdown_grace_period(mut self, period: Duration) -> Self {
        self.config.shutdown_grace_period = period;
        self
    }

    /// Bootstrap the store, start the cache actor and join the membership.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No adapter was provided or the configuration is invalid
    /// - The adapter fails to initialize or bootstrap
    /// - Resources cannot be generated for a bootstrapped cluster
    pub async fn start(self) -> XdsResult<ControlCache> {
        let adapter = self
            .adapter
            .ok_or_else(|| XdsError::Configuration("adapter is required".into()))?;
        self.config.validate()?;

        let node = self.node.unwrap_or_default();
        let store = self.store.unwrap_or_else(|| Arc::new(ConfigStore::new()));
        let stream = self
            .stream
            .unwrap_or_else(|| Arc::new(WatchStream::auto_acknowledging()));
        let membership = self
            .membership
            .unwrap_or_else(|| Arc::new(InMemoryMembership::new()));
        let metrics = SyncMetrics::new();
        let shutdown = ShutdownController::new();

        let started = CacheActor::new(
            node.clone(),
            store.clone(),
            adapter,
            stream.clone(),
            self.config.clone(),
            metrics.clone(),
            shutdown.clone(),
        )
        .start()
        .await?;

        membership.join(node.clone(), started.handle.clone());

        let barrier = SyncBarrier::new(
            stream,
            self.config.sync_poll_interval,
            self.config.sync_timeout,
            shutdown.clone(),
            metrics.clone(),
        );
        let replication = ReplicationProtocol::new(
            membership.clone(),
            barrier.clone(),
            self.config.ack_timeout,
            metrics.clone(),
        );

        info!(
            node = %node,
            records = store.total_records(),
            members = membership.members().len(),
            "control cache started"
        );

        Ok(ControlCache::assemble(
            node,
            store,
            started,
            membership,
            replication,
            barrier,
            self.config,
            metrics,
            shutdown,
        ))
    }
}
