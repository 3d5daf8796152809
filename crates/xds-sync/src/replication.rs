//! Cluster-wide submission of change batches.
//!
//! Submitting a batch fans it out to every member's cache actor, waits for
//! each to acknowledge, and then waits for the local proxies to catch up.
//! When any node fails to acknowledge, the submit reports a partial failure
//! and skips the sync wait; nodes that did acknowledge keep the change.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use xds_core::{ConfigEvent, NodeId, XdsError, XdsResult};

use crate::actor::CacheRequest;
use crate::barrier::SyncBarrier;
use crate::membership::Membership;
use crate::metrics::SyncMetrics;

/// Result of a cluster-wide submit.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// Every node applied the batch and local proxies are in sync.
    Synced {
        /// Nodes that acknowledged.
        acknowledged: Vec<NodeId>,
    },
    /// Some nodes did not acknowledge in time or failed the batch.
    PartialFailure {
        /// Nodes that acknowledged.
        acknowledged: Vec<NodeId>,
        /// Nodes that failed, with why.
        failed: Vec<(NodeId, XdsError)>,
    },
}

impl SubmitOutcome {
    /// Whether every node acknowledged.
    pub fn is_synced(&self) -> bool {
        matches!(self, Self::Synced { .. })
    }

    /// Nodes that acknowledged.
    pub fn acknowledged(&self) -> &[NodeId] {
        match self {
            Self::Synced { acknowledged } | Self::PartialFailure { acknowledged, .. } => {
                acknowledged
            }
        }
    }

    /// Nodes that failed. Empty when synced.
    pub fn failed_nodes(&self) -> Vec<&NodeId> {
        match self {
            Self::Synced { .. } => Vec::new(),
            Self::PartialFailure { failed, .. } => failed.iter().map(|(node, _)| node).collect(),
        }
    }
}

/// Broadcasts batches over a [`Membership`] and gates on the sync barrier.
#[derive(Clone)]
pub struct ReplicationProtocol {
    membership: Arc<dyn Membership>,
    barrier: SyncBarrier,
    ack_timeout: Duration,
    metrics: SyncMetrics,
}

impl std::fmt::Debug for ReplicationProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicationProtocol")
            .field("ack_timeout", &self.ack_timeout)
            .finish_non_exhaustive()
    }
}

impl ReplicationProtocol {
    /// Create a protocol over `membership`.
    pub fn new(
        membership: Arc<dyn Membership>,
        barrier: SyncBarrier,
        ack_timeout: Duration,
        metrics: SyncMetrics,
    ) -> Self {
        Self {
            membership,
            barrier,
            ack_timeout,
            metrics,
        }
    }

    /// Apply `events` for `cluster` on every node.
    ///
    /// Returns an error only when there is nobody to replicate to or when
    /// the sync wait fails after all nodes acknowledged.
    pub async fn submit(
        &self,
        cluster: &str,
        events: Vec<ConfigEvent>,
    ) -> XdsResult<SubmitOutcome> {
        let request = CacheRequest::ApplyEventBatch {
            cluster: cluster.to_string(),
            events,
        };
        let replies = self.membership.broadcast(request, self.ack_timeout).await;
        if replies.is_empty() {
            return Err(XdsError::Configuration("no nodes to replicate to".into()));
        }

        let mut acknowledged = Vec::new();
        let mut failed = Vec::new();
        for reply in replies {
            match reply.result {
                Ok(report) => {
                    debug!(
                        node = %reply.node,
                        cluster,
                        applied = report.applied,
                        skipped = report.skipped.len(),
                        "node acknowledged batch"
                    );
                    acknowledged.push(reply.node);
                }
                Err(err) => {
                    warn!(node = %reply.node, cluster, error = %err, "node failed to apply batch");
                    failed.push((reply.node, err));
                }
            }
        }

        if !failed.is_empty() {
            self.metrics.record_partial_replication(failed.len());
            return Ok(SubmitOutcome::PartialFailure {
                acknowledged,
                failed,
            });
        }

        self.barrier.wait_until_in_sync(cluster).await?;
        info!(cluster, nodes = acknowledged.len(), "batch replicated");
        Ok(SubmitOutcome::Synced { acknowledged })
    }
}
