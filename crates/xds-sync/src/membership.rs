//! Cluster membership and request fan-out.
//!
//! A [`Membership`] knows the cache actor of every node and delivers a
//! request to all of them. [`InMemoryMembership`] connects nodes living in
//! one process and can simulate unreachable nodes.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use futures::future::join_all;
use tracing::{debug, trace, warn};
use xds_core::{NodeId, XdsError, XdsResult};

use crate::actor::{BatchReport, CacheActorHandle, CacheRequest};

/// One node's answer to a broadcast request.
#[derive(Debug)]
pub struct NodeReply {
    /// Node that answered, or failed to.
    pub node: NodeId,
    /// The actor's result, or why it could not be reached in time.
    pub result: XdsResult<BatchReport>,
}

/// The set of nodes replicating a cache.
#[async_trait]
pub trait Membership: Send + Sync + 'static {
    /// Make `node` reachable through `handle`. Replaces an earlier handle.
    fn join(&self, node: NodeId, handle: CacheActorHandle);

    /// Stop routing requests to `node`.
    fn leave(&self, node: &NodeId);

    /// Current members, sorted.
    fn members(&self) -> Vec<NodeId>;

    /// Deliver `request` to every member concurrently.
    ///
    /// Each member gets at most `ack_timeout` to answer. Returns one reply
    /// per member, in member order.
    async fn broadcast(&self, request: CacheRequest, ack_timeout: Duration) -> Vec<NodeReply>;
}

/// Membership for nodes sharing one process.
#[derive(Debug, Default)]
pub struct InMemoryMembership {
    nodes: DashMap<NodeId, CacheActorHandle>,
    partitioned: DashSet<NodeId>,
}

impl InMemoryMembership {
    /// Create an empty membership.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cut `node` off: it stays a member, but requests to it fail.
    pub fn partition(&self, node: &NodeId) {
        warn!(node = %node, "partitioning node");
        self.partitioned.insert(node.clone());
    }

    /// Undo [`InMemoryMembership::partition`].
    pub fn heal(&self, node: &NodeId) {
        debug!(node = %node, "healing node");
        self.partitioned.remove(node);
    }

    /// Handle of a member, if it joined.
    pub fn handle(&self, node: &NodeId) -> Option<CacheActorHandle> {
        self.nodes.get(node).map(|handle| handle.clone())
    }

    async fn deliver(
        &self,
        node: NodeId,
        handle: CacheActorHandle,
        request: CacheRequest,
        ack_timeout: Duration,
    ) -> NodeReply {
        if self.partitioned.contains(&node) {
            trace!(node = %node, "node partitioned, dropping request");
            return NodeReply {
                result: Err(XdsError::ActorUnavailable {
                    node: node.to_string(),
                }),
                node,
            };
        }

        let result = match tokio::time::timeout(ack_timeout, handle.call(request)).await {
            Ok(result) => result,
            Err(_) => Err(XdsError::Timeout {
                operation: format!("acknowledgement from node {node}"),
            }),
        };
        NodeReply { node, result }
    }
}

#[async_trait]
impl Membership for InMemoryMembership {
    fn join(&self, node: NodeId, handle: CacheActorHandle) {
        debug!(node = %node, "node joined");
        self.nodes.insert(node, handle);
    }

    fn leave(&self, node: &NodeId) {
        if self.nodes.remove(node).is_some() {
            debug!(node = %node, "node left");
        }
    }

    fn members(&self) -> Vec<NodeId> {
        let mut members: Vec<_> = self.nodes.iter().map(|entry| entry.key().clone()).collect();
        members.sort();
        members
    }

    async fn broadcast(&self, request: CacheRequest, ack_timeout: Duration) -> Vec<NodeReply> {
        let mut targets: Vec<(NodeId, CacheActorHandle)> = self
            .nodes
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        targets.sort_by(|a, b| a.0.cmp(&b.0));

        trace!(nodes = targets.len(), request = request.kind(), "broadcasting");
        join_all(
            targets
                .into_iter()
                .map(|(node, handle)| self.deliver(node, handle, request.clone(), ack_timeout)),
        )
        .await
    }
}
