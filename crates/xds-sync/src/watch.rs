//! In-process delivery stream built on per-cluster watches.
//!
//! [`WatchStream`] implements [`DeliveryStream`]:
//! - each proxy session opens a [`Watch`] on its cluster
//! - notifications fan out to every watch as a [`ResourceChange`]
//! - sessions acknowledge the hashes they applied
//! - a cluster is in sync once every notified hash is acknowledged

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};
use xds_core::{ContentHash, ResourceType};

use crate::delivery::DeliveryStream;

/// Unique identifier for a watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

impl WatchId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value of this id.
    #[inline]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for WatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "watch-{}", self.0)
    }
}

/// A new hash published for one resource type of a cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceChange {
    /// Cluster the change belongs to.
    pub cluster: String,
    /// Resource type that changed.
    pub resource_type: ResourceType,
    /// Hash of the newly published resources.
    pub hash: ContentHash,
}

/// A subscription to one cluster's resource changes.
#[derive(Debug)]
pub struct Watch {
    id: WatchId,
    cluster: String,
    receiver: mpsc::Receiver<ResourceChange>,
}

impl Watch {
    /// Identifier of this watch.
    #[inline]
    pub fn id(&self) -> WatchId {
        self.id
    }

    /// Cluster this watch follows.
    #[inline]
    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    /// Next change. `None` once the watch is cancelled.
    pub async fn recv(&mut self) -> Option<ResourceChange> {
        self.receiver.recv().await
    }

    /// Next change if one is queued.
    pub fn try_recv(&mut self) -> Result<ResourceChange, mpsc::error::TryRecvError> {
        self.receiver.try_recv()
    }
}

#[derive(Debug)]
struct WatchSender {
    id: WatchId,
    sender: mpsc::Sender<ResourceChange>,
}

impl WatchSender {
    /// Queue a change without blocking. Returns `false` if the watch is gone.
    fn offer(&self, change: ResourceChange) -> bool {
        match self.sender.try_send(change) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                // The session is behind; it reads the latest state on its next pull.
                trace!(watch_id = %self.id, "watch channel full, dropping change");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

type TypeKey = (String, ResourceType);

/// Delivery stream for proxies connected to this process.
#[derive(Debug)]
pub struct WatchStream {
    watches: Mutex<HashMap<String, Vec<WatchSender>>>,
    notified: DashMap<TypeKey, ContentHash>,
    acknowledged: DashMap<TypeKey, ContentHash>,
    auto_ack: bool,
    channel_buffer: usize,
}

impl Default for WatchStream {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchStream {
    /// Stream whose clusters are in sync only once sessions acknowledge.
    pub fn new() -> Self {
        Self::with_buffer_size(16)
    }

    /// Like [`WatchStream::new`] with a custom per-watch buffer.
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            watches: Mutex::new(HashMap::new()),
            notified: DashMap::new(),
            acknowledged: DashMap::new(),
            auto_ack: false,
            channel_buffer: buffer_size.max(1),
        }
    }

    /// Stream that treats every notification as delivered.
    ///
    /// Suits nodes with no proxies attached, where sync is immediate.
    pub fn auto_acknowledging() -> Self {
        Self {
            auto_ack: true,
            ..Self::new()
        }
    }

    /// Open a watch on `cluster`.
    pub fn create_watch(&self, cluster: impl Into<String>) -> Watch {
        let cluster = cluster.into();
        let id = WatchId::next();
        let (sender, receiver) = mpsc::channel(self.channel_buffer);

        if let Ok(mut watches) = self.watches.lock() {
            watches
                .entry(cluster.clone())
                .or_default()
                .push(WatchSender { id, sender });
        }

        debug!(watch_id = %id, cluster = %cluster, "created watch");

        Watch {
            id,
            cluster,
            receiver,
        }
    }

    /// Cancel a watch. Unknown ids are ignored with a warning.
    pub fn cancel_watch(&self, watch_id: WatchId) {
        let Ok(mut watches) = self.watches.lock() else {
            return;
        };
        for senders in watches.values_mut() {
            if let Some(pos) = senders.iter().position(|s| s.id == watch_id) {
                senders.swap_remove(pos);
                debug!(watch_id = %watch_id, "cancelled watch");
                return;
            }
        }
        warn!(watch_id = %watch_id, "attempted to cancel unknown watch");
    }

    /// Number of open watches on `cluster`.
    pub fn watch_count(&self, cluster: &str) -> usize {
        self.watches
            .lock()
            .map(|watches| watches.get(cluster).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    /// Record that sessions of `cluster` applied `hash` for `resource_type`.
    ///
    /// Acknowledging a hash other than the latest notified one leaves the
    /// type out of sync.
    pub fn acknowledge(&self, cluster: &str, resource_type: ResourceType, hash: ContentHash) {
        trace!(cluster, resource_type = %resource_type, hash = %hash, "acknowledged");
        self.acknowledged
            .insert((cluster.to_string(), resource_type), hash);
    }

    /// Acknowledge every type's latest hash for `cluster`.
    pub fn acknowledge_all(&self, cluster: &str) {
        let latest: Vec<_> = self
            .notified
            .iter()
            .filter(|entry| entry.key().0 == cluster)
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        for (key, hash) in latest {
            self.acknowledged.insert(key, hash);
        }
    }

    /// Latest hash notified for `(cluster, resource_type)`.
    pub fn last_notified(&self, cluster: &str, resource_type: ResourceType) -> Option<ContentHash> {
        self.notified
            .get(&(cluster.to_string(), resource_type))
            .map(|hash| *hash)
    }

    fn fan_out(&self, change: ResourceChange) {
        let Ok(mut watches) = self.watches.lock() else {
            return;
        };
        if let Some(senders) = watches.get_mut(&change.cluster) {
            let before = senders.len();
            senders.retain(|sender| sender.offer(change.clone()));
            let closed = before - senders.len();
            if closed > 0 {
                debug!(cluster = %change.cluster, closed, "removed closed watches");
            }
        }
    }
}

impl DeliveryStream for WatchStream {
    fn notify(&self, cluster: &str, resource_type: ResourceType, hash: ContentHash) {
        let key = (cluster.to_string(), resource_type);
        let previous = self.notified.insert(key.clone(), hash);

        if self.auto_ack {
            self.acknowledged.insert(key, hash);
        }

        // Proxies already hold this content.
        if previous == Some(hash) {
            return;
        }

        self.fan_out(ResourceChange {
            cluster: cluster.to_string(),
            resource_type,
            hash,
        });
    }

    fn is_in_sync(&self, cluster: &str) -> bool {
        self.notified
            .iter()
            .filter(|entry| entry.key().0 == cluster)
            .all(|entry| {
                self.acknowledged
                    .get(entry.key())
                    .is_some_and(|acked| *acked == *entry.value())
            })
    }
}
