//! The per-node cache actor.
//!
//! All writes to a node's [`ConfigStore`] go through one task that drains a
//! bounded mailbox. Each request is processed to completion, including any
//! regeneration and notification, before the next is taken, so a reader
//! never observes a half-applied batch and regeneration for a cluster always
//! sees the records as of the end of its batch.
//!
//! The actor bootstraps before its loop starts: a [`CacheActorHandle`] only
//! exists once the store has been loaded from the configuration source.
//!
//! A generation failure is fatal. The failing request gets the error, the
//! loop exits, and every later request fails with
//! [`XdsError::ActorUnavailable`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use xds_cache::ConfigStore;
use xds_core::{ApiConfigRecord, ConfigEvent, NodeId, XdsError, XdsResult};

use crate::adapter::Adapter;
use crate::config::SyncConfig;
use crate::delivery::DeliveryStream;
use crate::generator::{generation_failed, ResourceGenerator};
use crate::metrics::SyncMetrics;
use crate::notifier::{ChangeNotifier, ResourceHashes};
use crate::shutdown::ShutdownController;

/// A request understood by the cache actor.
///
/// Requests are serializable so peers can forward them. A request kind this
/// node does not know decodes as [`CacheRequest::Unknown`] and is rejected
/// with [`XdsError::UnhandledRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheRequest {
    /// Apply a batch of change events for one cluster.
    ApplyEventBatch {
        /// Cluster the events belong to.
        cluster: String,
        /// Events in submission order.
        events: Vec<ConfigEvent>,
    },
    /// Insert an externally supplied record and regenerate its cluster.
    LoadSingle {
        /// The record to insert.
        record: ApiConfigRecord,
    },
    /// Regenerate and republish a cluster without changing its records.
    Resync {
        /// Cluster to regenerate.
        cluster: String,
    },
    /// Any request kind this node does not handle.
    #[serde(other)]
    Unknown,
}

impl CacheRequest {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ApplyEventBatch { .. } => "apply_event_batch",
            Self::LoadSingle { .. } => "load_single",
            Self::Resync { .. } => "resync",
            Self::Unknown => "unknown",
        }
    }
}

/// What applying a request did to one cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Cluster the request touched.
    pub cluster: String,
    /// Records fetched and stored.
    pub applied: usize,
    /// Delete events processed.
    pub deleted: usize,
    /// Records removed because the source no longer had them.
    pub purged: usize,
    /// Records kept despite the source no longer having them.
    pub retained: usize,
    /// Api ids whose fetch failed; their events were skipped.
    pub skipped: Vec<String>,
    /// Whether resources were regenerated and republished.
    pub regenerated: bool,
    /// Published hash per resource type, when regenerated.
    pub hashes: ResourceHashes,
}

impl BatchReport {
    fn new(cluster: &str) -> Self {
        Self {
            cluster: cluster.to_string(),
            ..Default::default()
        }
    }
}

/// Outcome of the startup load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Records loaded into the store.
    pub loaded: usize,
    /// Records the source failed to produce.
    pub skipped: usize,
    /// Clusters regenerated, with their published hashes.
    pub clusters: BTreeMap<String, ResourceHashes>,
}

#[derive(Debug)]
struct Envelope {
    request: CacheRequest,
    reply: oneshot::Sender<XdsResult<BatchReport>>,
}

/// The single writer for one node's store.
pub struct CacheActor {
    node: NodeId,
    store: Arc<ConfigStore>,
    adapter: Arc<dyn Adapter>,
    generator: ResourceGenerator,
    notifier: ChangeNotifier,
    config: SyncConfig,
    metrics: SyncMetrics,
    shutdown: ShutdownController,
}

impl std::fmt::Debug for CacheActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheActor")
            .field("node", &self.node)
            .finish_non_exhaustive()
    }
}

/// A running actor: its handle, its task and what bootstrap loaded.
#[derive(Debug)]
pub struct StartedActor {
    /// Handle for sending requests.
    pub handle: CacheActorHandle,
    /// The actor task. Completes when the loop exits.
    pub task: JoinHandle<()>,
    /// Result of the startup load.
    pub bootstrap: BootstrapReport,
}

impl CacheActor {
    /// Assemble an actor. Nothing runs until [`CacheActor::start`].
    pub fn new(
        node: NodeId,
        store: Arc<ConfigStore>,
        adapter: Arc<dyn Adapter>,
        stream: Arc<dyn DeliveryStream>,
        config: SyncConfig,
        metrics: SyncMetrics,
        shutdown: ShutdownController,
    ) -> Self {
        let generator = ResourceGenerator::new(adapter.clone(), store.clone(), metrics.clone());
        let notifier = ChangeNotifier::new(store.clone(), stream, metrics.clone());
        Self {
            node,
            store,
            adapter,
            generator,
            notifier,
            config,
            metrics,
            shutdown,
        }
    }

    /// Initialize the adapter, bootstrap the store, then spawn the loop.
    ///
    /// Fails with [`XdsError::BootstrapFailed`] if the source cannot be read
    /// at all, or [`XdsError::GenerationFailed`] if a bootstrapped cluster
    /// cannot be translated. No task is spawned on failure.
    pub async fn start(self) -> XdsResult<StartedActor> {
        self.adapter
            .init()
            .await
            .map_err(|err| XdsError::BootstrapFailed {
                message: "adapter initialization failed".into(),
                source: Some(Box::new(err)),
            })?;

        let bootstrap = self.bootstrap().await?;

        let (sender, receiver) = mpsc::channel(self.config.mailbox_capacity);
        let running = Arc::new(AtomicBool::new(true));
        let handle = CacheActorHandle {
            node: self.node.clone(),
            sender,
            running: running.clone(),
        };

        let task = tokio::spawn(self.run(receiver, running));

        Ok(StartedActor {
            handle,
            task,
            bootstrap,
        })
    }

    async fn bootstrap(&self) -> XdsResult<BootstrapReport> {
        let entries = self
            .adapter
            .bootstrap_all()
            .await
            .map_err(|err| XdsError::BootstrapFailed {
                message: "configuration source unreadable".into(),
                source: Some(Box::new(err)),
            })?;

        let mut report = BootstrapReport::default();
        let mut by_cluster: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for entry in entries {
            match entry {
                Ok(record) => {
                    by_cluster
                        .entry(record.cluster().to_string())
                        .or_default()
                        .insert(record.api_id().to_string());
                    self.store.put(record);
                    report.loaded += 1;
                }
                Err(err) => {
                    warn!(node = %self.node, error = %err, "skipping api config during bootstrap");
                    report.skipped += 1;
                }
            }
        }

        for (cluster, api_ids) in &by_cluster {
            let hashes = self.regenerate(cluster, api_ids).await?;
            report.clusters.insert(cluster.clone(), hashes);
        }

        self.metrics.set_records(self.store.total_records());
        info!(
            node = %self.node,
            loaded = report.loaded,
            skipped = report.skipped,
            clusters = report.clusters.len(),
            "bootstrap complete"
        );
        Ok(report)
    }

    async fn run(self, mut mailbox: mpsc::Receiver<Envelope>, running: Arc<AtomicBool>) {
        let mut stop = self.shutdown.subscribe();
        info!(node = %self.node, "cache actor started");

        loop {
            if *stop.borrow() {
                break;
            }

            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
                envelope = mailbox.recv() => {
                    let Some(Envelope { request, reply }) = envelope else {
                        break;
                    };
                    let result = self.handle(request).await;
                    let fatal = matches!(&result, Err(err) if err.is_fatal());
                    if let (true, Err(err)) = (fatal, &result) {
                        error!(node = %self.node, error = %err, "cache actor terminating");
                    }
                    // The caller may have given up waiting.
                    let _ = reply.send(result);
                    if fatal {
                        break;
                    }
                }
            }
        }

        running.store(false, Ordering::SeqCst);
        mailbox.close();
        info!(node = %self.node, "cache actor stopped");
    }

    async fn handle(&self, request: CacheRequest) -> XdsResult<BatchReport> {
        debug!(node = %self.node, request = request.kind(), "handling request");
        match request {
            CacheRequest::ApplyEventBatch { cluster, events } => {
                self.apply_batch(&cluster, &events).await
            }
            CacheRequest::LoadSingle { record } => self.load_single(record).await,
            CacheRequest::Resync { cluster } => self.resync(&cluster).await,
            CacheRequest::Unknown => {
                warn!(node = %self.node, "rejecting unhandled request");
                Err(XdsError::UnhandledRequest {
                    request: request.kind().to_string(),
                })
            }
        }
    }

    async fn apply_batch(&self, cluster: &str, events: &[ConfigEvent]) -> XdsResult<BatchReport> {
        let mut report = BatchReport::new(cluster);
        let mut changed = BTreeSet::new();

        for event in events {
            self.metrics.record_event(event.kind);

            if event.is_delete() {
                self.store.delete(cluster, &event.api_id);
                report.deleted += 1;
                continue;
            }

            changed.insert(event.api_id.clone());

            match self.adapter.get_api_config(cluster, &event.api_id).await {
                Ok(Some(record)) => {
                    if record.cluster() != cluster || record.api_id() != event.api_id {
                        warn!(
                            cluster,
                            api_id = %event.api_id,
                            got_cluster = record.cluster(),
                            got_api_id = record.api_id(),
                            "source returned a record for another key, skipping event"
                        );
                        self.metrics.record_fetch_failure();
                        report.skipped.push(event.api_id.clone());
                        continue;
                    }
                    self.store.put(record);
                    report.applied += 1;
                }
                Ok(None) => self.handle_absent(cluster, &event.api_id, &mut report),
                Err(err) => {
                    warn!(
                        cluster,
                        api_id = %event.api_id,
                        error = %err,
                        "failed to fetch api config, skipping event"
                    );
                    self.metrics.record_fetch_failure();
                    report.skipped.push(event.api_id.clone());
                }
            }
        }

        let has_upserts = events.iter().any(|event| !event.is_delete());
        if has_upserts || (self.config.regenerate_on_delete && !events.is_empty()) {
            report.hashes = self.regenerate(cluster, &changed).await?;
            report.regenerated = true;
        } else if !events.is_empty() {
            debug!(
                cluster,
                deleted = report.deleted,
                "delete-only batch, resources left as published"
            );
        }

        self.metrics.record_batch(events.len());
        self.metrics.set_records(self.store.total_records());
        debug!(
            cluster,
            applied = report.applied,
            deleted = report.deleted,
            purged = report.purged,
            skipped = report.skipped.len(),
            regenerated = report.regenerated,
            "applied event batch"
        );
        Ok(report)
    }

    fn handle_absent(&self, cluster: &str, api_id: &str, report: &mut BatchReport) {
        match self.store.get(cluster, api_id) {
            Some(existing) if existing.retain_on_absence() => {
                debug!(cluster, api_id, "source has no config, keeping retained record");
                report.retained += 1;
            }
            Some(_) => {
                self.store.delete(cluster, api_id);
                debug!(cluster, api_id, "source has no config, purged record");
                report.purged += 1;
            }
            None => {
                debug!(cluster, api_id, "source has no config and none is stored");
            }
        }
    }

    async fn load_single(&self, record: ApiConfigRecord) -> XdsResult<BatchReport> {
        let cluster = record.cluster().to_string();
        let mut report = BatchReport::new(&cluster);
        let changed = BTreeSet::from([record.api_id().to_string()]);

        self.store.put(record);
        report.applied = 1;

        report.hashes = self.regenerate(&cluster, &changed).await?;
        report.regenerated = true;
        self.metrics.set_records(self.store.total_records());
        Ok(report)
    }

    async fn resync(&self, cluster: &str) -> XdsResult<BatchReport> {
        let mut report = BatchReport::new(cluster);
        report.hashes = self.regenerate(cluster, &BTreeSet::new()).await?;
        report.regenerated = true;
        info!(node = %self.node, cluster, "resynced cluster");
        Ok(report)
    }

    async fn regenerate(
        &self,
        cluster: &str,
        changed: &BTreeSet<String>,
    ) -> XdsResult<ResourceHashes> {
        let bundle = self.generator.generate(cluster, changed).await?;
        self.notifier
            .publish(cluster, bundle)
            .map_err(|err| generation_failed(cluster, err))
    }
}

/// Cloneable address of a running [`CacheActor`].
#[derive(Debug, Clone)]
pub struct CacheActorHandle {
    node: NodeId,
    sender: mpsc::Sender<Envelope>,
    running: Arc<AtomicBool>,
}

impl CacheActorHandle {
    /// Node the actor belongs to.
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// Whether the actor loop is still accepting requests.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.sender.is_closed()
    }

    /// Send a request and wait for its result.
    ///
    /// Waits for mailbox capacity if the mailbox is full.
    pub async fn call(&self, request: CacheRequest) -> XdsResult<BatchReport> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(Envelope { request, reply })
            .await
            .map_err(|_| self.unavailable())?;
        response.await.map_err(|_| self.unavailable())?
    }

    /// Apply a batch of events for `cluster`.
    pub async fn apply_batch(
        &self,
        cluster: impl Into<String>,
        events: Vec<ConfigEvent>,
    ) -> XdsResult<BatchReport> {
        self.call(CacheRequest::ApplyEventBatch {
            cluster: cluster.into(),
            events,
        })
        .await
    }

    /// Insert `record` and regenerate its cluster.
    pub async fn load_single(&self, record: ApiConfigRecord) -> XdsResult<BatchReport> {
        self.call(CacheRequest::LoadSingle { record }).await
    }

    /// Regenerate and republish `cluster`.
    pub async fn resync(&self, cluster: impl Into<String>) -> XdsResult<BatchReport> {
        self.call(CacheRequest::Resync {
            cluster: cluster.into(),
        })
        .await
    }

    fn unavailable(&self) -> XdsError {
        XdsError::ActorUnavailable {
            node: self.node.to_string(),
        }
    }
}
