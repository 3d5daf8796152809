//! Multi-node replication tests.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use xds_replica::prelude::*;

/// Node names for a three-node cluster.
const NODES: [&str; 3] = ["node-a", "node-b", "node-c"];

struct Cluster {
    membership: Arc<InMemoryMembership>,
    nodes: Vec<ControlCache>,
}

impl Cluster {
    async fn start(adapters: Vec<Arc<dyn Adapter>>) -> Self {
        let membership = Arc::new(InMemoryMembership::new());
        let mut nodes = Vec::new();
        for (name, adapter) in NODES.iter().zip(adapters) {
            let node = ControlCache::builder()
                .node_id(*name)
                .adapter(adapter)
                .membership(membership.clone())
                .ack_timeout(Duration::from_millis(150))
                .sync_poll_interval(Duration::from_millis(5))
                .start()
                .await
                .expect("node should start");
            nodes.push(node);
        }
        Self { membership, nodes }
    }

    async fn shared(adapter: Arc<MemoryAdapter>) -> Self {
        Self::start(NODES.iter().map(|_| adapter.clone() as Arc<dyn Adapter>).collect()).await
    }
}

/// Adapter that answers fetches only after a delay.
struct SlowAdapter {
    inner: Arc<MemoryAdapter>,
    delay: Duration,
}

#[async_trait]
impl Adapter for SlowAdapter {
    async fn bootstrap_all(&self) -> XdsResult<Vec<XdsResult<ApiConfigRecord>>> {
        self.inner.bootstrap_all().await
    }

    async fn get_api_config(
        &self,
        cluster: &str,
        api_id: &str,
    ) -> XdsResult<Option<ApiConfigRecord>> {
        tokio::time::sleep(self.delay).await;
        self.inner.get_api_config(cluster, api_id).await
    }

    async fn generate(
        &self,
        cluster: &str,
        records: &[Arc<ApiConfigRecord>],
        changed: &BTreeSet<String>,
    ) -> XdsResult<ResourceBundle> {
        self.inner.generate(cluster, records, changed).await
    }
}

#[tokio::test]
async fn every_node_converges() {
    let adapter = Arc::new(MemoryAdapter::new());
    let cluster = Cluster::shared(adapter.clone()).await;
    assert_eq!(cluster.nodes[0].members().len(), 3);

    adapter.upsert(
        "edge",
        "api1",
        json!({ "listeners": [{ "name": "l1" }], "clusters": [{ "name": "c1" }] }),
    );
    adapter.upsert("edge", "api2", json!({ "listeners": [{ "name": "l2" }] }));

    let outcome = cluster.nodes[1]
        .submit_events(
            "edge",
            vec![ConfigEvent::created("api1"), ConfigEvent::created("api2")],
        )
        .await
        .unwrap();
    assert!(outcome.is_synced());
    assert_eq!(outcome.acknowledged().len(), 3);

    let hashes: Vec<_> = cluster
        .nodes
        .iter()
        .map(|node| node.store().resource_hash("edge", ResourceType::Listener).unwrap())
        .collect();
    assert!(hashes.windows(2).all(|pair| pair[0] == pair[1]));
    for node in &cluster.nodes {
        assert_eq!(node.get_resources("edge", ResourceType::Listener).len(), 2);
        assert_eq!(node.store().record_count("edge"), 2);
    }
}

#[tokio::test]
async fn partitioned_node_reported() {
    let adapter = Arc::new(MemoryAdapter::new());
    let cluster = Cluster::shared(adapter.clone()).await;
    let partitioned = NodeId::new("node-b");
    cluster.membership.partition(&partitioned);

    adapter.upsert("edge", "api1", json!({ "listeners": [{ "name": "l1" }] }));
    let outcome = cluster.nodes[0]
        .submit_events("edge", vec![ConfigEvent::created("api1")])
        .await
        .unwrap();

    assert_eq!(outcome.failed_nodes(), vec![&partitioned]);
    assert_eq!(cluster.nodes[0].store().record_count("edge"), 1);
    assert_eq!(cluster.nodes[1].store().record_count("edge"), 0);
    assert_eq!(cluster.nodes[2].store().record_count("edge"), 1);
    assert_eq!(cluster.nodes[0].metrics().partial_replications(), 1);

    // Healing does not replay; a resync of the missed batch is explicit.
    cluster.membership.heal(&partitioned);
    let outcome = cluster.nodes[0]
        .submit_events("edge", vec![ConfigEvent::updated("api1")])
        .await
        .unwrap();
    assert!(outcome.is_synced());
    assert_eq!(cluster.nodes[1].store().record_count("edge"), 1);
}

#[tokio::test]
async fn slow_node_times_out() {
    let shared = Arc::new(MemoryAdapter::new());
    let slow: Arc<dyn Adapter> = Arc::new(SlowAdapter {
        inner: shared.clone(),
        delay: Duration::from_millis(500),
    });
    let fast: Arc<dyn Adapter> = shared.clone();
    let cluster = Cluster::start(vec![fast.clone(), fast, slow]).await;

    shared.upsert("edge", "api1", json!({ "routes": [{ "name": "r1" }] }));
    let outcome = cluster.nodes[0]
        .submit_events("edge", vec![ConfigEvent::created("api1")])
        .await
        .unwrap();

    let SubmitOutcome::PartialFailure { acknowledged, failed } = outcome else {
        panic!("slow node should not acknowledge in time");
    };
    assert_eq!(acknowledged.len(), 2);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].0, NodeId::new("node-c"));
    assert!(matches!(failed[0].1, XdsError::Timeout { .. }));
}

#[tokio::test]
async fn stopped_node_reported_unavailable() {
    let adapter = Arc::new(MemoryAdapter::new());
    let cluster = Cluster::shared(adapter.clone()).await;

    // Stop node-c's actor while it remains a member.
    let handle = cluster.nodes[2].actor().clone();
    cluster.nodes[2].shutdown().await;
    cluster
        .membership
        .join(NodeId::new("node-c"), handle);

    adapter.upsert("edge", "api1", json!({}));
    let outcome = cluster.nodes[0]
        .submit_events("edge", vec![ConfigEvent::created("api1")])
        .await
        .unwrap();

    let SubmitOutcome::PartialFailure { failed, .. } = outcome else {
        panic!("stopped node should fail");
    };
    assert!(matches!(failed[0].1, XdsError::ActorUnavailable { .. }));
}

#[tokio::test]
async fn departed_node_is_not_contacted() {
    let adapter = Arc::new(MemoryAdapter::new());
    let cluster = Cluster::shared(adapter.clone()).await;

    assert!(cluster.nodes[2].shutdown().await);
    assert_eq!(cluster.nodes[0].members().len(), 2);

    adapter.upsert("edge", "api1", json!({}));
    let outcome = cluster.nodes[0]
        .submit_events("edge", vec![ConfigEvent::created("api1")])
        .await
        .unwrap();
    assert!(outcome.is_synced());
    assert_eq!(outcome.acknowledged().len(), 2);
}

#[tokio::test]
async fn load_single_stays_local() {
    let adapter = Arc::new(MemoryAdapter::new());
    let cluster = Cluster::shared(adapter).await;

    cluster.nodes[0]
        .load_single(
            "edge",
            ApiConfigRecord::new("edge", "local", json!({ "listeners": [{ "name": "l" }] })),
        )
        .await
        .unwrap();

    assert_eq!(cluster.nodes[0].get_resources("edge", ResourceType::Listener).len(), 1);
    assert!(cluster.nodes[1].get_resources("edge", ResourceType::Listener).is_empty());
}

#[tokio::test]
async fn concurrent_submits_for_different_clusters() {
    let adapter = Arc::new(MemoryAdapter::new());
    let cluster = Arc::new(Cluster::shared(adapter.clone()).await);

    let tenants: Vec<String> = (0..8).map(|i| format!("tenant-{i}")).collect();
    for tenant in &tenants {
        adapter.upsert(tenant.as_str(), "api", json!({ "listeners": [{ "name": tenant }] }));
    }

    let submits = tenants.iter().enumerate().map(|(i, tenant)| {
        let cluster = cluster.clone();
        let tenant = tenant.clone();
        async move {
            cluster.nodes[i % NODES.len()]
                .submit_events(&tenant, vec![ConfigEvent::created("api")])
                .await
        }
    });
    for outcome in futures::future::join_all(submits).await {
        assert!(outcome.unwrap().is_synced());
    }

    for node in &cluster.nodes {
        for tenant in &tenants {
            let listeners = node.get_resources(tenant, ResourceType::Listener);
            assert_eq!(listeners.len(), 1);
            assert_eq!(listeners[0].name(), tenant.as_str());
        }
    }
}
