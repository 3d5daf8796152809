//! Single-node integration tests for the replicated cache.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing_subscriber::FmtSubscriber;
use xds_replica::prelude::*;

fn init_tracing() {
    let _ = FmtSubscriber::builder()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

async fn start(adapter: Arc<MemoryAdapter>) -> ControlCache {
    init_tracing();
    ControlCache::builder()
        .node_id("node-1")
        .adapter(adapter)
        .sync_poll_interval(Duration::from_millis(5))
        .start()
        .await
        .expect("cache should start")
}

fn names(resources: &[BoxResource]) -> Vec<String> {
    resources.iter().map(|r| r.name().to_string()).collect()
}

fn api_ids(cache: &ControlCache, cluster: &str) -> Vec<String> {
    cache.fold_configs(cluster, Vec::new(), |mut ids, record| {
        ids.push(record.api_id().to_string());
        ids
    })
}

#[tokio::test]
async fn created_event_publishes_listener_and_cluster() {
    let adapter = Arc::new(MemoryAdapter::new());
    let cache = start(adapter.clone()).await;

    adapter.upsert(
        "edge",
        "api1",
        json!({
            "listeners": [{ "name": "api1-listener", "port": 8080 }],
            "clusters": [{ "name": "api1-backend" }],
        }),
    );

    let outcome = cache
        .submit_events("edge", vec![ConfigEvent::created("api1")])
        .await
        .unwrap();
    assert!(outcome.is_synced());

    assert_eq!(cache.get_resources("edge", ResourceType::Listener).len(), 1);
    assert_eq!(cache.get_resources("edge", ResourceType::Cluster).len(), 1);
    assert!(cache
        .get_resources("edge", ResourceType::RouteConfiguration)
        .is_empty());
}

#[tokio::test]
async fn delete_only_batch_leaves_stale_resources_until_next_regeneration() {
    let adapter = Arc::new(MemoryAdapter::new());
    adapter.upsert("edge", "api1", json!({ "listeners": [{ "name": "l1" }] }));
    let cache = start(adapter.clone()).await;
    assert_eq!(api_ids(&cache, "edge"), vec!["api1"]);

    adapter.remove("edge", "api1");
    cache
        .submit_events("edge", vec![ConfigEvent::deleted("api1")])
        .await
        .unwrap();

    assert!(api_ids(&cache, "edge").is_empty());
    assert_eq!(
        names(&cache.get_resources("edge", ResourceType::Listener)),
        vec!["l1"]
    );

    // Any regenerating event for the cluster clears the stale set.
    adapter.upsert("edge", "api2", json!({ "listeners": [{ "name": "l2" }] }));
    cache
        .submit_events("edge", vec![ConfigEvent::created("api2")])
        .await
        .unwrap();
    assert_eq!(
        names(&cache.get_resources("edge", ResourceType::Listener)),
        vec!["l2"]
    );
}

#[tokio::test]
async fn delete_only_batch_regenerates_when_enabled() {
    init_tracing();
    let adapter = Arc::new(MemoryAdapter::new());
    adapter.upsert("edge", "api1", json!({ "listeners": [{ "name": "l1" }] }));
    let cache = ControlCache::builder()
        .adapter(adapter.clone())
        .regenerate_on_delete(true)
        .sync_poll_interval(Duration::from_millis(5))
        .start()
        .await
        .unwrap();

    adapter.remove("edge", "api1");
    cache
        .submit_events("edge", vec![ConfigEvent::deleted("api1")])
        .await
        .unwrap();

    assert!(cache.get_resources("edge", ResourceType::Listener).is_empty());
}

#[tokio::test]
async fn bootstrap_populates_every_cluster_before_events() {
    let adapter = Arc::new(MemoryAdapter::new());
    adapter.upsert("a", "api1", json!({ "listeners": [{ "name": "a-l" }] }));
    adapter.upsert("b", "api1", json!({ "clusters": [{ "name": "b-c1" }, { "name": "b-c2" }] }));

    let cache = start(adapter.clone()).await;

    // Bootstrap reads the source in bulk; no event was applied.
    assert_eq!(adapter.fetch_count(), 0);
    assert_eq!(cache.metrics().batches(), 0);
    assert_eq!(cache.bootstrap_report().loaded, 2);

    assert_eq!(names(&cache.get_resources("a", ResourceType::Listener)), vec!["a-l"]);
    assert!(cache.get_resources("a", ResourceType::Cluster).is_empty());
    assert_eq!(
        names(&cache.get_resources("b", ResourceType::Cluster)),
        vec!["b-c1", "b-c2"]
    );
    assert!(cache.get_resources("b", ResourceType::Listener).is_empty());
}

#[tokio::test]
async fn deleting_absent_config_is_noop() {
    let adapter = Arc::new(MemoryAdapter::new());
    let cache = start(adapter).await;

    let outcome = cache
        .submit_events("edge", vec![ConfigEvent::deleted("never-existed")])
        .await
        .unwrap();
    assert!(outcome.is_synced());
    assert!(api_ids(&cache, "edge").is_empty());
}

#[tokio::test]
async fn updates_replace_rather_than_merge() {
    let adapter = Arc::new(MemoryAdapter::new());
    let cache = start(adapter.clone()).await;

    adapter.upsert(
        "edge",
        "api1",
        json!({ "listeners": [{ "name": "first" }], "clusters": [{ "name": "c" }] }),
    );
    cache
        .submit_events("edge", vec![ConfigEvent::created("api1")])
        .await
        .unwrap();

    adapter.upsert("edge", "api1", json!({ "listeners": [{ "name": "second" }] }));
    cache
        .submit_events("edge", vec![ConfigEvent::updated("api1")])
        .await
        .unwrap();

    let record = cache.store().get("edge", "api1").unwrap();
    assert_eq!(record.payload(), &json!({ "listeners": [{ "name": "second" }] }));
    assert_eq!(
        names(&cache.get_resources("edge", ResourceType::Listener)),
        vec!["second"]
    );
    assert!(cache.get_resources("edge", ResourceType::Cluster).is_empty());
}

#[tokio::test]
async fn later_event_in_batch_wins() {
    let adapter = Arc::new(MemoryAdapter::new());
    let cache = start(adapter.clone()).await;

    adapter.upsert("edge", "x", json!({ "listeners": [{ "name": "lx" }] }));
    cache
        .submit_events(
            "edge",
            vec![ConfigEvent::created("x"), ConfigEvent::deleted("x")],
        )
        .await
        .unwrap();

    assert!(cache.store().get("edge", "x").is_none());
    assert!(cache.get_resources("edge", ResourceType::Listener).is_empty());
}

#[tokio::test]
async fn regeneration_is_deterministic() {
    let adapter = Arc::new(MemoryAdapter::new());
    adapter.upsert("edge", "b", json!({ "routes": [{ "name": "rb" }] }));
    adapter.upsert("edge", "a", json!({ "routes": [{ "name": "ra" }] }));
    let cache = start(adapter).await;

    let first = cache.resync("edge").await.unwrap();
    let second = cache.resync("edge").await.unwrap();
    assert_eq!(first.hashes, second.hashes);
    assert_eq!(
        first.hashes,
        cache.bootstrap_report().clusters["edge"]
    );
    assert_eq!(
        names(&cache.get_resources("edge", ResourceType::RouteConfiguration)),
        vec!["ra", "rb"]
    );
}

#[tokio::test]
async fn content_change_changes_hash() {
    let adapter = Arc::new(MemoryAdapter::new());
    adapter.upsert("edge", "a", json!({ "secrets": [{ "name": "cert", "v": 1 }] }));
    let cache = start(adapter.clone()).await;
    let before = cache.store().resource_hash("edge", ResourceType::TlsSecret).unwrap();

    adapter.upsert("edge", "a", json!({ "secrets": [{ "name": "cert", "v": 2 }] }));
    cache
        .submit_events("edge", vec![ConfigEvent::updated("a")])
        .await
        .unwrap();
    let after = cache.store().resource_hash("edge", ResourceType::TlsSecret).unwrap();

    assert_ne!(before, after);
}

#[tokio::test]
async fn clusters_are_isolated() {
    let adapter = Arc::new(MemoryAdapter::new());
    adapter.upsert("a", "api1", json!({ "listeners": [{ "name": "a-l" }] }));
    adapter.upsert("b", "api1", json!({ "listeners": [{ "name": "b-l" }] }));
    let cache = start(adapter.clone()).await;

    let b_hash = cache.store().resource_hash("b", ResourceType::Listener).unwrap();
    let b_record = cache.store().get("b", "api1").unwrap();

    adapter.upsert("a", "api1", json!({ "listeners": [{ "name": "a-l2" }] }));
    adapter.upsert("a", "api2", json!({ "listeners": [{ "name": "a-l3" }] }));
    cache
        .submit_events(
            "a",
            vec![ConfigEvent::updated("api1"), ConfigEvent::created("api2")],
        )
        .await
        .unwrap();

    assert_eq!(
        cache.store().resource_hash("b", ResourceType::Listener).unwrap(),
        b_hash
    );
    assert_eq!(cache.store().get("b", "api1").unwrap(), b_record);
    assert_eq!(cache.store().record_count("a"), 2);
}

#[tokio::test]
async fn fetch_failure_skips_only_that_event() {
    let adapter = Arc::new(MemoryAdapter::new());
    let cache = start(adapter.clone()).await;

    adapter.upsert("edge", "good", json!({ "listeners": [{ "name": "g" }] }));
    adapter.upsert("edge", "bad", json!({ "listeners": [{ "name": "b" }] }));
    adapter.fail_fetch("edge", "bad", true);

    let outcome = cache
        .submit_events(
            "edge",
            vec![ConfigEvent::created("bad"), ConfigEvent::created("good")],
        )
        .await
        .unwrap();

    assert!(outcome.is_synced());
    assert_eq!(api_ids(&cache, "edge"), vec!["good"]);
    assert_eq!(cache.metrics().fetch_failures(), 1);
}

#[tokio::test]
async fn source_absence_purges_unless_retained() {
    let adapter = Arc::new(MemoryAdapter::new());
    let cache = start(adapter.clone()).await;

    cache
        .load_single(
            "edge",
            ApiConfigRecord::new("edge", "pinned", json!({ "listeners": [{ "name": "p" }] }))
                .retained(),
        )
        .await
        .unwrap();
    cache
        .load_single(
            "edge",
            ApiConfigRecord::new("edge", "loose", json!({ "listeners": [{ "name": "l" }] })),
        )
        .await
        .unwrap();
    assert_eq!(api_ids(&cache, "edge"), vec!["loose", "pinned"]);

    cache
        .submit_events(
            "edge",
            vec![ConfigEvent::updated("pinned"), ConfigEvent::updated("loose")],
        )
        .await
        .unwrap();

    assert_eq!(api_ids(&cache, "edge"), vec!["pinned"]);
    assert_eq!(
        names(&cache.get_resources("edge", ResourceType::Listener)),
        vec!["p"]
    );
}

#[tokio::test]
async fn generation_failure_stops_node() {
    let adapter = Arc::new(MemoryAdapter::new());
    let cache = start(adapter.clone()).await;

    adapter.upsert("edge", "a", json!({}));
    adapter.fail_generation(true);

    let outcome = cache
        .submit_events("edge", vec![ConfigEvent::created("a")])
        .await
        .unwrap();
    let SubmitOutcome::PartialFailure { failed, .. } = outcome else {
        panic!("expected partial failure");
    };
    assert!(matches!(failed[0].1, XdsError::GenerationFailed { .. }));

    // The actor is gone; later writes fail explicitly.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!cache.actor().is_running());
    assert!(matches!(
        cache.resync("edge").await,
        Err(XdsError::ActorUnavailable { .. })
    ));
}

#[tokio::test]
async fn barrier_waits_for_proxy_acknowledgement() {
    init_tracing();
    let adapter = Arc::new(MemoryAdapter::new());
    let stream = Arc::new(WatchStream::new());
    let cache = Arc::new(
        ControlCache::builder()
            .adapter(adapter.clone())
            .stream(stream.clone())
            .sync_poll_interval(Duration::from_millis(5))
            .start()
            .await
            .unwrap(),
    );

    let mut watch = stream.create_watch("edge");
    adapter.upsert("edge", "api1", json!({ "listeners": [{ "name": "l1" }] }));

    let submit = {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache
                .submit_events("edge", vec![ConfigEvent::created("api1")])
                .await
        })
    };

    // Play the proxy: apply every change, then acknowledge.
    let proxy = {
        let stream = stream.clone();
        tokio::spawn(async move {
            for _ in ResourceType::ALL {
                let change = watch.recv().await.expect("watch open");
                stream.acknowledge(&change.cluster, change.resource_type, change.hash);
            }
        })
    };

    let outcome = tokio::time::timeout(Duration::from_secs(5), submit)
        .await
        .expect("submit should finish")
        .unwrap()
        .unwrap();
    assert!(outcome.is_synced());
    proxy.await.unwrap();
}

#[tokio::test]
async fn barrier_timeout_is_reported() {
    init_tracing();
    let adapter = Arc::new(MemoryAdapter::new());
    let cache = ControlCache::builder()
        .adapter(adapter.clone())
        .stream(Arc::new(WatchStream::new()))
        .sync_poll_interval(Duration::from_millis(5))
        .sync_timeout(Some(Duration::from_millis(50)))
        .start()
        .await
        .unwrap();

    adapter.upsert("edge", "api1", json!({ "listeners": [{ "name": "l1" }] }));
    let err = cache
        .submit_events("edge", vec![ConfigEvent::created("api1")])
        .await
        .unwrap_err();

    assert!(matches!(err, XdsError::Timeout { .. }));
    // The change itself was applied.
    assert_eq!(cache.get_resources("edge", ResourceType::Listener).len(), 1);
}
