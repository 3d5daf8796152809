//! Load tests for the replicated cache with 1000+ clusters.
//!
//! These tests verify the system under larger workloads:
//! - Bootstrap of 1000 clusters
//! - Readers running while the actor applies batches
//! - Large batches for a single cluster
//!
//! Run with: `cargo test --package integration-tests --test load_tests -- --nocapture`

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::sync::Barrier;
use xds_replica::prelude::*;

fn payload(name: &str) -> serde_json::Value {
    json!({
        "listeners": [{ "name": format!("{name}-listener") }],
        "clusters": [{ "name": format!("{name}-backend") }],
        "routes": [{ "name": format!("{name}-route") }],
    })
}

async fn start(adapter: Arc<MemoryAdapter>) -> ControlCache {
    ControlCache::builder()
        .adapter(adapter)
        .sync_poll_interval(Duration::from_millis(1))
        .start()
        .await
        .expect("cache should start")
}

#[tokio::test]
async fn test_bootstrap_1000_clusters() {
    let adapter = Arc::new(MemoryAdapter::new());
    for i in 0..1000 {
        let cluster = format!("tenant-{i}");
        adapter.upsert(cluster.as_str(), "api", payload(&cluster));
    }

    let start_time = Instant::now();
    let cache = start(adapter.clone()).await;
    let duration = start_time.elapsed();

    println!("Bootstrapped 1000 clusters in {:?}", duration);

    assert_eq!(cache.bootstrap_report().loaded, 1000);
    assert_eq!(cache.bootstrap_report().clusters.len(), 1000);
    assert_eq!(cache.store().clusters().len(), 1000);
    assert_eq!(adapter.generation_count(), 1000);

    for i in (0..1000).step_by(97) {
        let cluster = format!("tenant-{i}");
        assert_eq!(cache.get_resources(&cluster, ResourceType::Listener).len(), 1);
        assert_eq!(cache.get_resources(&cluster, ResourceType::Cluster).len(), 1);
    }
}

#[tokio::test]
async fn test_large_batch_single_cluster() {
    let adapter = Arc::new(MemoryAdapter::new());
    let cache = start(adapter.clone()).await;

    let events: Vec<_> = (0..1000)
        .map(|i| {
            let api_id = format!("api-{i:04}");
            adapter.upsert("edge", api_id.as_str(), payload(&api_id));
            ConfigEvent::created(api_id)
        })
        .collect();

    let start_time = Instant::now();
    let outcome = cache.submit_events("edge", events).await.unwrap();
    let duration = start_time.elapsed();

    println!("Applied 1000-event batch in {:?}", duration);

    assert!(outcome.is_synced());
    // One regeneration per batch, not per event.
    assert_eq!(adapter.generation_count(), 1);
    assert_eq!(cache.store().record_count("edge"), 1000);
    assert_eq!(cache.get_resources("edge", ResourceType::RouteConfiguration).len(), 1000);

    let total = cache.fold_configs("edge", 0usize, |count, _| count + 1);
    assert_eq!(total, 1000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_during_writes() {
    let adapter = Arc::new(MemoryAdapter::new());
    for i in 0..100 {
        let cluster = format!("tenant-{i}");
        adapter.upsert(cluster.as_str(), "api", payload(&cluster));
    }
    let cache = Arc::new(start(adapter.clone()).await);

    let num_readers = 8;
    let barrier = Arc::new(Barrier::new(num_readers + 1));
    let done = Arc::new(AtomicBool::new(false));
    let read_count = Arc::new(AtomicU64::new(0));

    let mut readers = Vec::new();
    for reader in 0..num_readers {
        let cache = Arc::clone(&cache);
        let barrier = Arc::clone(&barrier);
        let done = Arc::clone(&done);
        let read_count = Arc::clone(&read_count);

        readers.push(tokio::spawn(async move {
            barrier.wait().await;
            let mut i = reader;
            while !done.load(Ordering::Relaxed) {
                let cluster = format!("tenant-{}", i % 100);
                // Every cluster always has a complete set.
                assert_eq!(cache.get_resources(&cluster, ResourceType::Listener).len(), 1);
                read_count.fetch_add(1, Ordering::Relaxed);
                i += num_readers;
                tokio::task::yield_now().await;
            }
        }));
    }

    barrier.wait().await;
    let start_time = Instant::now();
    for round in 0..5 {
        for i in 0..100 {
            let cluster = format!("tenant-{i}");
            adapter.upsert(
                cluster.as_str(),
                "api",
                payload(&format!("{cluster}-r{round}")),
            );
            let outcome = cache
                .submit_events(&cluster, vec![ConfigEvent::updated("api")])
                .await
                .unwrap();
            assert!(outcome.is_synced());
        }
    }
    let duration = start_time.elapsed();
    done.store(true, Ordering::Relaxed);

    for reader in readers {
        reader.await.expect("reader panicked");
    }

    println!(
        "500 submits in {:?} alongside {} reads",
        duration,
        read_count.load(Ordering::Relaxed)
    );
    assert!(read_count.load(Ordering::Relaxed) > 0);

    let listeners = cache.get_resources("tenant-42", ResourceType::Listener);
    assert_eq!(listeners[0].name(), "tenant-42-r4-listener");
}

#[tokio::test]
async fn test_mailbox_backpressure() {
    let adapter = Arc::new(MemoryAdapter::new());
    let cache = Arc::new(
        ControlCache::builder()
            .adapter(adapter.clone())
            .mailbox_capacity(4)
            .sync_poll_interval(Duration::from_millis(1))
            .start()
            .await
            .unwrap(),
    );

    for i in 0..64 {
        adapter.upsert("edge", format!("api-{i}"), payload(&format!("api-{i}")));
    }

    let submits = (0..64).map(|i| {
        let cache = Arc::clone(&cache);
        async move {
            cache
                .submit_events("edge", vec![ConfigEvent::created(format!("api-{i}"))])
                .await
        }
    });
    for outcome in futures::future::join_all(submits).await {
        assert!(outcome.unwrap().is_synced());
    }

    assert_eq!(cache.store().record_count("edge"), 64);
    assert_eq!(cache.get_resources("edge", ResourceType::Listener).len(), 64);
}
