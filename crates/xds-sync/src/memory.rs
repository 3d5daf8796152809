//! In-memory configuration source.
//!
//! [`MemoryAdapter`] keeps API configs as JSON payloads and translates them
//! into resources. It is the adapter used by local development setups and
//! by tests, and it can inject faults at each adapter call.
//!
//! # Payload format
//!
//! A payload is a JSON object whose optional keys name resource types:
//!
//! ```json
//! {
//!   "listeners":     [{ "name": "ingress", "port": 8080 }],
//!   "clusters":      [{ "name": "backend" }],
//!   "routes":        [{ "name": "default" }],
//!   "scoped_routes": [{ "name": "tenant-a" }],
//!   "secrets":       [{ "name": "edge-cert" }]
//! }
//! ```
//!
//! Every entry becomes one resource named after its `name` field, whose
//! value is the entry's JSON encoding. Records are translated in api id
//! order, so equal inputs always give equal bundles.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use tracing::{debug, warn};
use xds_core::{AnyResource, ApiConfigRecord, ResourceBundle, ResourceType, XdsError, XdsResult};

use crate::adapter::Adapter;

type Key = (String, String);

/// A configuration source held in process memory.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    configs: DashMap<Key, serde_json::Value>,
    failing_fetches: DashSet<Key>,
    fail_generation: AtomicBool,
    fail_bootstrap: AtomicBool,
    fail_init: AtomicBool,
    fetches: AtomicU64,
    generations: AtomicU64,
}

impl MemoryAdapter {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the payload of an API config.
    pub fn upsert(
        &self,
        cluster: impl Into<String>,
        api_id: impl Into<String>,
        payload: serde_json::Value,
    ) {
        self.configs.insert((cluster.into(), api_id.into()), payload);
    }

    /// Remove an API config from the source.
    pub fn remove(&self, cluster: &str, api_id: &str) -> Option<serde_json::Value> {
        self.configs
            .remove(&(cluster.to_string(), api_id.to_string()))
            .map(|(_, payload)| payload)
    }

    /// Make fetches (and bootstrap reads) of one config fail.
    pub fn fail_fetch(&self, cluster: &str, api_id: &str, fail: bool) {
        let key = (cluster.to_string(), api_id.to_string());
        if fail {
            self.failing_fetches.insert(key);
        } else {
            self.failing_fetches.remove(&key);
        }
    }

    /// Make every generation fail.
    pub fn fail_generation(&self, fail: bool) {
        self.fail_generation.store(fail, Ordering::SeqCst);
    }

    /// Make bootstrap unable to read the source at all.
    pub fn fail_bootstrap(&self, fail: bool) {
        self.fail_bootstrap.store(fail, Ordering::SeqCst);
    }

    /// Make adapter initialization fail.
    pub fn fail_init(&self, fail: bool) {
        self.fail_init.store(fail, Ordering::SeqCst);
    }

    /// Number of single-config fetches served.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Number of generation passes served.
    pub fn generation_count(&self) -> u64 {
        self.generations.load(Ordering::SeqCst)
    }

    fn read(&self, cluster: &str, api_id: &str) -> XdsResult<Option<ApiConfigRecord>> {
        let key = (cluster.to_string(), api_id.to_string());
        if self.failing_fetches.contains(&key) {
            return Err(XdsError::source_error(
                format!("config {cluster}/{api_id} is unreadable"),
                std::io::Error::other("injected read fault"),
            ));
        }
        Ok(self
            .configs
            .get(&key)
            .map(|payload| ApiConfigRecord::new(cluster, api_id, payload.clone())))
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    async fn init(&self) -> XdsResult<()> {
        if self.fail_init.load(Ordering::SeqCst) {
            return Err(XdsError::source_message("memory source refused to start"));
        }
        Ok(())
    }

    async fn bootstrap_all(&self) -> XdsResult<Vec<XdsResult<ApiConfigRecord>>> {
        if self.fail_bootstrap.load(Ordering::SeqCst) {
            return Err(XdsError::source_message("memory source is offline"));
        }

        let mut keys: Vec<Key> = self.configs.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();

        let entries: Vec<_> = keys
            .iter()
            .filter_map(|(cluster, api_id)| self.read(cluster, api_id).transpose())
            .collect();
        debug!(records = entries.len(), "memory source bootstrap");
        Ok(entries)
    }

    async fn get_api_config(
        &self,
        cluster: &str,
        api_id: &str,
    ) -> XdsResult<Option<ApiConfigRecord>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.read(cluster, api_id)
    }

    async fn generate(
        &self,
        cluster: &str,
        records: &[Arc<ApiConfigRecord>],
        _changed: &BTreeSet<String>,
    ) -> XdsResult<ResourceBundle> {
        self.generations.fetch_add(1, Ordering::SeqCst);
        if self.fail_generation.load(Ordering::SeqCst) {
            return Err(XdsError::GenerationFailed {
                cluster: cluster.to_string(),
                message: "memory source translator disabled".into(),
            });
        }
        translate(records)
    }
}

/// Payload key holding entries of `resource_type`.
pub fn payload_key(resource_type: ResourceType) -> &'static str {
    match resource_type {
        ResourceType::Listener => "listeners",
        ResourceType::Cluster => "clusters",
        ResourceType::RouteConfiguration => "routes",
        ResourceType::ScopedRouteConfiguration => "scoped_routes",
        ResourceType::TlsSecret => "secrets",
    }
}

/// Translate records into a bundle.
///
/// Entries without a string `name` are skipped. A type key holding
/// anything but an array is an error.
pub fn translate(records: &[Arc<ApiConfigRecord>]) -> XdsResult<ResourceBundle> {
    let mut ordered: Vec<&ApiConfigRecord> = records.iter().map(|record| record.as_ref()).collect();
    ordered.sort_by(|a, b| a.api_id().cmp(b.api_id()));

    let mut bundle = ResourceBundle::new();
    for record in ordered {
        for resource_type in ResourceType::ALL {
            let key = payload_key(resource_type);
            let Some(section) = record.payload().get(key) else {
                continue;
            };
            let entries = section.as_array().ok_or_else(|| XdsError::InvalidResource {
                type_url: resource_type.type_url().to_string(),
                name: record.api_id().to_string(),
                reason: format!("`{key}` must be an array"),
            })?;

            for entry in entries {
                let Some(name) = entry.get("name").and_then(|n| n.as_str()) else {
                    warn!(
                        cluster = record.cluster(),
                        api_id = record.api_id(),
                        section = key,
                        "skipping unnamed entry"
                    );
                    continue;
                };
                let value = serde_json::to_vec(entry).map_err(|err| XdsError::EncodingError {
                    type_url: resource_type.type_url().to_string(),
                    message: err.to_string(),
                })?;
                bundle.push(
                    resource_type,
                    Arc::new(AnyResource::from_bytes(resource_type, name, value)),
                );
            }
        }
    }
    Ok(bundle)
}
