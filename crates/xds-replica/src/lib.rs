//! # xds-replica
//!
//! Replicated configuration cache for xDS control planes.
//!
//! Every control-plane node keeps a local copy of the API configuration of
//! each cluster and of the xDS resources generated from it. Change events
//! are replicated to all nodes, each node re-reads the changed configs from
//! its configuration source, and the caller waits until the proxies have
//! acknowledged the result.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use xds_replica::prelude::*;
//!
//! let adapter = Arc::new(MemoryAdapter::new());
//! let cache = ControlCache::builder()
//!     .node_id("node-a")
//!     .adapter(adapter.clone())
//!     .start()
//!     .await?;
//!
//! adapter.upsert("edge", "api1", serde_json::json!({ "clusters": [{ "name": "backend" }] }));
//! cache.submit_events("edge", vec![ConfigEvent::created("api1")]).await?;
//!
//! let clusters = cache.get_resources("edge", ResourceType::Cluster);
//! ```
//!
//! ## Architecture
//!
//! - `xds-core` - Records, events, resources, hashing and errors
//! - `xds-cache` - Concurrent store for records and generated resources
//! - `xds-sync` - Cache actor, regeneration, replication and sync barrier
//!
//! This crate re-exports all public APIs for convenience.
//!
//! ## Design Principles
//!
//! 1. **No panics in library code** - All errors are returned as `Result`
//! 2. **One writer per node** - The cache actor serializes every mutation
//! 3. **Lock-free reads** - Readers go to the store, never to the actor
//! 4. **Observable** - Built-in metrics and tracing support

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub use xds_cache as cache;
pub use xds_core as core;
pub use xds_sync as sync;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use xds_replica::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use xds_core::{
        AnyResource, ApiConfigRecord, BoxResource, ConfigEvent, ContentHash, EventKind, NodeId,
        Resource, ResourceBundle, ResourceSet, ResourceType, XdsError, XdsResult,
    };

    // Store
    pub use xds_cache::{CacheStats, ConfigStore};

    // Pipeline
    pub use xds_sync::{
        Adapter, BatchReport, CacheActorHandle, ControlCache, ControlCacheBuilder, DeliveryStream,
        InMemoryMembership, Membership, MemoryAdapter, SubmitOutcome, SyncConfig, Watch,
        WatchStream,
    };
}

/// Version information for this crate.
pub mod version {
    /// Crate version.
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");

    /// Minimum supported Rust version.
    pub const MSRV: &str = "1.75";

    /// Get version info as a string.
    pub fn version_string() -> String {
        format!("xds-replica {} (MSRV {})", VERSION, MSRV)
    }
}
