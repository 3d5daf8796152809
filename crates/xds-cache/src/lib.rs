//! # xds-cache
//!
//! Concurrent tables for the replicated xDS configuration cache.
//!
//! This crate provides the storage layer:
//!
//! - [`ConfigStore`] - DashMap-based tables for API config records and
//!   generated resource sets
//! - [`CacheStats`] - Atomic counters for store operations
//!
//! ## Key Design Decisions
//!
//! - Uses `DashMap` so reads never wait on the single writer
//! - Values are `Arc`-wrapped and replaced whole, so readers never see torn records
//! - All `DashMap` references are dropped before user callbacks run
//! - The store is an explicit handle (`Arc<ConfigStore>`) passed to the
//!   actor and to readers, not a global
//!
//! ## Example
//!
//! ```rust
//! use xds_cache::ConfigStore;
//! use xds_core::{ApiConfigRecord, ResourceType};
//!
//! let store = ConfigStore::new();
//! store.put(ApiConfigRecord::new("edge", "api1", serde_json::json!({})));
//!
//! let count = store.fold_by_cluster("edge", 0, |n, _| n + 1);
//! assert_eq!(count, 1);
//! assert!(store.get_resources("edge", ResourceType::Listener).is_empty());
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod stats;
mod store;

pub use stats::CacheStats;
pub use store::ConfigStore;
