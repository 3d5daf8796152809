//! # xds-core
//!
//! Core types and error handling for the replicated xDS configuration cache.
//!
//! This crate provides the foundational types used across the other crates:
//!
//! - [`XdsError`] - Error type with gRPC status code mapping
//! - [`ResourceType`] - The five generated resource categories and their type URLs
//! - [`Resource`], [`ResourceSet`], [`ResourceBundle`] - Generated protocol resources
//! - [`ApiConfigRecord`] - One API's source configuration
//! - [`ConfigEvent`] - Change signals applied by the cache actor
//! - [`ContentHash`] - FNV-1a digest used for change detection
//! - [`NodeId`] - Control-plane node names
//!
//! ## Example
//!
//! ```rust
//! use xds_core::{ConfigEvent, ContentHash, ResourceType};
//!
//! let events = vec![ConfigEvent::created("api1"), ConfigEvent::deleted("api2")];
//! assert!(events[1].is_delete());
//!
//! let hash = ContentHash::of_resources(&[]).unwrap();
//! assert_eq!(hash, ContentHash::of_resources(&[]).unwrap());
//! assert_eq!(ResourceType::ALL.len(), 5);
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod event;
mod hash;
mod node;
mod record;
mod resource;
mod resource_type;

pub use error::XdsError;
pub use event::{ConfigEvent, EventKind};
pub use hash::ContentHash;
pub use node::NodeId;
pub use record::ApiConfigRecord;
pub use resource::{AnyResource, BoxResource, Resource, ResourceBundle, ResourceSet};
pub use resource_type::ResourceType;

/// Result type alias using [`XdsError`].
pub type Result<T> = std::result::Result<T, XdsError>;

/// Alias for Result used throughout the workspace.
pub type XdsResult<T> = Result<T>;
