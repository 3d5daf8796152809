//! Resource trait and the per-cluster resource containers.
//!
//! This module provides the [`Resource`] trait for opaque protocol objects,
//! [`ResourceSet`] for the stored resources of one `(cluster, type)`, and
//! [`ResourceBundle`] for the output of one regeneration pass.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::{ContentHash, ResourceType, XdsError, XdsResult};

/// Trait for xDS resources.
///
/// The cache never inspects resources beyond their name and encoded form.
/// Implementations must encode deterministically: the same resource must
/// always produce the same bytes, or content hashes become unstable.
///
/// # Example
///
/// ```rust
/// use xds_core::{Resource, ResourceType};
/// use prost_types::Any;
/// use std::any::Any as StdAny;
///
/// #[derive(Debug)]
/// struct MyListener {
///     name: String,
/// }
///
/// impl Resource for MyListener {
///     fn type_url(&self) -> &str {
///         ResourceType::LISTENER_URL
///     }
///
///     fn name(&self) -> &str {
///         &self.name
///     }
///
///     fn encode(&self) -> Result<Any, Box<dyn std::error::Error + Send + Sync>> {
///         Ok(Any {
///             type_url: self.type_url().to_string(),
///             value: self.name.as_bytes().to_vec(),
///         })
///     }
///
///     fn as_any(&self) -> &dyn StdAny {
///         self
///     }
/// }
/// ```
pub trait Resource: Send + Sync + fmt::Debug {
    /// Get the type URL for this resource.
    fn type_url(&self) -> &str;

    /// Get the resource name.
    fn name(&self) -> &str;

    /// Encode the resource to a protobuf Any message.
    fn encode(&self) -> Result<prost_types::Any, Box<dyn std::error::Error + Send + Sync>>;

    /// Convert to Any for downcasting.
    fn as_any(&self) -> &dyn Any;
}

/// Type alias for a shared resource.
pub type BoxResource = Arc<dyn Resource>;

/// A pre-encoded resource.
///
/// Stores the protobuf `Any` directly, which is what configuration sources
/// usually hand back after translating their own model.
#[derive(Debug, Clone, PartialEq)]
pub struct AnyResource {
    name: String,
    any: prost_types::Any,
}

impl AnyResource {
    /// Wrap an already encoded message.
    #[must_use]
    pub fn new(name: impl Into<String>, any: prost_types::Any) -> Self {
        Self {
            name: name.into(),
            any,
        }
    }

    /// Build from raw message bytes of the given type.
    #[must_use]
    pub fn from_bytes(
        resource_type: ResourceType,
        name: impl Into<String>,
        value: Vec<u8>,
    ) -> Self {
        Self::new(
            name,
            prost_types::Any {
                type_url: resource_type.type_url().to_string(),
                value,
            },
        )
    }

    /// Get the inner Any message.
    #[must_use]
    pub fn inner(&self) -> &prost_types::Any {
        &self.any
    }
}

impl Resource for AnyResource {
    fn type_url(&self) -> &str {
        &self.any.type_url
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self) -> Result<prost_types::Any, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.any.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The generated resources of one type for one cluster.
///
/// Resource sets are replaced wholesale; nothing mutates one in place.
#[derive(Debug, Clone)]
pub struct ResourceSet {
    cluster: String,
    resource_type: ResourceType,
    resources: Arc<[BoxResource]>,
}

impl ResourceSet {
    /// Create a resource set.
    pub fn new(
        cluster: impl Into<String>,
        resource_type: ResourceType,
        resources: impl Into<Arc<[BoxResource]>>,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            resource_type,
            resources: resources.into(),
        }
    }

    /// Cluster this set belongs to.
    #[inline]
    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    /// Resource type of every member.
    #[inline]
    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    /// The ordered resources.
    #[inline]
    pub fn resources(&self) -> &[BoxResource] {
        &self.resources
    }

    /// Shared handle to the ordered resources.
    #[inline]
    pub fn shared(&self) -> Arc<[BoxResource]> {
        Arc::clone(&self.resources)
    }

    /// Number of resources.
    #[inline]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether the set is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Resource names, in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.resources.iter().map(|r| r.name())
    }

    /// Compute the content hash. Not cached; computed fresh on every call.
    pub fn content_hash(&self) -> XdsResult<ContentHash> {
        ContentHash::of_resources(&self.resources)
    }
}

/// Output of one regeneration pass: the full resources of a cluster,
/// for every resource type.
///
/// Types that were never filled in are treated as empty.
#[derive(Debug, Clone, Default)]
pub struct ResourceBundle {
    resources: BTreeMap<ResourceType, Vec<BoxResource>>,
}

impl ResourceBundle {
    /// Create an empty bundle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the resources of one type.
    #[must_use]
    pub fn with(mut self, resource_type: ResourceType, resources: Vec<BoxResource>) -> Self {
        self.resources.insert(resource_type, resources);
        self
    }

    /// Append one resource.
    pub fn push(&mut self, resource_type: ResourceType, resource: BoxResource) {
        self.resources.entry(resource_type).or_default().push(resource);
    }

    /// Resources of one type, empty when absent.
    pub fn get(&self, resource_type: ResourceType) -> &[BoxResource] {
        self.resources
            .get(&resource_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Remove and return the resources of one type.
    pub fn take(&mut self, resource_type: ResourceType) -> Vec<BoxResource> {
        self.resources.remove(&resource_type).unwrap_or_default()
    }

    /// Total number of resources across all types.
    pub fn total_resources(&self) -> usize {
        self.resources.values().map(Vec::len).sum()
    }

    /// Check that every resource sits under its own type and has a name.
    pub fn validate(&self) -> XdsResult<()> {
        for (resource_type, resources) in &self.resources {
            for resource in resources {
                if resource.type_url() != resource_type.type_url() {
                    return Err(XdsError::InvalidResource {
                        type_url: resource.type_url().to_string(),
                        name: resource.name().to_string(),
                        reason: format!("placed under {resource_type}"),
                    });
                }
                if resource.name().is_empty() {
                    return Err(XdsError::InvalidResource {
                        type_url: resource.type_url().to_string(),
                        name: String::new(),
                        reason: "resource name cannot be empty".to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}
