//! API configuration records.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::ContentHash;

/// One API's configuration as known to this node.
///
/// Identity is `(cluster, api_id)`. Records are immutable; an update
/// replaces the whole record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfigRecord {
    cluster: String,
    api_id: String,
    content_hash: ContentHash,
    payload: serde_json::Value,
    observed_at: SystemTime,
    retain_on_absence: bool,
}

impl ApiConfigRecord {
    /// Create a record observed now. The content hash is derived from the payload.
    pub fn new(
        cluster: impl Into<String>,
        api_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            api_id: api_id.into(),
            content_hash: ContentHash::of_json(&payload),
            payload,
            observed_at: SystemTime::now(),
            retain_on_absence: false,
        }
    }

    /// Mark the record as externally loaded: it survives the source
    /// no longer listing it.
    #[must_use]
    pub fn retained(mut self) -> Self {
        self.retain_on_absence = true;
        self
    }

    /// Partition key.
    #[inline]
    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    /// Id within the cluster.
    #[inline]
    pub fn api_id(&self) -> &str {
        &self.api_id
    }

    /// Digest of the payload.
    #[inline]
    pub fn content_hash(&self) -> ContentHash {
        self.content_hash
    }

    /// The configuration body.
    #[inline]
    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// When this node observed the record.
    #[inline]
    pub fn observed_at(&self) -> SystemTime {
        self.observed_at
    }

    /// Whether the record must be kept when the source stops listing it.
    #[inline]
    pub fn retain_on_absence(&self) -> bool {
        self.retain_on_absence
    }
}
