//! Content hashing for configuration payloads and resource sets.
//!
//! [`ContentHash`] is a 64-bit FNV-1a digest. The delivery side compares
//! hashes instead of payloads to decide whether a cluster needs a push.

use std::fmt;
use std::hash::Hasher;

use fnv::FnvHasher;
use serde::{Deserialize, Serialize};

use crate::resource::BoxResource;
use crate::{XdsError, XdsResult};

/// Opaque, comparable digest of some content.
///
/// Equal content always yields equal hashes. Different content yields
/// different hashes with overwhelming probability.
///
/// # Example
///
/// ```rust
/// use xds_core::ContentHash;
///
/// let a = ContentHash::of_bytes(b"listener-a");
/// let b = ContentHash::of_bytes(b"listener-a");
/// assert_eq!(a, b);
/// assert_eq!(a.to_string().len(), 16);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(u64);

impl ContentHash {
    /// Hash a byte slice.
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = FnvHasher::default();
        hasher.write(bytes);
        Self(hasher.finish())
    }

    /// Hash a JSON payload.
    ///
    /// Object keys are serialized in sorted order, so equal values hash equally.
    #[must_use]
    pub fn of_json(value: &serde_json::Value) -> Self {
        // Serializing a Value into a Vec cannot fail.
        let bytes = serde_json::to_vec(value).unwrap_or_default();
        Self::of_bytes(&bytes)
    }

    /// Hash an ordered resource sequence.
    ///
    /// Every resource contributes its type URL, name and encoded body,
    /// each length-prefixed so that boundaries cannot shift between fields.
    pub fn of_resources(resources: &[BoxResource]) -> XdsResult<Self> {
        let mut hasher = FnvHasher::default();
        hasher.write_u64(resources.len() as u64);
        for resource in resources {
            let any = resource.encode().map_err(|e| XdsError::EncodingError {
                type_url: resource.type_url().to_string(),
                message: e.to_string(),
            })?;
            write_field(&mut hasher, any.type_url.as_bytes());
            write_field(&mut hasher, resource.name().as_bytes());
            write_field(&mut hasher, &any.value);
        }
        Ok(Self(hasher.finish()))
    }

    /// Create from a raw value.
    #[must_use]
    pub fn from_u64(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw hash value.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Render as an xDS `version_info` string.
    #[must_use]
    pub fn to_version(&self) -> String {
        self.to_string()
    }
}

fn write_field(hasher: &mut FnvHasher, bytes: &[u8]) {
    hasher.write_u64(bytes.len() as u64);
    hasher.write(bytes);
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
