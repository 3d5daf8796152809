//! Control-plane node identification.
//!
//! Every process running a cache actor is a node. [`NodeId`] names it in
//! membership lists and replication results.

use std::fmt;

/// Name of a control-plane node.
///
/// # Example
///
/// ```rust
/// use xds_core::NodeId;
///
/// let node = NodeId::new("cp-0");
/// assert_eq!(node.as_str(), "cp-0");
/// assert_eq!(NodeId::local().as_str(), "local");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(String);

impl NodeId {
    /// Create a node id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id used when a cache runs without a configured node name.
    #[must_use]
    pub fn local() -> Self {
        Self("local".to_string())
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::local()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}
