//! Resource types generated per cluster.
//!
//! The cache produces exactly five kinds of protocol resources for every
//! cluster. [`ResourceType`] enumerates them and maps each to its xDS type URL.

use std::fmt;
use std::str::FromStr;

use crate::XdsError;

/// One of the fixed protocol resource categories.
///
/// # Example
///
/// ```rust
/// use xds_core::ResourceType;
///
/// let t: ResourceType = ResourceType::LISTENER_URL.parse().unwrap();
/// assert_eq!(t, ResourceType::Listener);
/// assert_eq!(t.short_name(), "Listener");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceType {
    /// Listener (LDS).
    Listener,
    /// Cluster (CDS).
    Cluster,
    /// RouteConfiguration (RDS).
    RouteConfiguration,
    /// ScopedRouteConfiguration (SRDS).
    ScopedRouteConfiguration,
    /// TLS Secret (SDS).
    TlsSecret,
}

impl ResourceType {
    /// Type URL for Listener.
    pub const LISTENER_URL: &'static str = "type.googleapis.com/envoy.config.listener.v3.Listener";

    /// Type URL for Cluster.
    pub const CLUSTER_URL: &'static str = "type.googleapis.com/envoy.config.cluster.v3.Cluster";

    /// Type URL for RouteConfiguration.
    pub const ROUTE_URL: &'static str =
        "type.googleapis.com/envoy.config.route.v3.RouteConfiguration";

    /// Type URL for ScopedRouteConfiguration.
    pub const SCOPED_ROUTE_URL: &'static str =
        "type.googleapis.com/envoy.config.route.v3.ScopedRouteConfiguration";

    /// Type URL for Secret.
    pub const SECRET_URL: &'static str =
        "type.googleapis.com/envoy.extensions.transport_sockets.tls.v3.Secret";

    /// All resource types, in generation order.
    pub const ALL: [ResourceType; 5] = [
        ResourceType::Listener,
        ResourceType::Cluster,
        ResourceType::RouteConfiguration,
        ResourceType::ScopedRouteConfiguration,
        ResourceType::TlsSecret,
    ];

    /// Get the xDS type URL.
    #[must_use]
    pub fn type_url(&self) -> &'static str {
        match self {
            Self::Listener => Self::LISTENER_URL,
            Self::Cluster => Self::CLUSTER_URL,
            Self::RouteConfiguration => Self::ROUTE_URL,
            Self::ScopedRouteConfiguration => Self::SCOPED_ROUTE_URL,
            Self::TlsSecret => Self::SECRET_URL,
        }
    }

    /// Extract the short name from the type URL.
    ///
    /// For example, the Cluster type URL returns `Cluster`.
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        let url = self.type_url();
        url.rsplit('.').next().unwrap_or(url)
    }

    /// Look up a resource type by its short name (`Listener`, `Secret`, ...).
    #[must_use]
    pub fn from_short_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.short_name() == name)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for ResourceType {
    type Err = XdsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.starts_with("type.googleapis.com/") {
            return Err(XdsError::InvalidTypeUrl {
                type_url: s.to_string(),
                reason: "missing type.googleapis.com/ prefix".to_string(),
            });
        }
        Self::ALL
            .into_iter()
            .find(|t| t.type_url() == s)
            .ok_or_else(|| XdsError::InvalidTypeUrl {
                type_url: s.to_string(),
                reason: "not a cached resource type".to_string(),
            })
    }
}

impl AsRef<str> for ResourceType {
    fn as_ref(&self) -> &str {
        self.type_url()
    }
}
