//! Error types for cache and replication operations.
//!
//! This module provides [`XdsError`], the single error type shared by the
//! store, the cache actor and the replication layer. It converts to a gRPC
//! status so the delivery side can forward failures unchanged.

/// Error type for configuration cache operations.
///
/// Variants fall into the categories the cache distinguishes:
/// - per-event source failures (`SourceError`), which are logged and
///   skipped by the actor
/// - fatal failures (`BootstrapFailed`, `GenerationFailed`), which stop the
///   actor and leave recovery to supervision
/// - request-level failures (`UnhandledRequest`, `ActorUnavailable`,
///   `Timeout`, `Shutdown`) returned to callers
///
/// # Example
///
/// ```rust
/// use xds_core::XdsError;
///
/// let err = XdsError::GenerationFailed {
///     cluster: "edge".to_string(),
///     message: "adapter offline".to_string(),
/// };
/// assert!(err.is_fatal());
/// assert!(err.to_string().contains("edge"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum XdsError {
    /// Malformed or unknown type URL.
    #[error("invalid type URL: {type_url} - {reason}")]
    InvalidTypeUrl {
        /// The invalid type URL.
        type_url: String,
        /// Reason why the type URL is invalid.
        reason: String,
    },

    /// A generated resource failed validation.
    #[error("invalid resource {type_url}/{name}: {reason}")]
    InvalidResource {
        /// The type URL of the resource.
        type_url: String,
        /// The name of the resource.
        name: String,
        /// Reason for validation failure.
        reason: String,
    },

    /// The configuration source failed to answer.
    #[error("configuration source error: {message}")]
    SourceError {
        /// Description of the failure.
        message: String,
        /// Optional underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The initial load could not read the configuration source at all.
    #[error("bootstrap failed: {message}")]
    BootstrapFailed {
        /// Description of the failure.
        message: String,
        /// Optional underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The configuration source could not produce resources for a cluster.
    #[error("resource generation failed for cluster {cluster}: {message}")]
    GenerationFailed {
        /// Cluster whose resources were being generated.
        cluster: String,
        /// Description of the failure.
        message: String,
    },

    /// The cache actor received a request it does not accept.
    #[error("unhandled request: {request}")]
    UnhandledRequest {
        /// Short description of the rejected request.
        request: String,
    },

    /// The cache actor is not running (stopped or terminated).
    #[error("cache actor unavailable on node {node}")]
    ActorUnavailable {
        /// Node whose actor could not be reached.
        node: String,
    },

    /// Resource encoding failed.
    #[error("encoding error for {type_url}: {message}")]
    EncodingError {
        /// The type URL being encoded.
        type_url: String,
        /// Error message.
        message: String,
    },

    /// Operation timed out.
    #[error("operation timed out: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
    },

    /// The cache is shutting down.
    #[error("cache is shutting down")]
    Shutdown,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl XdsError {
    /// Create a source error from any error type.
    pub fn source_error<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::SourceError {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a source error with only a message.
    pub fn source_message(message: impl Into<String>) -> Self {
        Self::SourceError {
            message: message.into(),
            source: None,
        }
    }

    /// Whether this error stops the cache actor.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::BootstrapFailed { .. } | Self::GenerationFailed { .. }
        )
    }
}

/// Convert to tonic::Status for gRPC responses.
impl From<XdsError> for tonic::Status {
    fn from(err: XdsError) -> Self {
        match &err {
            XdsError::InvalidTypeUrl { .. } | XdsError::InvalidResource { .. } => {
                tonic::Status::invalid_argument(err.to_string())
            }
            XdsError::SourceError { .. } | XdsError::ActorUnavailable { .. } => {
                tonic::Status::unavailable(err.to_string())
            }
            XdsError::BootstrapFailed { .. }
            | XdsError::GenerationFailed { .. }
            | XdsError::EncodingError { .. } => tonic::Status::internal(err.to_string()),
            XdsError::UnhandledRequest { .. } => tonic::Status::unimplemented(err.to_string()),
            XdsError::Timeout { .. } => tonic::Status::deadline_exceeded(err.to_string()),
            XdsError::Shutdown => tonic::Status::unavailable(err.to_string()),
            XdsError::Configuration(_) => tonic::Status::invalid_argument(err.to_string()),
        }
    }
}
