//! Change events.
//!
//! Events are pure signals. They name the API that changed and how, but
//! never carry configuration content: the cache re-reads the source.

use std::fmt;

use serde::{Deserialize, Serialize};

/// What happened to an API config.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// The API config was created.
    Created,
    /// The API config was updated.
    Updated,
    /// The API config was deleted.
    Deleted,
}

impl EventKind {
    /// Label used in logs and metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single `(event_kind, api_id)` pair in a batch.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigEvent {
    /// What happened.
    pub kind: EventKind,
    /// Which API config it happened to.
    pub api_id: String,
}

impl ConfigEvent {
    /// A `created` event.
    pub fn created(api_id: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Created,
            api_id: api_id.into(),
        }
    }

    /// An `updated` event.
    pub fn updated(api_id: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Updated,
            api_id: api_id.into(),
        }
    }

    /// A `deleted` event.
    pub fn deleted(api_id: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Deleted,
            api_id: api_id.into(),
        }
    }

    /// Whether this event removes the config.
    #[inline]
    pub fn is_delete(&self) -> bool {
        self.kind == EventKind::Deleted
    }
}
