//! Cache configuration.

use std::time::Duration;

use xds_core::{XdsError, XdsResult};

/// Configuration for a control cache node.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Capacity of the cache actor's mailbox.
    pub mailbox_capacity: usize,
    /// How long to wait for each node to acknowledge a batch.
    pub ack_timeout: Duration,
    /// How often the sync barrier polls the delivery stream.
    pub sync_poll_interval: Duration,
    /// Upper bound on a sync barrier wait. `None` waits forever.
    pub sync_timeout: Option<Duration>,
    /// Regenerate resources for batches that only contain deletes.
    pub regenerate_on_delete: bool,
    /// How long shutdown waits for in-flight operations.
    pub shutdown_grace_period: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1024,
            ack_timeout: Duration::from_secs(5),
            sync_poll_interval: Duration::from_millis(100),
            sync_timeout: Some(Duration::from_secs(30)),
            regenerate_on_delete: false,
            shutdown_grace_period: Duration::from_secs(10),
        }
    }
}

impl SyncConfig {
    /// Check that the values can drive a running cache.
    pub fn validate(&self) -> XdsResult<()> {
        if self.mailbox_capacity == 0 {
            return Err(XdsError::Configuration(
                "mailbox capacity must be greater than zero".into(),
            ));
        }
        if self.sync_poll_interval.is_zero() {
            return Err(XdsError::Configuration(
                "sync poll interval must be greater than zero".into(),
            ));
        }
        if self.ack_timeout.is_zero() {
            return Err(XdsError::Configuration(
                "ack timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
