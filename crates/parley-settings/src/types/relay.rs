//! Per-connection relay settings.

use std::time::Duration;

use parley_core::DuplicatePolicy;
use serde::{Deserialize, Serialize};

/// Queueing, duplicate handling and close behavior for each connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Frames that may wait for a slow client before new ones are dropped.
    pub send_queue_capacity: usize,
    /// What happens when an identifier joins a group it is already in.
    pub duplicate_policy: DuplicatePolicy,
    /// Milliseconds the writer gets to close the transport at teardown.
    pub close_timeout_ms: u64,
}

impl RelaySettings {
    /// Close timeout as a [`Duration`].
    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            send_queue_capacity: 256,
            duplicate_policy: DuplicatePolicy::Replace,
            close_timeout_ms: 2000,
        }
    }
}
