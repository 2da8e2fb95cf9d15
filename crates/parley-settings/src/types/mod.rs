//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a
//! settings file may name any subset of fields and the rest keep their
//! compiled defaults.

mod logging;
mod relay;
mod server;

pub use logging::*;
pub use relay::*;
pub use server::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type for the relay.
///
/// ```json
/// {
///   "server": { "port": 9000, "heartbeatIntervalSecs": 15 },
///   "relay": { "duplicatePolicy": "reject" },
///   "logging": { "format": "json" }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParleySettings {
    /// Listener and connection limits.
    pub server: ServerSettings,
    /// Per-connection relay behavior.
    pub relay: RelaySettings,
    /// Log filter and format.
    pub logging: LoggingSettings,
}

impl ParleySettings {
    /// Reject combinations the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.server.max_connections == 0 {
            return Err(SettingsError::InvalidValue("server.maxConnections must be > 0".into()));
        }
        if self.server.max_message_size == 0 {
            return Err(SettingsError::InvalidValue("server.maxMessageSize must be > 0".into()));
        }
        if self.server.heartbeat_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatIntervalSecs must be > 0".into(),
            ));
        }
        if self.server.heartbeat_timeout_secs < self.server.heartbeat_interval_secs {
            return Err(SettingsError::InvalidValue(format!(
                "server.heartbeatTimeoutSecs ({}) is shorter than heartbeatIntervalSecs ({})",
                self.server.heartbeat_timeout_secs, self.server.heartbeat_interval_secs
            )));
        }
        if self.relay.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue("relay.sendQueueCapacity must be > 0".into()));
        }
        Ok(())
    }
}
