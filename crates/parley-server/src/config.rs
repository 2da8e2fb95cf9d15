//! Server configuration.

use std::time::Duration;

use parley_core::{DuplicatePolicy, LifecycleConfig};
use parley_settings::ParleySettings;
use serde::{Deserialize, Serialize};

/// Configuration for the relay server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Close a connection after this many seconds without inbound frames.
    pub heartbeat_timeout_secs: u64,
    /// Seconds to wait for connections to drain on shutdown.
    pub shutdown_timeout_secs: u64,
    /// Outbound queue bound per connection.
    pub send_queue_capacity: usize,
    /// Handling of an identifier that is already in its group.
    pub duplicate_policy: DuplicatePolicy,
    /// Milliseconds a connection's writer gets to close the transport.
    pub close_timeout_ms: u64,
}

impl ServerConfig {
    /// `host:port` for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Ping interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Silence tolerated before a connection is closed.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    /// Drain budget at shutdown.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Per-connection settings handed to each lifecycle.
    pub fn lifecycle(&self) -> LifecycleConfig {
        LifecycleConfig {
            send_queue_capacity: self.send_queue_capacity,
            duplicate_policy: self.duplicate_policy,
            close_timeout: Duration::from_millis(self.close_timeout_ms),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 1024,
            max_message_size: 1024 * 1024, // 1 MiB
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            shutdown_timeout_secs: 10,
            send_queue_capacity: 256,
            duplicate_policy: DuplicatePolicy::Replace,
            close_timeout_ms: 2000,
        }
    }
}

impl From<&ParleySettings> for ServerConfig {
    fn from(settings: &ParleySettings) -> Self {
        let server = &settings.server;
        let relay = &settings.relay;
        Self {
            host: server.host.clone(),
            port: server.port,
            max_connections: server.max_connections,
            max_message_size: server.max_message_size,
            heartbeat_interval_secs: server.heartbeat_interval_secs,
            heartbeat_timeout_secs: server.heartbeat_timeout_secs,
            shutdown_timeout_secs: server.shutdown_timeout_secs,
            send_queue_capacity: relay.send_queue_capacity,
            duplicate_policy: relay.duplicate_policy,
            close_timeout_ms: relay.close_timeout_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port_is_zero() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.bind_addr(), "127.0.0.1:0");
    }

    #[test]
    fn default_limits() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.max_connections, 1024);
        assert_eq!(cfg.max_message_size, 1024 * 1024);
        assert_eq!(cfg.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(cfg.heartbeat_timeout(), Duration::from_secs(90));
        assert_eq!(cfg.shutdown_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn lifecycle_config_carries_relay_values() {
        let cfg = ServerConfig {
            send_queue_capacity: 8,
            duplicate_policy: DuplicatePolicy::Reject,
            close_timeout_ms: 250,
            ..ServerConfig::default()
        };
        let lc = cfg.lifecycle();
        assert_eq!(lc.send_queue_capacity, 8);
        assert_eq!(lc.duplicate_policy, DuplicatePolicy::Reject);
        assert_eq!(lc.close_timeout, Duration::from_millis(250));
    }

    #[test]
    fn from_settings() {
        let mut settings = ParleySettings::default();
        settings.server.port = 9000;
        settings.server.host = "0.0.0.0".into();
        settings.relay.duplicate_policy = DuplicatePolicy::Reject;

        let cfg = ServerConfig::from(&settings);
        assert_eq!(cfg.bind_addr(), "0.0.0.0:9000");
        assert_eq!(cfg.duplicate_policy, DuplicatePolicy::Reject);
        assert_eq!(cfg.send_queue_capacity, settings.relay.send_queue_capacity);
        assert_eq!(cfg.shutdown_timeout_secs, settings.server.shutdown_timeout_secs);
    }

    #[test]
    fn deserialize_from_json_string() {
        let json = r#"{"host":"10.0.0.1","port":3000,"max_connections":5,"max_message_size":512,
            "heartbeat_interval_secs":10,"heartbeat_timeout_secs":30,"shutdown_timeout_secs":1,
            "send_queue_capacity":4,"duplicate_policy":"reject","close_timeout_ms":100}"#;
        let cfg: ServerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.host, "10.0.0.1");
        assert_eq!(cfg.max_connections, 5);
        assert_eq!(cfg.duplicate_policy, DuplicatePolicy::Reject);
    }
}
