//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`: a settings
//! file may name any subset of fields and the rest keep their defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9000, "outboundQueueCapacity": 64 },
///   "bus": { "address": "nats://broker:4222" },
///   "logging": { "level": "debug", "json": true }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeedcastSettings {
    /// HTTP/WebSocket listener and hub tuning.
    pub server: ServerSettings,
    /// Event bus connection.
    pub bus: BusSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl FeedcastSettings {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| -> Result<()> { Err(SettingsError::InvalidValue(msg.to_owned())) };
        if self.server.outbound_queue_capacity == 0 {
            return invalid("server.outboundQueueCapacity must be at least 1");
        }
        if self.server.max_connections == 0 {
            return invalid("server.maxConnections must be at least 1");
        }
        if !self.server.ws_path.starts_with('/') {
            return invalid("server.wsPath must start with '/'");
        }
        if self.server.ping_interval_ms == 0 {
            return invalid("server.pingIntervalMs must be non-zero");
        }
        if self.server.pong_timeout_ms < self.server.ping_interval_ms {
            return invalid("server.pongTimeoutMs must not be shorter than server.pingIntervalMs");
        }
        if self.bus.address.trim().is_empty() {
            return invalid("bus.address must not be empty");
        }
        let topic = &self.bus.created_feed_topic;
        if topic.is_empty() || topic.contains(char::is_whitespace) {
            return invalid("bus.createdFeedTopic must be a non-empty token");
        }
        Ok(())
    }
}

/// Listener and connection hub settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Path of the WebSocket endpoint.
    pub ws_path: String,
    /// Registry size above which new upgrades are refused.
    pub max_connections: usize,
    /// Messages buffered per session before it counts as stalled.
    pub outbound_queue_capacity: usize,
    /// Upper bound on draining sessions at shutdown.
    pub shutdown_timeout_ms: u64,
    /// Interval between server pings on each session.
    pub ping_interval_ms: u64,
    /// Silence after which a session is treated as dead.
    pub pong_timeout_ms: u64,
}

impl ServerSettings {
    /// `shutdown_timeout_ms` as a [`Duration`].
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// `ping_interval_ms` as a [`Duration`].
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// `pong_timeout_ms` as a [`Duration`].
    pub fn pong_timeout(&self) -> Duration {
        Duration::from_millis(self.pong_timeout_ms)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8082,
            ws_path: "/ws".to_string(),
            max_connections: 1024,
            outbound_queue_capacity: 256,
            shutdown_timeout_ms: 5_000,
            ping_interval_ms: 30_000,
            pong_timeout_ms: 60_000,
        }
    }
}

/// Event bus settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BusSettings {
    /// Broker address: `nats://host:port`, bare `host:port`, or `memory://`.
    pub address: String,
    /// Name announced to the broker.
    pub client_name: String,
    /// Upper bound on connecting to the broker.
    pub connect_timeout_ms: u64,
    /// Topic carrying feed-created events.
    pub created_feed_topic: String,
}

impl BusSettings {
    /// `connect_timeout_ms` as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            address: "nats://127.0.0.1:4222".to_string(),
            client_name: feedcast_core::constants::NAME.to_string(),
            connect_timeout_ms: 2_000,
            created_feed_topic: feedcast_core::constants::CREATED_FEED_TOPIC.to_string(),
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of the compact format.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
