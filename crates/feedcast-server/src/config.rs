//! Server configuration.

use std::time::Duration;

use feedcast_settings::ServerSettings;

use crate::websocket::hub::HubConfig;
use crate::websocket::session::Heartbeat;

/// Runtime configuration for [`crate::FeedcastServer`].
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// WebSocket endpoint path.
    pub ws_path: String,
    /// Maximum concurrent WebSocket sessions.
    pub max_connections: usize,
    /// Per-session outbound queue capacity.
    pub outbound_queue_capacity: usize,
    /// Upper bound on the hub drain at shutdown.
    pub shutdown_timeout: Duration,
    /// Interval between server pings.
    pub ping_interval: Duration,
    /// Silence after which a session is dropped.
    pub pong_timeout: Duration,
}

impl ServerConfig {
    /// Hub limits derived from this configuration.
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            queue_capacity: self.outbound_queue_capacity,
            max_connections: self.max_connections,
            drain_timeout: self.shutdown_timeout,
        }
    }

    /// Keepalive timings for session write loops.
    pub fn heartbeat(&self) -> Heartbeat {
        Heartbeat {
            ping_interval: self.ping_interval,
            pong_timeout: self.pong_timeout,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            ws_path: "/ws".into(),
            max_connections: 1024,
            outbound_queue_capacity: 256,
            shutdown_timeout: Duration::from_secs(5),
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(60),
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            ws_path: settings.ws_path.clone(),
            max_connections: settings.max_connections,
            outbound_queue_capacity: settings.outbound_queue_capacity,
            shutdown_timeout: settings.shutdown_timeout(),
            ping_interval: settings.ping_interval(),
            pong_timeout: settings.pong_timeout(),
        }
    }
}
