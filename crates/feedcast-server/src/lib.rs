//! # feedcast-server
//!
//! Pushes bus events to WebSocket subscribers.
//!
//! - [`websocket::hub::Hub`]: session registry and fan-out
//! - [`websocket::connection::Session`]: one subscriber and its bounded
//!   outbound queue
//! - [`websocket::session`]: the read and write loops driving a socket
//! - [`websocket::event_bridge::EventBridge`]: bus topic to hub broadcast
//! - [`server::FeedcastServer`]: axum router, `/health`, `/metrics`, listener

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::HubError;
pub use server::FeedcastServer;
pub use shutdown::ShutdownCoordinator;
pub use websocket::event_bridge::EventBridge;
pub use websocket::hub::{Hub, HubConfig, HubState, HubStats};
