//! WebSocket sessions, the hub that fans out to them, and the bus bridge.

pub mod connection;
pub mod event_bridge;
pub mod hub;
pub mod session;
