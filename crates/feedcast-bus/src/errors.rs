//! Bus error types.

use thiserror::Error;

/// Errors raised by bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    /// The broker is unreachable, the handshake failed, or the handle is closed.
    #[error("bus connection error: {0}")]
    Connection(String),
    /// The broker refused or could not accept a publish.
    #[error("publish failed: {0}")]
    Publish(String),
    /// A payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The broker sent a frame that violates the protocol.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Socket I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BusError {
    /// Error returned by every call on a closed handle.
    pub fn closed() -> Self {
        Self::Connection("bus handle is closed".into())
    }

    /// Whether this error means the handle can no longer be used.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Io(_))
    }
}

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
