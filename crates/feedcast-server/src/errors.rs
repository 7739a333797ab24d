//! Hub error types.

use thiserror::Error;

use crate::websocket::hub::HubState;

/// Errors raised by [`crate::Hub`] operations.
#[derive(Debug, Error)]
pub enum HubError {
    /// Registration attempted after the hub started draining.
    #[error("hub is not accepting sessions (state: {0})")]
    NotAccepting(HubState),
    /// The registry already holds `max_connections` sessions.
    #[error("hub is at capacity ({max} sessions)")]
    Full {
        /// Configured limit.
        max: usize,
    },
    /// An outbound message could not be serialized.
    #[error("failed to serialize outbound message: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for hub operations.
pub type Result<T> = std::result::Result<T, HubError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(
            HubError::NotAccepting(HubState::Draining).to_string(),
            "hub is not accepting sessions (state: draining)"
        );
        assert_eq!(
            HubError::Full { max: 2 }.to_string(),
            "hub is at capacity (2 sessions)"
        );
    }
}
