//! Messages pushed to connected clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::FeedCreatedEvent;

/// Every frame the server can push to a client.
///
/// Serialized with a `type` discriminant, e.g.
/// `{"type":"created_feed","id":"..","title":"..","description":"..","created_at":".."}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// A feed was created.
    CreatedFeed {
        /// Feed ID.
        id: String,
        /// Feed title.
        title: String,
        /// Feed description.
        description: String,
        /// Creation time (RFC 3339 on the wire).
        created_at: DateTime<Utc>,
    },
}

impl OutboundMessage {
    /// Wire discriminant of this message.
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::CreatedFeed { .. } => "created_feed",
        }
    }

    /// Serialize to the JSON text sent over the socket.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl From<&FeedCreatedEvent> for OutboundMessage {
    fn from(event: &FeedCreatedEvent) -> Self {
        Self::CreatedFeed {
            id: event.id().to_owned(),
            title: event.title().to_owned(),
            description: event.description().to_owned(),
            created_at: event.created_at(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn created_feed_wire_shape() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let event = FeedCreatedEvent::from_parts("abc", "T", "D", t0);
        let msg = OutboundMessage::from(&event);
        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "type": "created_feed",
                "id": "abc",
                "title": "T",
                "description": "D",
                "created_at": "2026-01-02T03:04:05Z",
            })
        );
    }

    #[test]
    fn message_type_matches_tag() {
        let msg = OutboundMessage::from(&FeedCreatedEvent::new("a", "b"));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], msg.message_type());
    }

    #[test]
    fn subsecond_precision_survives() {
        let t0 = Utc.timestamp_nanos(1_767_225_600_123_456_789);
        let msg = OutboundMessage::from(&FeedCreatedEvent::from_parts("x", "", "", t0));
        let back: OutboundMessage = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(back, msg);
    }
}
