//! Events carried on the bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::FeedId;

/// A feed was created by the producer.
///
/// Immutable once built: fields are private and only readable. On the bus the
/// record is JSON with the field names `id`, `title`, `description` and
/// `createdAt` (RFC 3339).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedCreatedEvent {
    id: String,
    title: String,
    description: String,
    created_at: DateTime<Utc>,
}

impl FeedCreatedEvent {
    /// Build a new event with a fresh ID stamped with the current time.
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::from_parts(FeedId::new().into_inner(), title, description, Utc::now())
    }

    /// Build an event from already-known parts.
    pub fn from_parts(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            created_at,
        }
    }

    /// Feed ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Feed title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Feed description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// When the feed was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap()
    }

    #[test]
    fn new_generates_id_and_timestamp() {
        let before = Utc::now();
        let event = FeedCreatedEvent::new("T", "D");
        assert!(event.id().starts_with("feed_"));
        assert_eq!(event.title(), "T");
        assert_eq!(event.description(), "D");
        assert!(event.created_at() >= before);
    }

    #[test]
    fn wire_field_names() {
        let event = FeedCreatedEvent::from_parts("abc", "T", "D", fixed_time());
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["id"], "abc");
        assert_eq!(value["title"], "T");
        assert_eq!(value["description"], "D");
        assert_eq!(value["createdAt"], "2026-03-01T12:30:00Z");
        assert!(value.get("created_at").is_none());
    }

    #[test]
    fn parses_offset_timestamps() {
        let json = r#"{"id":"x","title":"t","description":"d","createdAt":"2026-03-01T14:30:00+02:00"}"#;
        let event: FeedCreatedEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.created_at(), fixed_time());
    }

    #[test]
    fn missing_field_is_rejected() {
        let json = r#"{"id":"x","title":"t","createdAt":"2026-03-01T12:30:00Z"}"#;
        assert!(serde_json::from_str::<FeedCreatedEvent>(json).is_err());
    }
}
