//! Typed helpers for the `created_feed` topic.
//!
//! The bus carries the serialized [`FeedCreatedEvent`] as a JSON object
//! with fields `id`, `title`, `description`, `createdAt`.

use bytes::Bytes;
use feedcast_core::FeedCreatedEvent;
use tracing::debug;

use crate::bus::EventBus;
use crate::errors::Result;

/// Serialize an event into a bus payload.
pub fn encode_created_feed(event: &FeedCreatedEvent) -> Result<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(event)?))
}

/// Parse a bus payload into an event.
///
/// Returns [`crate::BusError::Serialization`] for anything that is not a
/// well-formed event.
pub fn decode_created_feed(payload: &[u8]) -> Result<FeedCreatedEvent> {
    Ok(serde_json::from_slice(payload)?)
}

/// Publish `event` on `topic`.
pub async fn publish_created_feed(
    bus: &dyn EventBus,
    topic: &str,
    event: &FeedCreatedEvent,
) -> Result<()> {
    let payload = encode_created_feed(event)?;
    bus.publish(topic, payload).await?;
    debug!(topic, feed_id = %event.id(), "published created feed");
    Ok(())
}
