//! The [`EventBus`] trait and its handle types.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::errors::Result;

/// One message received on a topic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusMessage {
    /// Topic the message was published on.
    pub topic: String,
    /// Raw payload.
    pub payload: Bytes,
}

/// Callback invoked once per message on a subscribed topic.
///
/// Runs on the bus dispatch task. It must not block: a slow handler stalls
/// every other delivery on the same handle.
pub type MessageHandler = Arc<dyn Fn(BusMessage) + Send + Sync>;

/// Publish/subscribe client over some broker.
///
/// Implementations are safe for concurrent use; callers share one handle
/// behind an `Arc`.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Send `payload` to every current subscriber of `topic`.
    ///
    /// At-most-once: the message is not retried or buffered on failure.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()>;

    /// Invoke `handler` for every message published on `topic` from now on.
    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> Result<Subscription>;

    /// Release the broker connection. Idempotent.
    async fn close(&self);

    /// Whether the handle was closed or lost its connection.
    fn is_closed(&self) -> bool;
}

/// Handle to a live subscription.
///
/// Dropping the handle keeps the subscription alive; call
/// [`Subscription::unsubscribe`] to stop deliveries.
pub struct Subscription {
    topic: String,
    sid: u64,
    token: CancellationToken,
}

impl Subscription {
    pub(crate) fn new(topic: String, sid: u64, token: CancellationToken) -> Self {
        Self { topic, sid, token }
    }

    /// Subscribed topic.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Subscription ID, unique per bus handle.
    pub fn sid(&self) -> u64 {
        self.sid
    }

    /// Stop invoking the handler. Idempotent.
    pub fn unsubscribe(&self) {
        self.token.cancel();
    }

    /// Whether the subscription ended (unsubscribed or bus closed).
    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("sid", &self.sid)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Reject topics the broker protocols cannot carry.
pub(crate) fn validate_topic(topic: &str) -> Result<()> {
    if topic.is_empty() || topic.contains(char::is_whitespace) {
        return Err(crate::BusError::Publish(format!("invalid topic {topic:?}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsubscribe_is_idempotent() {
        let sub = Subscription::new("t".into(), 7, CancellationToken::new());
        assert!(sub.is_active());
        sub.unsubscribe();
        sub.unsubscribe();
        assert!(!sub.is_active());
        assert_eq!(sub.sid(), 7);
        assert_eq!(sub.topic(), "t");
    }

    #[test]
    fn topic_validation() {
        assert!(validate_topic("created_feed").is_ok());
        assert!(validate_topic("").is_err());
        assert!(validate_topic("two words").is_err());
        assert!(validate_topic("tab\tbed").is_err());
    }
}
