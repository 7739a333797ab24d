//! In-process broker backed by `tokio::sync::broadcast`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::bus::{BusMessage, EventBus, MessageHandler, Subscription, validate_topic};
use crate::errors::{BusError, Result};

/// Default per-topic channel capacity.
const DEFAULT_TOPIC_CAPACITY: usize = 1024;

/// Broker living inside the current process.
///
/// Each topic is a broadcast channel; each subscription owns one dispatch
/// task that calls its handler in publish order. A subscriber that falls more
/// than the topic capacity behind loses the oldest messages.
pub struct InMemoryBus {
    topics: Mutex<HashMap<String, broadcast::Sender<Bytes>>>,
    capacity: usize,
    next_sid: AtomicU64,
    closed: CancellationToken,
    tasks: TaskTracker,
}

impl InMemoryBus {
    /// Create a broker with the default per-topic capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TOPIC_CAPACITY)
    }

    /// Create a broker whose topics buffer up to `capacity` messages.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            next_sid: AtomicU64::new(1),
            closed: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    /// Number of live subscriber receivers on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .get(topic)
            .map_or(0, broadcast::Sender::receiver_count)
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(BusError::closed());
        }
        validate_topic(topic)?;
        let sender = self.topics.lock().get(topic).cloned();
        match sender {
            Some(tx) => {
                // No receivers left is not an error: nobody is listening.
                let delivered = tx.send(payload).unwrap_or(0);
                debug!(topic, delivered, "published");
            }
            None => debug!(topic, "published to topic without subscribers"),
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> Result<Subscription> {
        if self.closed.is_cancelled() {
            return Err(BusError::closed());
        }
        validate_topic(topic)?;

        let mut rx = {
            let mut topics = self.topics.lock();
            topics
                .entry(topic.to_owned())
                .or_insert_with(|| broadcast::channel(self.capacity).0)
                .subscribe()
        };

        let sid = self.next_sid.fetch_add(1, Ordering::Relaxed);
        let token = self.closed.child_token();
        let task_token = token.clone();
        let task_topic = topic.to_owned();

        let _ = self.tasks.spawn(async move {
            loop {
                tokio::select! {
                    () = task_token.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(payload) => handler(BusMessage {
                            topic: task_topic.clone(),
                            payload,
                        }),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(topic = %task_topic, sid, skipped, "subscriber lagged, messages dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!(topic = %task_topic, sid, "dispatch task exited");
        });

        debug!(topic, sid, "subscribed");
        Ok(Subscription::new(topic.to_owned(), sid, token))
    }

    async fn close(&self) {
        if self.closed.is_cancelled() {
            return;
        }
        self.closed.cancel();
        self.topics.lock().clear();
        let _ = self.tasks.close();
        self.tasks.wait().await;
        info!("in-memory bus closed");
    }

    fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}
