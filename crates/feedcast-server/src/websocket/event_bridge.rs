//! Event bridge: bus messages on the created-feed topic become hub
//! broadcasts.

use std::sync::Arc;

use bytes::Bytes;
use feedcast_bus::feed::decode_created_feed;
use feedcast_bus::{BusError, BusMessage, EventBus, MessageHandler, Subscription};
use feedcast_core::OutboundMessage;
use metrics::counter;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::hub::Hub;
use crate::metrics::{BRIDGE_DROPPED_TOTAL, BRIDGE_MALFORMED_TOTAL, BRIDGE_MESSAGES_TOTAL};

/// Bus messages buffered between the bus dispatch task and the bridge.
pub const DEFAULT_BRIDGE_CAPACITY: usize = 1024;

/// Forwards created-feed events from the bus to every hub session.
///
/// The bus handler only hands the payload to a bounded channel; decoding and
/// broadcasting happen on the bridge's own task so a busy hub never stalls
/// bus dispatch.
pub struct EventBridge {
    rx: mpsc::Receiver<Bytes>,
    hub: Arc<Hub>,
    topic: String,
}

impl EventBridge {
    /// Subscribe to `topic` and build a bridge feeding `hub`.
    ///
    /// A failed subscription is returned to the caller; the server treats it
    /// as fatal at startup.
    pub async fn subscribe(
        bus: &dyn EventBus,
        topic: &str,
        hub: Arc<Hub>,
        capacity: usize,
    ) -> Result<(Self, Subscription), BusError> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handler: MessageHandler = Arc::new(move |msg: BusMessage| {
            if tx.try_send(msg.payload).is_err() {
                warn!(topic = %msg.topic, "bridge queue full, dropping bus message");
                counter!(BRIDGE_DROPPED_TOTAL).increment(1);
            }
        });
        let subscription = bus.subscribe(topic, handler).await?;
        info!(topic, "event bridge subscribed");
        Ok((
            Self {
                rx,
                hub,
                topic: topic.to_owned(),
            },
            subscription,
        ))
    }

    /// Run until `cancel` fires or the subscription's handler is dropped.
    #[tracing::instrument(skip_all, name = "event_bridge", fields(topic = %self.topic))]
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            let payload = tokio::select! {
                () = cancel.cancelled() => break,
                payload = self.rx.recv() => match payload {
                    Some(payload) => payload,
                    None => break,
                },
            };
            self.forward(&payload).await;
        }
        info!("event bridge stopped");
    }

    /// Translate and broadcast one payload. Malformed payloads are logged
    /// and skipped.
    async fn forward(&self, payload: &[u8]) {
        let message = match translate(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, len = payload.len(), "dropping malformed bus message");
                counter!(BRIDGE_MALFORMED_TOTAL).increment(1);
                return;
            }
        };
        counter!(BRIDGE_MESSAGES_TOTAL).increment(1);
        match self.hub.broadcast(&message, None).await {
            Ok(recipients) => debug!(recipients, "bridged created feed"),
            Err(e) => warn!(error = %e, "broadcast failed"),
        }
    }
}

/// Turn a created-feed bus payload into the client-facing message.
pub fn translate(payload: &[u8]) -> Result<OutboundMessage, BusError> {
    let event = decode_created_feed(payload)?;
    Ok(OutboundMessage::from(&event))
}
