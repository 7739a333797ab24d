//! Session registry and fan-out.
//!
//! The registry is a map keyed by [`SessionId`] behind one `RwLock`:
//! register and unregister take the write lock, broadcast iterates under the
//! read lock and never waits on a session. A session whose queue is full or
//! closed is handed to the hub's maintenance task for removal, so one slow
//! subscriber cannot stall the broadcaster.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::extract::ws::Utf8Bytes;
use feedcast_core::{OutboundMessage, SessionId};
use metrics::{counter, gauge};
use serde::Serialize;
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::connection::{EnqueueOutcome, OutboundQueue, Session};
use crate::errors::{HubError, Result};
use crate::metrics::{HUB_BROADCASTS_TOTAL, HUB_EVICTIONS_TOTAL};

/// Hub lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HubState {
    /// Built, maintenance task not started.
    Created,
    /// Accepting sessions and broadcasting.
    Running,
    /// Shutting down: no new sessions, no further deliveries.
    Draining,
    /// Every session closed.
    Stopped,
}

impl HubState {
    /// Whether new sessions may register.
    pub fn is_accepting(self) -> bool {
        matches!(self, Self::Created | Self::Running)
    }
}

impl fmt::Display for HubState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        })
    }
}

/// Hub limits.
#[derive(Clone, Copy, Debug)]
pub struct HubConfig {
    /// Per-session outbound queue capacity.
    pub queue_capacity: usize,
    /// Registry size limit.
    pub max_connections: usize,
    /// Upper bound on waiting for write loops during [`Hub::drain`].
    pub drain_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            max_connections: 1024,
            drain_timeout: Duration::from_secs(5),
        }
    }
}

/// Point-in-time hub counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct HubStats {
    /// Lifecycle state.
    pub state: HubState,
    /// Registered sessions.
    pub connections: usize,
    /// Broadcasts issued since start.
    pub broadcasts: u64,
    /// Sessions evicted for overflow since start.
    pub evictions: u64,
}

struct Registry {
    state: HubState,
    sessions: HashMap<SessionId, Arc<Session>>,
}

/// Registry of live sessions and the broadcaster over them.
pub struct Hub {
    config: HubConfig,
    registry: RwLock<Registry>,
    evict_tx: mpsc::UnboundedSender<SessionId>,
    evict_rx: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<SessionId>>>,
    writers: TaskTracker,
    broadcasts: AtomicU64,
    evictions: AtomicU64,
}

impl Hub {
    /// Create a hub in the `Created` state.
    pub fn new(config: HubConfig) -> Self {
        let (evict_tx, evict_rx) = mpsc::unbounded_channel();
        Self {
            config,
            registry: RwLock::new(Registry {
                state: HubState::Created,
                sessions: HashMap::new(),
            }),
            evict_tx,
            evict_rx: parking_lot::Mutex::new(Some(evict_rx)),
            writers: TaskTracker::new(),
            broadcasts: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Build a session sized for this hub. It is not registered yet.
    pub fn open_session(&self, remote_addr: Option<SocketAddr>) -> (Arc<Session>, OutboundQueue) {
        Session::new(remote_addr, self.config.queue_capacity)
    }

    /// Spawn a session write loop tracked for [`Hub::drain`].
    pub fn spawn_writer<F>(&self, writer: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let _ = self.writers.spawn(writer);
    }

    /// Add a session to the registry.
    ///
    /// Fails once the hub is draining, or when the registry is full.
    pub async fn register(&self, session: Arc<Session>) -> Result<()> {
        let mut registry = self.registry.write().await;
        if !registry.state.is_accepting() {
            return Err(HubError::NotAccepting(registry.state));
        }
        if registry.sessions.len() >= self.config.max_connections {
            return Err(HubError::Full {
                max: self.config.max_connections,
            });
        }
        let id = session.id().clone();
        let _ = registry.sessions.insert(id.clone(), session);
        let connections = registry.sessions.len();
        drop(registry);

        #[allow(clippy::cast_precision_loss)]
        gauge!(crate::metrics::HUB_SESSIONS).set(connections as f64);
        debug!(session_id = %id, connections, "session registered");
        Ok(())
    }

    /// Remove a session and close it.
    ///
    /// Returns `false` if the session was not registered; unregistering twice
    /// is a no-op.
    pub async fn unregister(&self, id: &SessionId) -> bool {
        let (removed, connections) = {
            let mut registry = self.registry.write().await;
            let removed = registry.sessions.remove(id);
            (removed, registry.sessions.len())
        };
        let Some(session) = removed else {
            return false;
        };
        let _ = session.close();

        #[allow(clippy::cast_precision_loss)]
        gauge!(crate::metrics::HUB_SESSIONS).set(connections as f64);
        debug!(
            session_id = %id,
            connections,
            dropped = session.drop_count(),
            "session unregistered"
        );
        true
    }

    /// Serialize `message` once and queue it on every session except
    /// `exclude`.
    ///
    /// Returns the number of sessions the frame was queued on. Never waits
    /// on a session: full or closed queues are scheduled for eviction.
    pub async fn broadcast(
        &self,
        message: &OutboundMessage,
        exclude: Option<&SessionId>,
    ) -> Result<usize> {
        let frame = Utf8Bytes::from(message.to_json()?);
        let recipients = self.broadcast_frame(frame, exclude).await;
        debug!(
            message_type = message.message_type(),
            recipients, "broadcast message"
        );
        Ok(recipients)
    }

    /// Queue an already serialized frame on every session except `exclude`.
    pub async fn broadcast_frame(&self, frame: Utf8Bytes, exclude: Option<&SessionId>) -> usize {
        let registry = self.registry.read().await;
        if !registry.state.is_accepting() {
            debug!(state = %registry.state, "broadcast dropped, hub is shutting down");
            return 0;
        }

        let mut queued = 0;
        for (id, session) in &registry.sessions {
            if exclude == Some(id) {
                continue;
            }
            match session.enqueue(frame.clone()) {
                EnqueueOutcome::Queued => queued += 1,
                outcome @ (EnqueueOutcome::Full | EnqueueOutcome::Closed) => {
                    self.schedule_eviction(session, outcome);
                }
            }
        }
        drop(registry);

        let _ = self.broadcasts.fetch_add(1, Ordering::Relaxed);
        counter!(HUB_BROADCASTS_TOTAL).increment(1);
        queued
    }

    fn schedule_eviction(&self, session: &Session, outcome: EnqueueOutcome) {
        if !session.mark_evicting() {
            return;
        }
        warn!(
            session_id = %session.id(),
            ?outcome,
            dropped = session.drop_count(),
            "session cannot keep up, evicting"
        );
        let _ = self.evictions.fetch_add(1, Ordering::Relaxed);
        counter!(HUB_EVICTIONS_TOTAL).increment(1);
        let _ = self.evict_tx.send(session.id().clone());
    }

    /// Run the maintenance task until `cancel` fires, then drain.
    ///
    /// Moves the hub to `Running` and removes evicted sessions as they are
    /// reported. Only the first call does anything.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let Some(mut evictions) = self.evict_rx.lock().take() else {
            warn!("hub maintenance task already started");
            return;
        };
        {
            let mut registry = self.registry.write().await;
            if registry.state == HubState::Created {
                registry.state = HubState::Running;
            }
        }
        info!("connection hub running");

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                evicted = evictions.recv() => {
                    let Some(id) = evicted else { break };
                    if self.unregister(&id).await {
                        info!(session_id = %id, "evicted session");
                    }
                }
            }
        }

        self.drain().await;
    }

    /// Stop accepting sessions, close every session, and wait (bounded by
    /// `drain_timeout`) for their write loops to finish.
    pub async fn drain(&self) {
        let sessions: Vec<Arc<Session>> = {
            let mut registry = self.registry.write().await;
            if !registry.state.is_accepting() {
                return;
            }
            registry.state = HubState::Draining;
            registry.sessions.drain().map(|(_, session)| session).collect()
        };
        info!(sessions = sessions.len(), "draining connection hub");
        for session in &sessions {
            let _ = session.close();
        }
        gauge!(crate::metrics::HUB_SESSIONS).set(0.0);

        let _ = self.writers.close();
        if tokio::time::timeout(self.config.drain_timeout, self.writers.wait())
            .await
            .is_err()
        {
            warn!(
                remaining = self.writers.len(),
                timeout = ?self.config.drain_timeout,
                "drain timed out with write loops still running"
            );
        }

        self.registry.write().await.state = HubState::Stopped;
        info!("connection hub stopped");
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> HubState {
        self.registry.read().await.state
    }

    /// Number of registered sessions.
    pub async fn connection_count(&self) -> usize {
        self.registry.read().await.sessions.len()
    }

    /// Whether a new session would be accepted right now.
    pub async fn has_capacity(&self) -> bool {
        let registry = self.registry.read().await;
        registry.state.is_accepting() && registry.sessions.len() < self.config.max_connections
    }

    /// Point-in-time counters.
    pub async fn stats(&self) -> HubStats {
        let registry = self.registry.read().await;
        HubStats {
            state: registry.state,
            connections: registry.sessions.len(),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}
