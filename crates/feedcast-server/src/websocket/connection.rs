//! Per-subscriber session state.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use axum::extract::ws::Utf8Bytes;
use feedcast_core::SessionId;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Receiving end of a session's outbound queue, drained by its write loop.
pub type OutboundQueue = mpsc::Receiver<Utf8Bytes>;

/// Result of offering one frame to a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The frame is queued for the write loop.
    Queued,
    /// The queue is at capacity; the frame was dropped.
    Full,
    /// The session is closed; the frame was dropped.
    Closed,
}

/// One connected subscriber.
///
/// Holds the sending half of a bounded queue. The write loop owns the
/// receiving half and is the only writer to the transport.
pub struct Session {
    id: SessionId,
    remote_addr: Option<SocketAddr>,
    tx: Mutex<Option<mpsc::Sender<Utf8Bytes>>>,
    closed: CancellationToken,
    connected_at: Instant,
    last_seen: Mutex<Instant>,
    dropped_messages: AtomicU64,
    evicting: AtomicBool,
}

impl Session {
    /// Create a session whose queue holds up to `capacity` frames.
    pub fn new(remote_addr: Option<SocketAddr>, capacity: usize) -> (Arc<Self>, OutboundQueue) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let now = Instant::now();
        let session = Arc::new(Self {
            id: SessionId::new(),
            remote_addr,
            tx: Mutex::new(Some(tx)),
            closed: CancellationToken::new(),
            connected_at: now,
            last_seen: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
            evicting: AtomicBool::new(false),
        });
        (session, rx)
    }

    /// Locally generated session ID.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Peer address, for logging only.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Offer a frame without waiting.
    pub fn enqueue(&self, frame: Utf8Bytes) -> EnqueueOutcome {
        let tx = self.tx.lock();
        let Some(tx) = tx.as_ref() else {
            return EnqueueOutcome::Closed;
        };
        match tx.try_send(frame) {
            Ok(()) => EnqueueOutcome::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                EnqueueOutcome::Full
            }
            Err(mpsc::error::TrySendError::Closed(_)) => EnqueueOutcome::Closed,
        }
    }

    /// Close the outbound queue and signal the transport loops.
    ///
    /// Frames already queued are still written before the close frame.
    /// Returns `true` for the call that actually closed the session.
    pub fn close(&self) -> bool {
        let tx = self.tx.lock().take();
        self.closed.cancel();
        tx.is_some()
    }

    /// Whether [`Session::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Token cancelled when the session closes.
    pub fn closed_token(&self) -> &CancellationToken {
        &self.closed
    }

    /// Record inbound activity (any frame, including Pong).
    pub fn mark_seen(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    /// Time since the last inbound frame or since connecting.
    pub fn idle_for(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Frames dropped because the queue was full.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Flag the session for eviction. Returns `true` only the first time.
    pub(crate) fn mark_evicting(&self) -> bool {
        !self.evicting.swap(true, Ordering::AcqRel)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("closed", &self.is_closed())
            .field("dropped_messages", &self.drop_count())
            .finish_non_exhaustive()
    }
}
