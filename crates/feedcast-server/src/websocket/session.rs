//! Transport loops for one WebSocket session.
//!
//! Each session runs exactly two loops: the write loop, the only code that
//! writes to the socket, and the read loop, which watches for close or error
//! and unregisters the session exactly once.

use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use metrics::{counter, gauge, histogram};
use tracing::{debug, info, instrument, warn};

use super::connection::{OutboundQueue, Session};
use super::hub::Hub;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

/// Keepalive timings for the write loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Heartbeat {
    /// Interval between server-initiated Ping frames.
    pub ping_interval: Duration,
    /// Inbound silence after which the peer is considered dead. Also bounds a
    /// single blocked write.
    pub pong_timeout: Duration,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(60),
        }
    }
}

/// Drive an upgraded socket until it closes.
///
/// Spawns the write loop on the hub's tracker, registers the session, then
/// runs the read loop on the current task. A session refused by the hub gets
/// a close frame and nothing else.
#[instrument(skip_all)]
pub async fn serve_socket(
    socket: WebSocket,
    remote_addr: Option<SocketAddr>,
    hub: Arc<Hub>,
    heartbeat: Heartbeat,
) {
    let (session, outbound) = hub.open_session(remote_addr);
    let (sink, stream) = socket.split();
    hub.spawn_writer(run_write_loop(sink, outbound, Arc::clone(&session), heartbeat));

    if let Err(e) = hub.register(Arc::clone(&session)).await {
        warn!(session_id = %session.id(), remote = ?session.remote_addr(), error = %e, "session refused");
        let _ = session.close();
        return;
    }

    info!(session_id = %session.id(), remote = ?session.remote_addr(), "client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    run_read_loop(stream, Arc::clone(&session), hub).await;

    info!(
        session_id = %session.id(),
        dropped = session.drop_count(),
        "client disconnected"
    );
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(session.age().as_secs_f64());
}

/// Forward queued frames to `sink` and keep the peer alive with pings.
///
/// Ends after writing a close frame once the queue is closed and empty, or
/// as soon as a write fails or blocks longer than `pong_timeout`.
pub async fn run_write_loop<S>(
    mut sink: S,
    mut outbound: OutboundQueue,
    session: Arc<Session>,
    heartbeat: Heartbeat,
) where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let mut ping = tokio::time::interval(heartbeat.ping_interval);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            biased;
            frame = outbound.recv() => {
                let Some(text) = frame else {
                    let _ = send_bounded(&mut sink, Message::Close(None), heartbeat.pong_timeout).await;
                    break;
                };
                if let Err(e) = send_bounded(&mut sink, Message::Text(text), heartbeat.pong_timeout).await {
                    debug!(session_id = %session.id(), error = %e, "write failed");
                    let _ = session.close();
                    break;
                }
            }
            _ = ping.tick() => {
                let idle = session.idle_for();
                if idle > heartbeat.pong_timeout {
                    warn!(session_id = %session.id(), ?idle, "client unresponsive, closing");
                    // Closing ends the queue; the next recv drains it.
                    let _ = session.close();
                    continue;
                }
                if let Err(e) = send_bounded(&mut sink, Message::Ping(Bytes::new()), heartbeat.pong_timeout).await {
                    debug!(session_id = %session.id(), error = %e, "ping failed");
                    let _ = session.close();
                    break;
                }
            }
        }
    }
    let _ = tokio::time::timeout(heartbeat.pong_timeout, sink.close()).await;
}

async fn send_bounded<S>(sink: &mut S, message: Message, limit: Duration) -> Result<(), String>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    match tokio::time::timeout(limit, sink.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("write blocked for more than {limit:?}")),
    }
}

/// Watch the inbound half until the peer leaves or the session is closed,
/// then unregister the session.
///
/// Inbound frames are not interpreted; any frame counts as liveness.
pub async fn run_read_loop<R, E>(mut stream: R, session: Arc<Session>, hub: Arc<Hub>)
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let closed = session.closed_token().clone();
    loop {
        let frame = tokio::select! {
            () = closed.cancelled() => break,
            frame = stream.next() => frame,
        };
        match frame {
            Some(Ok(Message::Close(_))) => {
                debug!(session_id = %session.id(), "client sent close frame");
                break;
            }
            Some(Ok(_)) => session.mark_seen(),
            Some(Err(e)) => {
                debug!(session_id = %session.id(), error = %e, "read failed");
                break;
            }
            None => break,
        }
    }
    let _ = hub.unregister(session.id()).await;
}
