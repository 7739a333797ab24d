//! [`EventBus`] over a NATS server.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};

use super::codec::{ClientOp, ConnectInfo, NatsCodec, ServerInfo, ServerOp};
use crate::bus::{BusMessage, EventBus, MessageHandler, Subscription, validate_topic};
use crate::errors::{BusError, Result};

/// Frames queued for the writer task before `publish` starts waiting.
const OUTBOUND_CAPACITY: usize = 256;

/// Connection options for [`NatsBus::connect`].
#[derive(Clone, Debug)]
pub struct NatsOptions {
    /// Name announced in `CONNECT`.
    pub client_name: String,
    /// Upper bound on TCP connect plus handshake.
    pub connect_timeout: Duration,
    /// Username sent in `CONNECT`.
    pub user: Option<String>,
    /// Password sent in `CONNECT`.
    pub pass: Option<String>,
}

impl Default for NatsOptions {
    fn default() -> Self {
        Self {
            client_name: feedcast_core::constants::NAME.into(),
            connect_timeout: Duration::from_secs(2),
            user: None,
            pass: None,
        }
    }
}

struct Inner {
    server: ServerInfo,
    outbound: mpsc::Sender<ClientOp>,
    handlers: RwLock<HashMap<u64, (String, MessageHandler)>>,
    next_sid: AtomicU64,
    closed: CancellationToken,
    tasks: TaskTracker,
}

/// NATS client owning one TCP connection.
///
/// A reader task decodes server frames, answers `PING`s and calls handlers;
/// a writer task is the only code that touches the socket's write half.
/// Losing the socket closes the handle: there is no automatic reconnect.
pub struct NatsBus {
    inner: Arc<Inner>,
}

impl NatsBus {
    /// Connect to `addr` (`host:port`) and complete the handshake.
    ///
    /// Fails with [`BusError::Connection`] if the server is unreachable or
    /// does not answer within `options.connect_timeout`.
    #[instrument(skip(options), fields(client = %options.client_name))]
    pub async fn connect(addr: &str, options: &NatsOptions) -> Result<Self> {
        tokio::time::timeout(options.connect_timeout, Self::handshake(addr, options))
            .await
            .map_err(|_| {
                BusError::Connection(format!(
                    "timed out after {:?} connecting to {addr}",
                    options.connect_timeout
                ))
            })?
    }

    async fn handshake(addr: &str, options: &NatsOptions) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| BusError::Connection(format!("{addr}: {e}")))?;
        let _ = stream.set_nodelay(true);
        let mut framed = Framed::new(stream, NatsCodec::new());

        let server = match framed.next().await {
            Some(Ok(ServerOp::Info(info))) => info,
            Some(Ok(other)) => {
                return Err(BusError::Connection(format!(
                    "expected INFO from {addr}, got {other:?}"
                )));
            }
            Some(Err(e)) => return Err(e),
            None => return Err(BusError::Connection(format!("{addr} closed before INFO"))),
        };

        let mut connect = ConnectInfo::new(options.client_name.clone());
        connect.user.clone_from(&options.user);
        connect.pass.clone_from(&options.pass);
        framed.send(ClientOp::Connect(connect)).await?;
        framed.send(ClientOp::Ping).await?;

        // The server answers PONG once CONNECT is accepted, -ERR otherwise.
        loop {
            match framed.next().await {
                Some(Ok(ServerOp::Pong)) => break,
                Some(Ok(ServerOp::Ok | ServerOp::Info(_))) => {}
                Some(Ok(ServerOp::Ping)) => framed.send(ClientOp::Pong).await?,
                Some(Ok(ServerOp::Err(msg))) => {
                    return Err(BusError::Connection(format!("{addr} rejected CONNECT: {msg}")));
                }
                Some(Ok(ServerOp::Msg { .. })) => {
                    return Err(BusError::Protocol("MSG before any SUB".into()));
                }
                Some(Err(e)) => return Err(e),
                None => return Err(BusError::Connection(format!("{addr} closed during handshake"))),
            }
        }

        info!(
            addr,
            server_id = %server.server_id,
            version = %server.version,
            "connected to NATS"
        );
        Ok(Self::spawn(framed, server))
    }

    fn spawn(framed: Framed<TcpStream, NatsCodec>, server: ServerInfo) -> Self {
        let parts = framed.into_parts();
        let (read_half, write_half) = parts.io.into_split();
        let mut reader = FramedRead::new(read_half, NatsCodec::with_max_payload(server.max_payload));
        reader.read_buffer_mut().extend_from_slice(&parts.read_buf);
        let writer = FramedWrite::new(write_half, NatsCodec::new());

        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let inner = Arc::new(Inner {
            server,
            outbound,
            handlers: RwLock::new(HashMap::new()),
            next_sid: AtomicU64::new(1),
            closed: CancellationToken::new(),
            tasks: TaskTracker::new(),
        });

        let _ = inner
            .tasks
            .spawn(write_loop(writer, outbound_rx, inner.closed.clone()));
        let _ = inner.tasks.spawn(read_loop(reader, Arc::clone(&inner)));
        Self { inner }
    }

    /// `INFO` received during the handshake.
    pub fn server_info(&self) -> &ServerInfo {
        &self.inner.server
    }

    async fn enqueue(&self, op: ClientOp) -> Result<()> {
        if self.inner.closed.is_cancelled() {
            return Err(BusError::closed());
        }
        self.inner
            .outbound
            .send(op)
            .await
            .map_err(|_| BusError::closed())
    }
}

async fn write_loop(
    mut writer: FramedWrite<tokio::net::tcp::OwnedWriteHalf, NatsCodec>,
    mut rx: mpsc::Receiver<ClientOp>,
    closed: CancellationToken,
) {
    let mut healthy = true;
    loop {
        tokio::select! {
            () = closed.cancelled() => break,
            op = rx.recv() => {
                let Some(op) = op else { break };
                if let Err(e) = writer.send(op).await {
                    warn!(error = %e, "NATS write failed");
                    healthy = false;
                    break;
                }
            }
        }
    }
    // Publishes accepted before close still go out.
    rx.close();
    if healthy {
        while let Ok(op) = rx.try_recv() {
            if writer.feed(op).await.is_err() {
                break;
            }
        }
    }
    let _ = writer.close().await;
    closed.cancel();
    debug!("NATS writer exited");
}

async fn read_loop(
    mut reader: FramedRead<tokio::net::tcp::OwnedReadHalf, NatsCodec>,
    inner: Arc<Inner>,
) {
    loop {
        let frame = tokio::select! {
            () = inner.closed.cancelled() => break,
            frame = reader.next() => frame,
        };
        match frame {
            Some(Ok(ServerOp::Msg {
                subject,
                sid,
                payload,
                ..
            })) => {
                let handler = inner.handlers.read().get(&sid).map(|(_, h)| Arc::clone(h));
                match handler {
                    Some(handler) => handler(BusMessage {
                        topic: subject,
                        payload,
                    }),
                    None => debug!(sid, subject, "message for unknown subscription"),
                }
            }
            Some(Ok(ServerOp::Ping)) => {
                if inner.outbound.try_send(ClientOp::Pong).is_err() {
                    warn!("outbound queue full, PONG not sent");
                }
            }
            Some(Ok(ServerOp::Err(msg))) => {
                warn!(error = %BusError::Protocol(msg), "NATS server reported an error");
            }
            Some(Ok(ServerOp::Info(_) | ServerOp::Pong | ServerOp::Ok)) => {}
            Some(Err(e)) => {
                warn!(error = %e, "NATS read failed");
                break;
            }
            None => {
                info!("NATS server closed the connection");
                break;
            }
        }
    }
    inner.closed.cancel();
    inner.handlers.write().clear();
    debug!("NATS reader exited");
}

#[async_trait]
impl EventBus for NatsBus {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()> {
        validate_topic(topic)?;
        let max = self.inner.server.max_payload;
        if max > 0 && payload.len() > max {
            return Err(BusError::Publish(format!(
                "payload of {} bytes exceeds server max_payload {max}",
                payload.len()
            )));
        }
        self.enqueue(ClientOp::Pub {
            subject: topic.to_owned(),
            payload,
        })
        .await
    }

    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> Result<Subscription> {
        validate_topic(topic)?;
        let sid = self.inner.next_sid.fetch_add(1, Ordering::Relaxed);
        let _ = self
            .inner
            .handlers
            .write()
            .insert(sid, (topic.to_owned(), handler));

        if let Err(e) = self
            .enqueue(ClientOp::Sub {
                subject: topic.to_owned(),
                sid,
            })
            .await
        {
            let _ = self.inner.handlers.write().remove(&sid);
            return Err(e);
        }

        let token = self.inner.closed.child_token();
        let watcher_token = token.clone();
        let inner = Arc::clone(&self.inner);
        let _ = self.inner.tasks.spawn(async move {
            watcher_token.cancelled().await;
            if inner.handlers.write().remove(&sid).is_some() && !inner.closed.is_cancelled() {
                let _ = inner.outbound.send(ClientOp::Unsub { sid }).await;
                debug!(sid, "unsubscribed");
            }
        });

        debug!(topic, sid, "subscribed");
        Ok(Subscription::new(topic.to_owned(), sid, token))
    }

    async fn close(&self) {
        if self.inner.closed.is_cancelled() && self.inner.tasks.is_closed() {
            return;
        }
        self.inner.closed.cancel();
        let _ = self.inner.tasks.close();
        self.inner.tasks.wait().await;
        info!("NATS connection closed");
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }
}

impl Drop for NatsBus {
    fn drop(&mut self) {
        self.inner.closed.cancel();
    }
}
