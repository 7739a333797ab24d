//! NATS core protocol transport.
//!
//! Only the subset needed for plain publish/subscribe is spoken: `INFO`,
//! `CONNECT`, `PUB`, `SUB`, `UNSUB`, `MSG`, `PING`/`PONG`, `+OK`/`-ERR`.
//! Headers (`HMSG`) are never requested, so the server never sends them.

pub mod client;
pub mod codec;

pub use client::{NatsBus, NatsOptions};
pub use codec::{ClientOp, ConnectInfo, NatsCodec, ServerInfo, ServerOp};
