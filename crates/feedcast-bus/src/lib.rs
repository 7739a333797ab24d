//! # feedcast-bus
//!
//! Publish/subscribe client hiding the broker's wire protocol behind
//! [`EventBus`].
//!
//! - [`InMemoryBus`]: per-topic `tokio::sync::broadcast` channels, for a
//!   single-process deployment and for tests
//! - [`NatsBus`]: NATS core protocol over TCP
//! - [`connect`]: pick a transport from an address (`memory://`, `nats://host:port`)
//! - [`feed`]: typed helpers for the `created_feed` topic
//!
//! Delivery is at-most-once. Handlers run on the bus's dispatch task and must
//! return quickly; hand long work to another task.

#![deny(unsafe_code)]

pub mod bus;
pub mod connect;
pub mod errors;
pub mod feed;
pub mod memory;
pub mod nats;

pub use bus::{BusMessage, EventBus, MessageHandler, Subscription};
pub use connect::{ConnectOptions, connect};
pub use errors::{BusError, Result};
pub use memory::InMemoryBus;
pub use nats::NatsBus;
