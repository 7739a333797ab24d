//! # feedcast-core
//!
//! Foundation types shared by every feedcast crate:
//!
//! - **Events**: [`FeedCreatedEvent`], the immutable record published on the bus
//! - **Outbound messages**: [`OutboundMessage`], the closed set of frames pushed to clients
//! - **Branded IDs**: [`SessionId`], [`FeedId`] as newtypes over `String`
//! - **Logging**: [`logging::init_subscriber`] for the `tracing` subscriber

#![deny(unsafe_code)]

pub mod constants;
pub mod events;
pub mod ids;
pub mod logging;
pub mod messages;

pub use events::FeedCreatedEvent;
pub use ids::{FeedId, SessionId};
pub use messages::OutboundMessage;
