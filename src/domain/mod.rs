//! Domain layer: client identity, per-connection context, broadcast bus.
//!
//! These types describe the hub's view of connected widgets. The hub
//! service in [`crate::service`] coordinates them.

pub mod client_context;
pub mod client_id;
pub mod event_bus;

pub use client_context::{ClientContext, ClientInfo};
pub use client_id::ClientId;
pub use event_bus::{EventBus, OutboundFrame, TopicReceiver};
