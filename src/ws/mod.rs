//! WebSocket layer: envelope, listener registry, hub connections.
//!
//! [`messages`], [`registry`] and [`shutdown`] are shared by the client and
//! the hub. [`handler`], [`connection`] and [`subscription`] serve the hub
//! endpoint at `/ws`.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod registry;
pub mod shutdown;
pub mod subscription;
