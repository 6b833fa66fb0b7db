//! Service layer: the hub coordinator.
//!
//! [`IpcHub`] is the central coordinator for all widget connections.

pub mod hub;

pub use hub::{HubListener, IpcHub};
