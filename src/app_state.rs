//! Shared application state injected into the hub's Axum handlers.

use std::sync::Arc;

use crate::config::IpcConfig;
use crate::domain::EventBus;
use crate::service::IpcHub;
use crate::ws::connection::ConnectionOptions;

/// Shared application state available to handlers via Axum's `State`
/// extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Hub coordinating every widget connection.
    pub hub: Arc<IpcHub>,
    /// Largest inbound frame accepted, in bytes.
    pub max_message_bytes: usize,
    /// Idle timeout and default topics for each accepted connection.
    pub connection: ConnectionOptions,
}

impl AppState {
    /// Builds the hub and its event bus from configuration.
    #[must_use]
    pub fn from_config(config: &IpcConfig) -> Self {
        Self {
            hub: Arc::new(IpcHub::new(EventBus::new(config.broadcast_capacity))),
            max_message_bytes: config.max_message_bytes,
            connection: ConnectionOptions::from_config(config),
        }
    }
}
