//! Per-connection state handed to hub listeners.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use super::ClientId;
use crate::error::IpcError;
use crate::ws::messages::{Handshake, ShellMessage};

/// Identity a widget declares in its handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    /// Monitor the widget is displayed on.
    pub monitor_id: i64,
    /// Widget name as configured in the shell.
    pub widget_name: String,
}

impl From<Handshake> for ClientInfo {
    fn from(hs: Handshake) -> Self {
        Self {
            monitor_id: hs.monitor_id,
            widget_name: hs.widget_name,
        }
    }
}

/// One connected client as seen from a hub listener.
///
/// Cloning is cheap; a clone keeps a sender to the client's socket so a
/// listener may reply later. Identity info is a snapshot taken at clone
/// time.
#[derive(Debug, Clone)]
pub struct ClientContext {
    id: ClientId,
    connected_at: DateTime<Utc>,
    info: Option<ClientInfo>,
    outbound: mpsc::UnboundedSender<String>,
}

impl ClientContext {
    /// Creates the context for a freshly accepted connection.
    #[must_use]
    pub fn new(outbound: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id: ClientId::new(),
            connected_at: Utc::now(),
            info: None,
            outbound,
        }
    }

    /// Connection identifier.
    #[must_use]
    pub const fn id(&self) -> ClientId {
        self.id
    }

    /// When the socket was accepted.
    #[must_use]
    pub const fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Handshake identity, if the client has sent one.
    #[must_use]
    pub const fn info(&self) -> Option<&ClientInfo> {
        self.info.as_ref()
    }

    /// Records the client's handshake identity, replacing any earlier one.
    pub fn identify(&mut self, info: ClientInfo) {
        self.info = Some(info);
    }

    /// Sends one envelope to this client only.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::InvalidType`] or [`IpcError::Serialize`] if the
    /// envelope cannot be encoded, or [`IpcError::ConnectionClosed`] if the
    /// client has gone away.
    pub fn send<T: Serialize>(&self, msg_type: &str, payload: T) -> Result<(), IpcError> {
        let text = ShellMessage::new(msg_type, payload).to_json()?;
        self.outbound
            .send(text)
            .map_err(|_| IpcError::ConnectionClosed)
    }
}
