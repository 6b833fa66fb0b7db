//! Hub service: routes widget messages to listeners and fans out
//! broadcasts.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::{ClientContext, EventBus, OutboundFrame};
use crate::error::IpcError;
use crate::ws::messages::{ShellMessage, decode_payload};
use crate::ws::registry::{Handle, ListenerRegistry, invoke_guarded, lock};

/// Callback signature for hub listeners.
pub type HubFn = dyn Fn(&ClientContext, &serde_json::Value) + Send + Sync;

/// Hub listener handle. Clone it to keep a reference for `unlisten`.
pub type HubListener = Handle<HubFn>;

impl Handle<HubFn> {
    /// Creates a listener over the sending client and the raw payload.
    pub fn new(
        callback: impl Fn(&ClientContext, &serde_json::Value) + Send + Sync + 'static,
    ) -> Self {
        let callback: Arc<HubFn> = Arc::new(callback);
        Self::from_arc(callback)
    }

    /// Creates a listener that decodes the payload into `T` first.
    ///
    /// Payloads that do not decode are logged and skipped.
    pub fn typed<T: DeserializeOwned + 'static>(
        callback: impl Fn(&ClientContext, T) + Send + Sync + 'static,
    ) -> Self {
        Self::new(move |ctx, payload| match decode_payload::<T>(payload) {
            Ok(value) => callback(ctx, value),
            Err(e) => {
                tracing::warn!(
                    client = %ctx.id(),
                    error = %e,
                    expected = std::any::type_name::<T>(),
                    "payload did not match listener type"
                );
            }
        })
    }
}

/// Coordinator shared by every hub connection.
///
/// Owns the listener registry for inbound messages and the [`EventBus`]
/// used for broadcasts. Listeners run synchronously on the connection task
/// of the client that sent the message.
#[derive(Debug)]
pub struct IpcHub {
    listeners: Mutex<ListenerRegistry<HubFn>>,
    event_bus: EventBus,
}

impl IpcHub {
    /// Creates a hub with no listeners.
    #[must_use]
    pub fn new(event_bus: EventBus) -> Self {
        Self {
            listeners: Mutex::new(ListenerRegistry::new()),
            event_bus,
        }
    }

    /// Returns a reference to the inner [`EventBus`].
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Registers `listener` for messages of `msg_type`.
    ///
    /// Registering the same handle twice for a type is a no-op.
    pub fn listen(&self, msg_type: &str, listener: &HubListener) {
        if !lock(&self.listeners).insert(msg_type, listener) {
            tracing::debug!(msg_type, "hub listener already registered");
        }
    }

    /// Removes `listener` from `msg_type`, or all listeners for the type
    /// when `listener` is `None`.
    pub fn unlisten(&self, msg_type: &str, listener: Option<&HubListener>) {
        let removed = lock(&self.listeners).remove(msg_type, listener);
        tracing::debug!(msg_type, removed, "hub listeners removed");
    }

    /// Returns the number of listeners registered for `msg_type`.
    #[must_use]
    pub fn listener_count(&self, msg_type: &str) -> usize {
        lock(&self.listeners).count(msg_type)
    }

    /// Runs every listener for `msg_type` with the sending client.
    ///
    /// Returns the number of listeners that completed without panicking.
    pub fn notify(
        &self,
        msg_type: &str,
        ctx: &ClientContext,
        payload: &serde_json::Value,
    ) -> usize {
        let listeners = lock(&self.listeners).snapshot(msg_type);
        if listeners.is_empty() {
            tracing::warn!(msg_type, client = %ctx.id(), "no listeners for message type");
            return 0;
        }
        listeners
            .iter()
            .filter(|l| invoke_guarded(msg_type, || (l.callback())(ctx, payload)))
            .count()
    }

    /// Publishes one envelope on the `msg_type` topic.
    ///
    /// Only connections subscribed to the topic write it to their socket.
    /// Returns the number of connections the frame was offered to.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::InvalidType`] or [`IpcError::Serialize`] if the
    /// envelope cannot be encoded.
    pub fn broadcast<T: Serialize>(&self, msg_type: &str, payload: T) -> Result<usize, IpcError> {
        let text = ShellMessage::new(msg_type, payload).to_json()?;
        let offered = self.event_bus.publish(OutboundFrame {
            topic: msg_type.to_string(),
            text,
        });
        tracing::trace!(msg_type, offered, "broadcast published");
        Ok(offered)
    }

    /// Returns the number of connected clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.event_bus.receiver_count()
    }
}
