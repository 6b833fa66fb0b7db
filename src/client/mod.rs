//! Client side: one WebSocket connection with type-keyed dispatch.
//!
//! [`ShellIpc`] is an explicit connection object. The application creates
//! it once and hands clones to whoever needs to send or listen; all clones
//! share the same connection and the same listener registry.
//!
//! ```no_run
//! # async fn demo() -> Result<(), shell_ipc::error::IpcError> {
//! use shell_ipc::client::{Listener, ShellIpc};
//!
//! let ipc = ShellIpc::connect("ws://127.0.0.1:7000/ws").await?;
//! let on_ping = Listener::typed(|n: u64| tracing::info!(n, "ping"));
//! ipc.listen("ping", &on_ping);
//! ipc.send("pong", 1)?;
//! # Ok(())
//! # }
//! ```

mod connection;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

use crate::config::IpcConfig;
use crate::error::IpcError;
use crate::ws::messages::{
    HANDSHAKE_TYPE, Handshake, SUBSCRIBE_TYPE, ShellMessage, Subscription, UNSUBSCRIBE_TYPE,
    decode_payload,
};
use crate::ws::registry::{Handle, ListenerRegistry, invoke_guarded, lock};

/// Callback signature for client listeners.
pub type PayloadFn = dyn Fn(&serde_json::Value) + Send + Sync;

/// Client listener handle. Clone it to keep a reference for `unlisten`.
pub type Listener = Handle<PayloadFn>;

impl Handle<PayloadFn> {
    /// Creates a listener over the raw JSON payload.
    pub fn new(callback: impl Fn(&serde_json::Value) + Send + Sync + 'static) -> Self {
        let callback: Arc<PayloadFn> = Arc::new(callback);
        Self::from_arc(callback)
    }

    /// Creates a listener that decodes the payload into `T` first.
    ///
    /// Payloads that do not decode are logged and skipped.
    pub fn typed<T: DeserializeOwned + 'static>(
        callback: impl Fn(T) + Send + Sync + 'static,
    ) -> Self {
        Self::new(move |payload| match decode_payload::<T>(payload) {
            Ok(value) => callback(value),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    expected = std::any::type_name::<T>(),
                    "payload did not match listener type"
                );
            }
        })
    }
}

/// Connection lifecycle as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection is held.
    Disconnected,
    /// A connection attempt is in flight and none is held yet.
    Connecting,
    /// A connection is open and `send` may be used.
    Open,
}

/// Handle to the outbound side of the current connection.
#[derive(Debug, Default)]
struct Link {
    /// Queue drained by the connection task. `None` when disconnected.
    outbound: Option<mpsc::UnboundedSender<String>>,
    /// Generation of the connection that owns `outbound`.
    generation: u64,
    /// Number of `open` calls still waiting on the transport.
    connecting: usize,
}

#[derive(Debug, Default)]
struct Shared {
    link: Mutex<Link>,
    listeners: Mutex<ListenerRegistry<PayloadFn>>,
    generations: AtomicU64,
}

impl Shared {
    /// Parses a text frame and runs every listener for its type.
    fn dispatch(&self, text: &str) {
        let msg = match ShellMessage::parse(text) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed frame");
                return;
            }
        };

        let listeners = lock(&self.listeners).snapshot(&msg.msg_type);
        if listeners.is_empty() {
            tracing::trace!(msg_type = %msg.msg_type, "no listener for message");
            return;
        }
        for listener in &listeners {
            invoke_guarded(&msg.msg_type, || (listener.callback())(&msg.payload));
        }
    }

    /// Forgets the connection of `generation` if it is still current.
    fn release(&self, generation: u64) {
        let mut link = lock(&self.link);
        if link.generation == generation && link.outbound.is_some() {
            link.outbound = None;
            tracing::info!(generation, "shell ipc connection closed");
        }
    }
}

/// Counts one in-flight `open` until it is installed or dropped.
struct Pending<'a> {
    shared: &'a Shared,
    active: bool,
}

impl<'a> Pending<'a> {
    fn begin(shared: &'a Shared) -> Self {
        lock(&shared.link).connecting += 1;
        Self {
            shared,
            active: true,
        }
    }

    /// Ends the attempt and stores the new connection under one lock, so
    /// `state()` moves straight from `Connecting` to `Open`.
    ///
    /// Returns the outbound queue of the connection being replaced.
    fn install(
        mut self,
        outbound: mpsc::UnboundedSender<String>,
        generation: u64,
    ) -> Option<mpsc::UnboundedSender<String>> {
        let shared = self.shared;
        let mut link = lock(&shared.link);
        link.connecting = link.connecting.saturating_sub(1);
        self.active = false;
        link.generation = generation;
        link.outbound.replace(outbound)
    }
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        if self.active {
            let mut link = lock(&self.shared.link);
            link.connecting = link.connecting.saturating_sub(1);
        }
    }
}

/// A single shell IPC connection with its listener registry.
#[derive(Debug, Clone, Default)]
pub struct ShellIpc {
    shared: Arc<Shared>,
}

impl ShellIpc {
    /// Creates a disconnected instance with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an instance and opens a connection to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::Connection`] if the transport fails to open.
    pub async fn connect(url: &str) -> Result<Self, IpcError> {
        let ipc = Self::new();
        ipc.open(url).await?;
        Ok(ipc)
    }

    /// Creates an instance and opens a connection to the configured URL.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::Connection`] if the transport fails to open.
    pub async fn connect_from_config(config: &IpcConfig) -> Result<Self, IpcError> {
        Self::connect(&config.url).await
    }

    /// Opens a connection to `url` and starts dispatching inbound frames.
    ///
    /// A connection that is already held is replaced and closed. There is
    /// no timeout: a transport that never answers keeps this pending.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::Connection`] carrying the transport's message if
    /// the handshake fails.
    pub async fn open(&self, url: &str) -> Result<(), IpcError> {
        let pending = Pending::begin(&self.shared);

        let socket = match tokio_tungstenite::connect_async(url).await {
            Ok((socket, _response)) => socket,
            Err(e) => {
                tracing::error!(url, error = %e, "websocket connection failed");
                return Err(IpcError::Connection(e.to_string()));
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let generation = self.shared.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let replaced = pending.install(tx, generation);
        if replaced.is_some() {
            tracing::debug!(url, "replacing previous shell ipc connection");
        }

        tokio::spawn(connection::run_connection(
            socket,
            rx,
            Arc::clone(&self.shared),
            generation,
        ));
        tracing::info!(url, generation, "shell ipc connected");
        Ok(())
    }

    /// Returns the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        let link = lock(&self.shared.link);
        match &link.outbound {
            Some(tx) if !tx.is_closed() => ConnectionState::Open,
            _ if link.connecting > 0 => ConnectionState::Connecting,
            _ => ConnectionState::Disconnected,
        }
    }

    /// Returns `true` if a connection is held and open.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Sends one `{type, payload}` envelope as a text frame.
    ///
    /// The frame is queued for the connection task; there is no delivery
    /// confirmation.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::NotConnected`] if no connection is held,
    /// [`IpcError::InvalidType`] for an empty type,
    /// [`IpcError::Serialize`] if the payload is not representable as JSON,
    /// or [`IpcError::ConnectionClosed`] if the connection went away.
    pub fn send<T: Serialize>(&self, msg_type: &str, payload: T) -> Result<(), IpcError> {
        let link = lock(&self.shared.link);
        let Some(tx) = link.outbound.as_ref().filter(|tx| !tx.is_closed()) else {
            return Err(IpcError::NotConnected);
        };
        let text = ShellMessage::new(msg_type, payload).to_json()?;
        tx.send(text).map_err(|_| IpcError::ConnectionClosed)
    }

    /// Identifies this client to the hub.
    ///
    /// # Errors
    ///
    /// Same as [`ShellIpc::send`].
    pub fn handshake(&self, handshake: &Handshake) -> Result<(), IpcError> {
        self.send(HANDSHAKE_TYPE, handshake)
    }

    /// Asks the hub to also forward broadcasts on `topics`. `"*"` requests
    /// every topic. The hub answers with a `subscriptions` message listing
    /// the resulting set.
    ///
    /// # Errors
    ///
    /// Same as [`ShellIpc::send`].
    pub fn subscribe(&self, topics: &[&str]) -> Result<(), IpcError> {
        self.send(SUBSCRIBE_TYPE, topic_request(topics))
    }

    /// Asks the hub to stop forwarding broadcasts on `topics`.
    ///
    /// # Errors
    ///
    /// Same as [`ShellIpc::send`].
    pub fn unsubscribe(&self, topics: &[&str]) -> Result<(), IpcError> {
        self.send(UNSUBSCRIBE_TYPE, topic_request(topics))
    }

    /// Registers `listener` for messages of `msg_type`.
    ///
    /// Registering the same handle twice for a type is a no-op. Listeners
    /// may be registered before a connection is opened.
    pub fn listen(&self, msg_type: &str, listener: &Listener) {
        if !lock(&self.shared.listeners).insert(msg_type, listener) {
            tracing::debug!(msg_type, "listener already registered");
        }
    }

    /// Removes `listener` from `msg_type`, or all listeners for the type
    /// when `listener` is `None`.
    pub fn unlisten(&self, msg_type: &str, listener: Option<&Listener>) {
        let removed = lock(&self.shared.listeners).remove(msg_type, listener);
        tracing::debug!(msg_type, removed, "listeners removed");
    }

    /// Returns the number of listeners registered for `msg_type`.
    #[must_use]
    pub fn listener_count(&self, msg_type: &str) -> usize {
        lock(&self.shared.listeners).count(msg_type)
    }

    /// Closes the connection, if any, and clears every listener.
    pub fn disconnect(&self) {
        let closed = lock(&self.shared.link).outbound.take();
        if closed.is_some() {
            tracing::info!("shell ipc disconnecting");
        }
        lock(&self.shared.listeners).clear();
    }
}

fn topic_request(topics: &[&str]) -> Subscription {
    Subscription {
        topics: topics.iter().map(ToString::to_string).collect(),
    }
}
