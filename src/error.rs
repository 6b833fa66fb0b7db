//! IPC error types.
//!
//! [`IpcError`] is the single error type shared by the client and the hub.
//! Only connection establishment and local send failures reach callers;
//! inbound parse failures are logged and the frame is dropped.

/// Errors produced by the shell IPC layer.
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    /// The transport failed to open a connection.
    #[error("failed to connect: {0}")]
    Connection(String),

    /// An operation required an open connection and none is held.
    #[error("websocket is not connected")]
    NotConnected,

    /// The connection went away while a frame was being queued.
    #[error("connection closed")]
    ConnectionClosed,

    /// An inbound frame is not valid JSON or lacks the envelope shape.
    #[error("malformed message: {0}")]
    MessageParse(String),

    /// A message type was empty.
    #[error("message type must not be empty")]
    InvalidType,

    /// An outbound payload could not be serialized.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
