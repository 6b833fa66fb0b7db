//! # shell-ipc
//!
//! Typed JSON-over-WebSocket messaging between desktop shell widgets and
//! the shell process that hosts them.
//!
//! Every frame is a `{ "type": ..., "payload": ... }` envelope. Both ends
//! keep a registry of listeners keyed by message type and dispatch inbound
//! frames to them in registration order.
//!
//! ## Architecture
//!
//! ```text
//! Widget process                      Shell process
//!     │                                   │
//!     ├── ShellIpc (client/)  ── ws ──►   ├── /ws handler (ws/)
//!     │     └── ListenerRegistry          ├── IpcHub (service/)
//!     │                                   │     ├── ListenerRegistry
//!     │                                   │     └── EventBus (domain/)
//!     │                                   │           └── TopicReceiver per
//!     │                                   │               connection
//! ```

pub mod app_state;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod ws;
