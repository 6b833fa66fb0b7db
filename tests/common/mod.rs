//! Shared helpers for integration tests.

#![allow(clippy::panic, dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;

use shell_ipc::app_state::AppState;
use shell_ipc::client::Listener;
use shell_ipc::config::IpcConfig;
use shell_ipc::ws::handler::router;

/// How long a test waits for an expected event.
pub const WAIT: Duration = Duration::from_secs(5);

/// Binds a raw WebSocket peer on an ephemeral port and runs `handler` on
/// the first accepted connection.
pub async fn spawn_peer<F, Fut>(handler: F) -> SocketAddr
where
    F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let Ok(listener) = TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind failed");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("no local addr");
    };
    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        if let Ok(ws) = tokio_tungstenite::accept_async(stream).await {
            handler(ws).await;
        }
    });
    addr
}

/// Serves the hub router on an ephemeral port with default settings.
pub async fn spawn_hub() -> (SocketAddr, AppState) {
    spawn_hub_with(&IpcConfig::default()).await
}

/// Serves the hub router built from `config` on an ephemeral port.
pub async fn spawn_hub_with(config: &IpcConfig) -> (SocketAddr, AppState) {
    let state = AppState::from_config(config);
    let app = router(state.clone());
    let Ok(listener) = TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind failed");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("no local addr");
    };
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, state)
}

/// Listener that forwards every payload into a channel.
pub fn channel_listener() -> (Listener, mpsc::UnboundedReceiver<Value>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let listener = Listener::new(move |payload| {
        let _ = tx.send(payload.clone());
    });
    (listener, rx)
}

/// Waits for the next payload or panics after [`WAIT`].
pub async fn next_payload(rx: &mut mpsc::UnboundedReceiver<Value>) -> Value {
    match tokio::time::timeout(WAIT, rx.recv()).await {
        Ok(Some(value)) => value,
        Ok(None) => panic!("listener channel closed"),
        Err(_) => panic!("timed out waiting for payload"),
    }
}

/// Polls `check` until it holds or panics after [`WAIT`].
pub async fn wait_until(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check() {
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not reached in time");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
