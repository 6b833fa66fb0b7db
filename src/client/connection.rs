//! Client connection task.
//!
//! Owns the socket for one connection: drains the outbound queue onto the
//! socket and dispatches inbound text frames until either side closes.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::Shared;
use crate::ws::shutdown::finish_close;

/// Runs the read/write loop for one client connection.
///
/// - Writes queued frames in the order `send` accepted them.
/// - Dispatches inbound text frames on this task, one at a time.
/// - Sends a close frame when the outbound queue is dropped.
/// - Completes the close handshake whichever side starts it.
pub(super) async fn run_connection(
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    shared: Arc<Shared>,
    generation: u64,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Whether a Close frame was exchanged and the handshake needs finishing.
    let closing = loop {
        tokio::select! {
            // Incoming frame from the peer
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => shared.dispatch(text.as_str()),
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!(generation, ?frame, "peer closed connection");
                        break true;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(generation, error = %e, "websocket read failed");
                        break false;
                    }
                    None => break false,
                }
            }
            // Frame queued by `send`
            frame = outbound.recv() => {
                match frame {
                    Some(text) => {
                        if let Err(e) = ws_tx.send(Message::text(text)).await {
                            tracing::warn!(generation, error = %e, "websocket write failed");
                            break false;
                        }
                    }
                    None => match ws_tx.close().await {
                        Ok(()) => break true,
                        Err(e) => {
                            tracing::debug!(generation, error = %e, "close handshake failed");
                            break false;
                        }
                    },
                }
            }
        }
    };

    outbound.close();
    shared.release(generation);
    if closing {
        finish_close(&mut ws_tx, &mut ws_rx).await;
    }
    tracing::debug!(generation, "ws connection task finished");
}
