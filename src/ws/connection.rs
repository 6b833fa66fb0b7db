//! Hub-side WebSocket connection loop.
//!
//! Handles the read/write loop for a single widget connection:
//! identifying the client, dispatching its messages to hub listeners,
//! managing its broadcast topics, and forwarding broadcasts and direct
//! replies.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use super::messages::{
    HANDSHAKE_TYPE, Handshake, SUBSCRIBE_TYPE, SUBSCRIPTIONS_TYPE, ShellMessage, Subscription,
    UNSUBSCRIBE_TYPE,
};
use super::shutdown::finish_close;
use super::subscription::SubscriptionManager;
use crate::config::IpcConfig;
use crate::domain::{ClientContext, ClientInfo};
use crate::error::IpcError;
use crate::service::IpcHub;

/// Per-connection settings taken from [`IpcConfig`].
#[derive(Debug, Clone, Default)]
pub struct ConnectionOptions {
    /// Close the connection after this long without inbound frames.
    pub idle_timeout: Option<Duration>,
    /// Topics the connection is subscribed to when accepted.
    pub default_topics: Vec<String>,
}

impl ConnectionOptions {
    /// Extracts the connection settings from configuration.
    #[must_use]
    pub fn from_config(config: &IpcConfig) -> Self {
        Self {
            idle_timeout: config.idle_timeout(),
            default_topics: config.default_topics.clone(),
        }
    }
}

/// Runs the read/write loop for a single widget connection.
///
/// - Reads envelopes from the client and dispatches them to the hub.
/// - Forwards hub broadcasts on the topics the client is subscribed to.
/// - Forwards replies queued through the client's [`ClientContext`].
/// - Pings an idle client at half the idle timeout and closes it if the
///   full timeout passes without any inbound frame.
///
/// A malformed frame or an invalid control payload closes the connection.
pub async fn run_connection(socket: WebSocket, hub: Arc<IpcHub>, options: ConnectionOptions) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut events = hub.event_bus().subscribe(options.default_topics.as_slice());
    let (direct_tx, mut direct_rx) = mpsc::unbounded_channel();
    let mut ctx = ClientContext::new(direct_tx);
    let client = ctx.id();
    let ping_after = options.idle_timeout.map(|t| t / 2);
    let mut idle_deadline = ping_after.map(|d| Instant::now() + d);
    let mut pinged = false;
    tracing::debug!(%client, topics = ?events.subscriptions().topics(), "ws client connected");

    loop {
        tokio::select! {
            // Incoming message from client
            msg = ws_rx.next() => {
                idle_deadline = ping_after.map(|d| Instant::now() + d);
                pinged = false;
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let handled = handle_text_message(
                            &hub,
                            &mut ctx,
                            events.subscriptions_mut(),
                            text.as_str(),
                        );
                        if let Err(e) = handled {
                            tracing::error!(%client, error = %e, "closing connection");
                            let _ = ws_tx.send(Message::Close(None)).await;
                            finish_close(&mut ws_tx, &mut ws_rx).await;
                            break;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!(%client, ?frame, "client closed connection");
                        finish_close(&mut ws_tx, &mut ws_rx).await;
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(%client, error = %e, "ws read failed");
                        break;
                    }
                    None => break,
                }
            }
            // Reply queued by a listener for this client
            reply = direct_rx.recv() => {
                let Some(text) = reply else { break };
                if ws_tx.send(Message::text(text)).await.is_err() {
                    break;
                }
            }
            // Hub-wide broadcast on a subscribed topic
            event = events.recv() => {
                match event {
                    Ok(frame) => {
                        if ws_tx.send(Message::text(frame.text)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(%client, lagged = n, "ws client lagged behind broadcasts");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            // No inbound traffic for half the idle timeout
            () = sleep_until(idle_deadline) => {
                if pinged {
                    tracing::info!(%client, "closing idle connection");
                    let _ = ws_tx.send(Message::Close(None)).await;
                    finish_close(&mut ws_tx, &mut ws_rx).await;
                    break;
                }
                pinged = true;
                idle_deadline = ping_after.map(|d| Instant::now() + d);
                if ws_tx.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    let connected_secs = (Utc::now() - ctx.connected_at()).num_seconds();
    tracing::debug!(%client, connected_secs, "ws connection closed");
}

/// Sleeps until `deadline`, or forever when there is none.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Handles one text frame from a client.
///
/// Subscription changes are answered with the resulting topic list and are
/// accepted before the handshake. Returns an error when the connection
/// should be closed.
fn handle_text_message(
    hub: &IpcHub,
    ctx: &mut ClientContext,
    subscriptions: &mut SubscriptionManager,
    text: &str,
) -> Result<(), IpcError> {
    let msg = ShellMessage::parse(text)?;

    match msg.msg_type.as_str() {
        HANDSHAKE_TYPE => {
            let handshake: Handshake = msg.decode_payload()?;
            tracing::debug!(
                client = %ctx.id(),
                monitor_id = handshake.monitor_id,
                widget_name = %handshake.widget_name,
                "client identified"
            );
            ctx.identify(ClientInfo::from(handshake));
            return Ok(());
        }
        SUBSCRIBE_TYPE | UNSUBSCRIBE_TYPE => {
            let request: Subscription = msg.decode_payload()?;
            if msg.msg_type == SUBSCRIBE_TYPE {
                subscriptions.subscribe(request.topics.as_slice());
            } else {
                subscriptions.unsubscribe(request.topics.as_slice());
            }
            let topics = subscriptions.topics();
            tracing::debug!(
                client = %ctx.id(),
                count = subscriptions.count(),
                wildcard = subscriptions.is_subscribed_all(),
                ?topics,
                "subscriptions updated"
            );
            return ctx.send(SUBSCRIPTIONS_TYPE, Subscription { topics });
        }
        _ => {}
    }

    if ctx.info().is_none() {
        tracing::warn!(
            client = %ctx.id(),
            msg_type = %msg.msg_type,
            "message before handshake; dropping"
        );
        return Ok(());
    }

    hub.notify(&msg.msg_type, ctx, &msg.payload);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::domain::EventBus;
    use crate::service::HubListener;

    struct Fixture {
        hub: Arc<IpcHub>,
        ctx: ClientContext,
        replies: mpsc::UnboundedReceiver<String>,
        subscriptions: SubscriptionManager,
        hits: Arc<AtomicUsize>,
    }

    impl Fixture {
        fn handle(&mut self, text: &str) -> Result<(), IpcError> {
            handle_text_message(&self.hub, &mut self.ctx, &mut self.subscriptions, text)
        }
    }

    fn setup() -> Fixture {
        let hub = Arc::new(IpcHub::new(EventBus::new(8)));
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        hub.listen(
            "ping",
            &HubListener::new(move |_, _| {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let (tx, replies) = mpsc::unbounded_channel();
        Fixture {
            hub,
            ctx: ClientContext::new(tx),
            replies,
            subscriptions: SubscriptionManager::with_topics(&["monitor-info-response"]),
            hits,
        }
    }

    const HANDSHAKE: &str = r#"{"type":"handshake","payload":{"monitorId":0,"widgetName":"bar"}}"#;

    #[test]
    fn malformed_json_closes() {
        let mut fx = setup();
        assert!(matches!(fx.handle("not-json"), Err(IpcError::MessageParse(_))));
    }

    #[test]
    fn message_before_handshake_is_dropped() {
        let mut fx = setup();
        assert!(fx.handle(r#"{"type":"ping","payload":1}"#).is_ok());
        assert_eq!(fx.hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn handshake_then_dispatch() {
        let mut fx = setup();
        assert!(fx.handle(HANDSHAKE).is_ok());
        let Some(info) = fx.ctx.info() else {
            panic!("handshake not recorded");
        };
        assert_eq!(info.widget_name, "bar");

        assert!(fx.handle(r#"{"type":"ping","payload":1}"#).is_ok());
        assert_eq!(fx.hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalid_handshake_closes() {
        let mut fx = setup();
        assert!(fx.handle(r#"{"type":"handshake","payload":{"x":1}}"#).is_err());
        assert!(fx.ctx.info().is_none());
    }

    #[test]
    fn subscribe_updates_topics_and_replies() {
        let mut fx = setup();
        let result = fx.handle(r#"{"type":"subscribe","payload":{"topics":["appd-application-added"]}}"#);
        assert!(result.is_ok());
        assert!(fx.subscriptions.matches("appd-application-added"));
        assert!(fx.subscriptions.matches("monitor-info-response"));

        let Ok(reply) = fx.replies.try_recv() else {
            panic!("no subscriptions reply");
        };
        assert_eq!(
            reply,
            r#"{"type":"subscriptions","payload":{"topics":["appd-application-added","monitor-info-response"]}}"#
        );
    }

    #[test]
    fn unsubscribe_removes_default_topic() {
        let mut fx = setup();
        let result =
            fx.handle(r#"{"type":"unsubscribe","payload":{"topics":["monitor-info-response"]}}"#);
        assert!(result.is_ok());
        assert!(!fx.subscriptions.matches("monitor-info-response"));
        assert_eq!(fx.subscriptions.count(), 0);
    }

    #[test]
    fn subscription_changes_do_not_reach_listeners() {
        let mut fx = setup();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        fx.hub.listen(
            SUBSCRIBE_TYPE,
            &HubListener::new(move |_, _| {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert!(fx.handle(HANDSHAKE).is_ok());
        assert!(fx.handle(r#"{"type":"subscribe","payload":{"topics":["*"]}}"#).is_ok());
        assert!(fx.subscriptions.is_subscribed_all());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn invalid_subscription_payload_closes() {
        let mut fx = setup();
        assert!(fx.handle(r#"{"type":"subscribe","payload":"everything"}"#).is_err());
    }

    #[tokio::test]
    async fn missing_deadline_never_fires() {
        let fired = tokio::time::timeout(Duration::from_millis(20), sleep_until(None)).await;
        assert!(fired.is_err());
        let due = Some(Instant::now());
        assert!(tokio::time::timeout(Duration::from_millis(20), sleep_until(due)).await.is_ok());
    }
}
