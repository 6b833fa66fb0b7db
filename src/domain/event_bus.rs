//! Topic-scoped broadcast channel for hub-wide messages.
//!
//! [`EventBus`] wraps a [`tokio::sync::broadcast`] channel. Every hub
//! broadcast publishes one encoded [`OutboundFrame`] tagged with its topic.
//! Each connection holds a [`TopicReceiver`] that only yields the topics
//! that connection is subscribed to.

use tokio::sync::broadcast;

use crate::ws::subscription::SubscriptionManager;

/// An envelope already encoded as a JSON text frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    /// Topic the frame is published on: the envelope's message type.
    pub topic: String,
    /// Encoded `{type, payload}` envelope.
    pub text: String,
}

/// Broadcast bus for [`OutboundFrame`]s.
///
/// Backed by a `tokio::broadcast` channel with a configurable capacity.
/// When the ring buffer is full, the oldest frames are dropped for lagging
/// receivers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<OutboundFrame>,
}

impl EventBus {
    /// Creates a new `EventBus` with the given channel capacity.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes a frame to every receiver.
    ///
    /// Returns the number of receivers the frame was offered to; each one
    /// drops it unless subscribed to the frame's topic. If there are no
    /// receivers, the frame is silently dropped.
    pub fn publish(&self, frame: OutboundFrame) -> usize {
        self.sender.send(frame).unwrap_or(0)
    }

    /// Creates a receiver for future frames on `topics`.
    ///
    /// Each client connection calls this once when accepted.
    #[must_use]
    pub fn subscribe<S: AsRef<str>>(&self, topics: &[S]) -> TopicReceiver {
        TopicReceiver {
            rx: self.sender.subscribe(),
            subscriptions: SubscriptionManager::with_topics(topics),
        }
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Receiving end of the [`EventBus`] for one connection.
#[derive(Debug)]
pub struct TopicReceiver {
    rx: broadcast::Receiver<OutboundFrame>,
    subscriptions: SubscriptionManager,
}

impl TopicReceiver {
    /// Waits for the next frame on a subscribed topic.
    ///
    /// Cancel safe: a frame is either returned or was not for this
    /// receiver.
    ///
    /// # Errors
    ///
    /// Returns [`broadcast::error::RecvError::Lagged`] when frames were
    /// dropped for this receiver, and
    /// [`broadcast::error::RecvError::Closed`] once the bus is gone.
    pub async fn recv(&mut self) -> Result<OutboundFrame, broadcast::error::RecvError> {
        loop {
            let frame = self.rx.recv().await?;
            if self.subscriptions.matches(&frame.topic) {
                return Ok(frame);
            }
        }
    }

    /// Current topic subscriptions.
    #[must_use]
    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    /// Mutable access to the topic subscriptions.
    pub fn subscriptions_mut(&mut self) -> &mut SubscriptionManager {
        &mut self.subscriptions
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn frame(topic: &str) -> OutboundFrame {
        OutboundFrame {
            topic: topic.to_string(),
            text: format!(r#"{{"type":"{topic}","payload":null}}"#),
        }
    }

    #[test]
    fn publish_without_receivers_returns_zero() {
        let bus = EventBus::new(16);
        assert_eq!(bus.publish(frame("tick")), 0);
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_frame() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe(&["tick"]);
        let mut rx2 = bus.subscribe(&["tick"]);

        assert_eq!(bus.publish(frame("tick")), 2);

        let Ok(f1) = rx1.recv().await else {
            panic!("rx1 failed");
        };
        let Ok(f2) = rx2.recv().await else {
            panic!("rx2 failed");
        };
        assert_eq!(f1, f2);
        assert_eq!(f1.topic, "tick");
    }

    #[tokio::test]
    async fn unsubscribed_topics_are_skipped() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe(&["mouse-position-update"]);

        bus.publish(frame("notifd-notification"));
        bus.publish(frame("mouse-position-update"));

        let Ok(f) = rx.recv().await else {
            panic!("recv failed");
        };
        assert_eq!(f.topic, "mouse-position-update");
    }

    #[tokio::test]
    async fn subscription_changes_apply_to_later_frames() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe::<&str>(&[]);
        rx.subscriptions_mut().subscribe(&["*"]);
        assert!(rx.subscriptions().is_subscribed_all());

        bus.publish(frame("anything"));
        let Ok(f) = rx.recv().await else {
            panic!("recv failed");
        };
        assert_eq!(f.topic, "anything");
    }

    #[tokio::test]
    async fn lag_is_reported() {
        let bus = EventBus::new(1);
        let mut rx = bus.subscribe(&["tick"]);
        bus.publish(frame("tick"));
        bus.publish(frame("tick"));
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(1))
        ));
    }

    #[test]
    fn receiver_count_tracks_subscribers() {
        let bus = EventBus::new(16);
        assert_eq!(bus.receiver_count(), 0);

        let rx1 = bus.subscribe(&["tick"]);
        let _rx2 = bus.subscribe(&["tick"]);
        assert_eq!(bus.receiver_count(), 2);

        drop(rx1);
        assert_eq!(bus.receiver_count(), 1);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let bus = EventBus::new(0);
        let _rx = bus.subscribe(&["tick"]);
        assert_eq!(bus.publish(frame("tick")), 1);
    }
}
