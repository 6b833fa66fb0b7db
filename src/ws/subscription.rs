//! Per-connection topic subscriptions.
//!
//! Tracks which broadcast topics (message types) a hub client receives and
//! provides server-side filtering of broadcasts.

use std::collections::HashSet;

/// Topic that matches every broadcast.
pub const WILDCARD_TOPIC: &str = "*";

/// Manages the set of broadcast topics for a single connection.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    /// Subscribed topics. If `subscribe_all` is true, this set is ignored.
    topics: HashSet<String>,
    /// Whether the client receives every broadcast (wildcard `"*"`).
    subscribe_all: bool,
}

impl SubscriptionManager {
    /// Creates a new empty subscription manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a manager already subscribed to `topics`.
    #[must_use]
    pub fn with_topics<S: AsRef<str>>(topics: &[S]) -> Self {
        let mut mgr = Self::new();
        mgr.subscribe(topics);
        mgr
    }

    /// Adds topics to the subscription set. `"*"` enables the wildcard.
    pub fn subscribe<S: AsRef<str>>(&mut self, topics: &[S]) {
        for topic in topics.iter().map(AsRef::as_ref) {
            if topic == WILDCARD_TOPIC {
                self.subscribe_all = true;
            } else if !topic.is_empty() {
                self.topics.insert(topic.to_string());
            }
        }
    }

    /// Removes topics from the subscription set. `"*"` disables the
    /// wildcard.
    pub fn unsubscribe<S: AsRef<str>>(&mut self, topics: &[S]) {
        for topic in topics.iter().map(AsRef::as_ref) {
            if topic == WILDCARD_TOPIC {
                self.subscribe_all = false;
            } else {
                self.topics.remove(topic);
            }
        }
    }

    /// Returns `true` if a broadcast on `topic` should reach this client.
    #[must_use]
    pub fn matches(&self, topic: &str) -> bool {
        self.subscribe_all || self.topics.contains(topic)
    }

    /// Returns the subscribed topics, sorted, with `"*"` first when the
    /// wildcard is active.
    #[must_use]
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.topics.iter().cloned().collect();
        topics.sort();
        if self.subscribe_all {
            topics.insert(0, WILDCARD_TOPIC.to_string());
        }
        topics
    }

    /// Returns the number of explicitly subscribed topics.
    #[must_use]
    pub fn count(&self) -> usize {
        self.topics.len()
    }

    /// Returns `true` if the wildcard subscription is active.
    #[must_use]
    pub fn is_subscribed_all(&self) -> bool {
        self.subscribe_all
    }
}
