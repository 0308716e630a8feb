//! In-memory notification topics.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::trace;

use zhmc_core::Notification;

const TOPIC_CAPACITY: usize = 256;

/// Registry of broadcast channels, one per topic name.
#[derive(Debug, Default)]
pub(crate) struct TopicRegistry {
    topics: Mutex<HashMap<String, broadcast::Sender<Notification>>>,
}

impl TopicRegistry {
    fn sender(&self, topic: &str) -> broadcast::Sender<Notification> {
        self.topics
            .lock()
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }

    /// Publish to a topic; subscribers that are not keeping up lag.
    pub(crate) fn publish(&self, topic: &str, notification: Notification) {
        trace!(topic, "publishing mock notification");
        // No receivers is fine; the notification is simply dropped.
        let _ = self.sender(topic).send(notification);
    }

    /// Subscribe to a topic.
    pub(crate) fn subscribe(&self, topic: &str) -> broadcast::Receiver<Notification> {
        self.sender(topic).subscribe()
    }

    /// Number of live subscriptions on a topic.
    pub(crate) fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .get(topic)
            .map_or(0, broadcast::Sender::receiver_count)
    }
}
