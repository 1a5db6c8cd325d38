//! Topic-based subscriber fan-out for real-time clients (spec §4.M).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::metrics::BusMetrics;

/// 30s keepalive probe; subscribers silent for longer than 60s are dropped.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
pub const SILENCE_TIMEOUT: Duration = Duration::from_secs(60);

/// A message delivered to a live-push subscriber: either a real published
/// payload, or a keepalive probe the transport layer (`otpgw-server`'s
/// websocket handler) should translate into a ping frame.
#[derive(Debug, Clone)]
pub enum PushMessage {
    Payload { topic: String, data: serde_json::Value },
    Keepalive,
}

struct Subscriber {
    topics: Vec<String>,
    sender: mpsc::UnboundedSender<PushMessage>,
    last_active: std::time::Instant,
}

/// Fan-out hub: subscribers register an opaque id and a set of topics they
/// want (`otp-requests`, `otp-events`); `publish` delivers to exactly the
/// subscribers currently registered for that topic.
pub struct LivePush {
    subscribers: RwLock<HashMap<String, Subscriber>>,
    metrics: Arc<BusMetrics>,
}

impl LivePush {
    #[must_use]
    pub fn new(metrics: Arc<BusMetrics>) -> Self {
        Self { subscribers: RwLock::new(HashMap::new()), metrics }
    }

    /// Register a subscriber and return the receiving half of its channel.
    /// The caller (the websocket handler) forwards every [`PushMessage`] to
    /// the client and calls [`Self::touch`] whenever a frame is received
    /// from the client, to keep the silence timer alive.
    pub async fn subscribe(&self, subscriber_id: impl Into<String>, topics: Vec<String>) -> mpsc::UnboundedReceiver<PushMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subs = self.subscribers.write().await;
        subs.insert(subscriber_id.into(), Subscriber { topics, sender: tx, last_active: std::time::Instant::now() });
        self.metrics.set_live_push_subscribers(subs.len() as u64);
        rx
    }

    pub async fn unsubscribe(&self, subscriber_id: &str) {
        let mut subs = self.subscribers.write().await;
        subs.remove(subscriber_id);
        self.metrics.set_live_push_subscribers(subs.len() as u64);
    }

    /// Record that a subscriber is still alive (received a pong, or sent a
    /// frame of its own).
    pub async fn touch(&self, subscriber_id: &str) {
        if let Some(sub) = self.subscribers.write().await.get_mut(subscriber_id) {
            sub.last_active = std::time::Instant::now();
        }
    }

    /// Publish `data` on `topic` to every currently-subscribed subscriber.
    /// Tolerates individual send failures (a disconnected subscriber is
    /// pruned on the next keepalive sweep, not here).
    pub async fn publish(&self, topic: &str, data: serde_json::Value) {
        let subs = self.subscribers.read().await;
        for sub in subs.values() {
            if sub.topics.iter().any(|t| t == topic) {
                let _ = sub.sender.send(PushMessage::Payload { topic: topic.to_owned(), data: data.clone() });
            }
        }
        drop(subs);
        self.metrics.increment_live_push_messages();
    }

    /// One keepalive sweep: send a probe to every subscriber, and drop
    /// subscribers silent for longer than [`SILENCE_TIMEOUT`]. Intended to
    /// be called on a [`KEEPALIVE_INTERVAL`] timer by the server's
    /// background task.
    pub async fn sweep(&self) {
        let mut subs = self.subscribers.write().await;
        let now = std::time::Instant::now();
        subs.retain(|id, sub| {
            if now.duration_since(sub.last_active) > SILENCE_TIMEOUT {
                debug!(subscriber = id, "dropping live-push subscriber: silent too long");
                return false;
            }
            let _ = sub.sender.send(PushMessage::Keepalive);
            true
        });
        self.metrics.set_live_push_subscribers(subs.len() as u64);
    }

    #[must_use]
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}
