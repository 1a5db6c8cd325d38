use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters tracking Event Bus and fan-out activity.
///
/// All counters use relaxed ordering; call [`snapshot`](Self::snapshot) for
/// a consistent point-in-time view.
#[derive(Debug, Default)]
pub struct BusMetrics {
    pub events_emitted: AtomicU64,
    pub duplicates_suppressed: AtomicU64,
    pub webhooks_enqueued: AtomicU64,
    pub webhooks_delivered: AtomicU64,
    pub webhooks_failed: AtomicU64,
    pub live_push_messages: AtomicU64,
    pub live_push_subscribers: AtomicU64,
}

impl BusMetrics {
    pub fn increment_events_emitted(&self) {
        self.events_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_duplicates_suppressed(&self) {
        self.duplicates_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_webhooks_enqueued(&self) {
        self.webhooks_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_webhooks_delivered(&self) {
        self.webhooks_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_webhooks_failed(&self) {
        self.webhooks_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_live_push_messages(&self) {
        self.live_push_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_live_push_subscribers(&self, count: u64) {
        self.live_push_subscribers.store(count, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
            duplicates_suppressed: self.duplicates_suppressed.load(Ordering::Relaxed),
            webhooks_enqueued: self.webhooks_enqueued.load(Ordering::Relaxed),
            webhooks_delivered: self.webhooks_delivered.load(Ordering::Relaxed),
            webhooks_failed: self.webhooks_failed.load(Ordering::Relaxed),
            live_push_messages: self.live_push_messages.load(Ordering::Relaxed),
            live_push_subscribers: self.live_push_subscribers.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub events_emitted: u64,
    pub duplicates_suppressed: u64,
    pub webhooks_enqueued: u64,
    pub webhooks_delivered: u64,
    pub webhooks_failed: u64,
    pub live_push_messages: u64,
    pub live_push_subscribers: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_metrics_are_zero() {
        let m = BusMetrics::default();
        assert_eq!(m.snapshot().events_emitted, 0);
    }

    #[test]
    fn increment_and_snapshot() {
        let m = BusMetrics::default();
        m.increment_events_emitted();
        m.increment_events_emitted();
        m.increment_duplicates_suppressed();
        m.increment_webhooks_enqueued();
        m.set_live_push_subscribers(3);

        let snap = m.snapshot();
        assert_eq!(snap.events_emitted, 2);
        assert_eq!(snap.duplicates_suppressed, 1);
        assert_eq!(snap.webhooks_enqueued, 1);
        assert_eq!(snap.live_push_subscribers, 3);
    }
}
