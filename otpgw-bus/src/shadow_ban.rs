//! Fakes a channel-specific sequence of delivery events for shadow-banned
//! requests, through the same Event Bus real deliveries use, so storage,
//! live push, and webhooks are indistinguishable from a real delivery
//! (spec §4.K).

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use otpgw_core::{Channel, ChannelEventType, EventData, RequestId};

use crate::event_bus::EventBus;

/// A scheduled step: emit `event_type` after a delay drawn from `spread`.
struct Step {
    event_type: ChannelEventType,
    spread: DelaySpread,
}

/// Either a single base delay with a uniform `±jitter_ms` wobble, or an
/// explicit `[min, max]` range -- matching the two shapes in the spec's
/// delay table (a bare number vs. a "min–max" range).
#[derive(Debug, Clone, Copy)]
enum DelaySpread {
    Jittered { base_ms: u64, jitter_ms: u64 },
    Range { min_ms: u64, max_ms: u64 },
}

impl DelaySpread {
    fn sample(self) -> Duration {
        let ms = match self {
            Self::Jittered { base_ms, jitter_ms } => {
                let jitter = rand::thread_rng().gen_range(0..=2 * jitter_ms) as i64 - jitter_ms as i64;
                (base_ms as i64 + jitter).max(0) as u64
            }
            Self::Range { min_ms, max_ms } => rand::thread_rng().gen_range(min_ms..=max_ms),
        };
        Duration::from_millis(ms)
    }
}

fn sequence_for(channel: Channel) -> Vec<Step> {
    match channel {
        Channel::Sms => vec![
            Step { event_type: ChannelEventType::Sending, spread: DelaySpread::Jittered { base_ms: 300, jitter_ms: 500 } },
            Step { event_type: ChannelEventType::Sent, spread: DelaySpread::Jittered { base_ms: 800, jitter_ms: 500 } },
            Step { event_type: ChannelEventType::Delivered, spread: DelaySpread::Range { min_ms: 2500, max_ms: 4500 } },
        ],
        Channel::Voice => vec![
            Step { event_type: ChannelEventType::Calling, spread: DelaySpread::Jittered { base_ms: 300, jitter_ms: 500 } },
            Step { event_type: ChannelEventType::Ringing, spread: DelaySpread::Jittered { base_ms: 1200, jitter_ms: 500 } },
            Step { event_type: ChannelEventType::Answered, spread: DelaySpread::Range { min_ms: 3000, max_ms: 5000 } },
            Step { event_type: ChannelEventType::Playing, spread: DelaySpread::Range { min_ms: 4500, max_ms: 5500 } },
            Step { event_type: ChannelEventType::Completed, spread: DelaySpread::Range { min_ms: 12000, max_ms: 15000 } },
        ],
    }
}

/// Schedules the fake event sequence for a shadow-banned request.
pub struct ShadowBanSimulator {
    event_bus: Arc<EventBus>,
}

impl ShadowBanSimulator {
    #[must_use]
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self { event_bus }
    }

    /// Schedule the fake sequence for `(request_id, channel)`. Each step's
    /// delay is sampled cumulatively on top of the previous step's actual
    /// delay, so the schedule can never emit step N+1 before step N: a real
    /// synchronous dispatch can't regress its own status, and neither can
    /// this. Each step still runs as its own independently-scheduled task
    /// so a slow or never-arriving downstream failure in one can't stall
    /// the others.
    pub fn simulate(&self, request_id: RequestId, channel: Channel) {
        let mut elapsed = Duration::ZERO;
        for step in sequence_for(channel) {
            elapsed += step.spread.sample();
            let bus = Arc::clone(&self.event_bus);
            let id = request_id.clone();
            let delay = elapsed;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = bus.emit(&id, channel, step.event_type, EventData::new()).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live_push::LivePush;
    use crate::metrics::BusMetrics;
    use crate::webhook::{WebhookConfig, WebhookDispatcher};
    use otpgw_store::{MemoryStore, Store};

    fn sample_request(channel: Channel) -> otpgw_core::Request {
        let now = chrono::Utc::now();
        otpgw_core::Request {
            id: RequestId::generate(),
            phone: otpgw_core::Phone::new("+15551234567"),
            code_hash: otpgw_core::hash_code("123456"),
            status: otpgw_core::RequestStatus::Pending,
            channel_status: None,
            channel: None,
            auth_status: otpgw_core::AuthStatus::Unverified,
            channels_requested: vec![channel],
            ip_address: "203.0.113.5".to_owned(),
            ip_subnet: otpgw_core::derive_subnet("203.0.113.5"),
            asn: None,
            ip_country: None,
            phone_country: None,
            phone_prefix: None,
            fraud_score: 80,
            fraud_reasons: vec!["shadow_ban".to_owned()],
            shadow_banned: true,
            webhook_url: None,
            session_id: None,
            provider_id: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            expires_at: now + chrono::Duration::minutes(5),
            start_time: None,
            answer_time: None,
            end_time: None,
            sms_cost_units: 0,
            voice_cost_units: 0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sms_sequence_runs_through_to_delivered() {
        let store = Arc::new(MemoryStore::new());
        let metrics = Arc::new(BusMetrics::default());
        let live_push = Arc::new(LivePush::new(metrics.clone()));
        let webhook = Arc::new(WebhookDispatcher::new(WebhookConfig::default(), metrics.clone()));
        let bus = Arc::new(EventBus::new(store.clone(), live_push, webhook, metrics));

        let req = sample_request(Channel::Sms);
        store.create_request(&req).await.unwrap();

        let simulator = ShadowBanSimulator::new(bus);
        simulator.simulate(req.id.clone(), Channel::Sms);

        // Advance virtual time past even the slowest possible cumulative
        // schedule (sending + sent + delivered each at their max sample)
        // and let all spawned tasks run.
        tokio::time::advance(Duration::from_secs(7)).await;
        tokio::task::yield_now().await;

        let updated = store.get_request(&req.id).await.unwrap().unwrap();
        assert_eq!(updated.status, otpgw_core::RequestStatus::Delivered);
    }

    #[test]
    fn delay_spread_jittered_never_negative() {
        let spread = DelaySpread::Jittered { base_ms: 300, jitter_ms: 500 };
        for _ in 0..50 {
            let d = spread.sample();
            assert!(d.as_millis() <= 800);
        }
    }

    #[test]
    fn delay_spread_range_stays_within_bounds() {
        let spread = DelaySpread::Range { min_ms: 3000, max_ms: 5000 };
        for _ in 0..50 {
            let d = spread.sample();
            assert!(d.as_millis() >= 3000 && d.as_millis() <= 5000);
        }
    }
}
