//! The single public entry point for channel status changes (spec §4.E).

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use otpgw_core::{
    map_channel_event, Channel, ChannelEventType, EventData, EventEmitter, RequestId, RequestPatch,
};
use otpgw_store::Store;

use crate::error::BusError;
use crate::live_push::LivePush;
use crate::metrics::BusMetrics;
use crate::webhook::{build_payload, WebhookDispatcher, WebhookJob};

/// Validates, persists, resolves status, and fans out every channel event
/// in the system. Nothing else is permitted to write `Request::status` or
/// `Request::channel_status` directly (spec §4.F doc comment).
pub struct EventBus {
    store: Arc<dyn Store>,
    live_push: Arc<LivePush>,
    webhook: Arc<WebhookDispatcher>,
    metrics: Arc<BusMetrics>,
}

impl EventBus {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, live_push: Arc<LivePush>, webhook: Arc<WebhookDispatcher>, metrics: Arc<BusMetrics>) -> Self {
        Self { store, live_push, webhook, metrics }
    }

    /// Core event-processing pipeline (spec §4.E steps 1-5). Returns
    /// `Ok(None)` when the event was a suppressed duplicate, `Ok(Some(event_id))`
    /// otherwise.
    pub async fn emit(
        &self,
        request_id: &RequestId,
        channel: Channel,
        event_type: ChannelEventType,
        event_data: EventData,
    ) -> Result<Option<i64>, BusError> {
        if event_type.is_terminal_delivery() && self.store.has_terminal_event(request_id, channel).await? {
            self.metrics.increment_duplicates_suppressed();
            return Ok(None);
        }

        let Some(current) = self.store.get_request(request_id).await? else {
            return Err(BusError::RequestNotFound(request_id.as_str().to_owned()));
        };

        let otp_played = event_data.get("otp_played").and_then(serde_json::Value::as_bool).unwrap_or(false);
        let new_status = map_channel_event(channel, event_type, otp_played);

        if !current.status.is_valid_transition(new_status) {
            warn!(
                request_id = %request_id.as_str(),
                from = %current.status,
                to = %new_status,
                "applying out-of-order status transition"
            );
        }

        let patch = RequestPatch {
            status: (current.status != new_status).then_some(new_status),
            channel_status: Some(event_type),
            channel: Some(channel),
            error_message: event_data.get("error").and_then(serde_json::Value::as_str).map(str::to_owned),
            provider_id: event_data.get("provider_id").and_then(serde_json::Value::as_str).map(str::to_owned),
            ..Default::default()
        };

        let event_id = self
            .store
            .append_event_and_update_request(request_id, channel, event_type, event_data.clone(), &patch)
            .await?;
        self.metrics.increment_events_emitted();

        self.fan_out(request_id, channel, event_type, new_status, &current, &event_data).await;

        Ok(Some(event_id))
    }

    /// Best-effort publish to Live Push and enqueue of a webhook job.
    /// Failures here must never unwind into `emit`'s caller -- the event is
    /// already durably persisted.
    async fn fan_out(
        &self,
        request_id: &RequestId,
        channel: Channel,
        event_type: ChannelEventType,
        status: otpgw_core::RequestStatus,
        request: &otpgw_core::Request,
        event_data: &EventData,
    ) {
        let status_str = status.to_string();
        let channel_str = channel.as_str();

        let granular = serde_json::json!({
            "event": event_type.as_str(),
            "request_id": request_id.as_str(),
            "channel": channel_str,
            "status": status_str,
            "event_data": event_data,
        });
        self.live_push.publish("otp-events", granular).await;

        let legacy = serde_json::json!({
            "request_id": request_id.as_str(),
            "status": status_str,
            "channel": channel_str,
            "phone": request.phone.as_str(),
            "session_id": request.session_id,
            "timestamp": chrono::Utc::now(),
        });
        self.live_push.publish("otp-requests", legacy).await;

        if let Some(url) = request.webhook_url.clone() {
            let event_name = format!("otp.{channel_str}.{}", event_type.as_str());
            let payload = build_payload(
                &event_name,
                request_id,
                request.session_id.as_deref(),
                request.phone.as_str(),
                &status_str,
                channel,
                event_data.clone(),
            );
            self.webhook.enqueue(WebhookJob { url, payload });
        }
    }
}

#[async_trait]
impl EventEmitter for EventBus {
    async fn emit(&self, request_id: &RequestId, channel: Channel, event_type: ChannelEventType, event_data: EventData) {
        if let Err(err) = EventBus::emit(self, request_id, channel, event_type, event_data).await {
            warn!(request_id = %request_id.as_str(), error = %err, "event bus emit failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otpgw_store::MemoryStore;

    fn sample_request(webhook_url: Option<&str>) -> otpgw_core::Request {
        let now = chrono::Utc::now();
        otpgw_core::Request {
            id: RequestId::generate(),
            phone: otpgw_core::Phone::new("+15551234567"),
            code_hash: otpgw_core::hash_code("123456"),
            status: otpgw_core::RequestStatus::Pending,
            channel_status: None,
            channel: None,
            auth_status: otpgw_core::AuthStatus::Unverified,
            channels_requested: vec![Channel::Sms],
            ip_address: "203.0.113.5".to_owned(),
            ip_subnet: otpgw_core::derive_subnet("203.0.113.5"),
            asn: None,
            ip_country: None,
            phone_country: None,
            phone_prefix: None,
            fraud_score: 0,
            fraud_reasons: Vec::new(),
            shadow_banned: false,
            webhook_url: webhook_url.map(str::to_owned),
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

    fn test_bus() -> (Arc<MemoryStore>, EventBus) {
        let store = Arc::new(MemoryStore::new());
        let metrics = Arc::new(BusMetrics::default());
        let live_push = Arc::new(LivePush::new(metrics.clone()));
        let webhook = Arc::new(WebhookDispatcher::new(crate::webhook::WebhookConfig::default(), metrics.clone()));
        let bus = EventBus::new(store.clone(), live_push, webhook, metrics);
        (store, bus)
    }

    #[tokio::test]
    async fn emit_persists_event_and_updates_status() {
        let (store, bus) = test_bus();
        let req = sample_request(None);
        store.create_request(&req).await.unwrap();

        let id = bus.emit(&req.id, Channel::Sms, ChannelEventType::Sending, EventData::new()).await.unwrap();
        assert!(id.is_some());

        let updated = store.get_request(&req.id).await.unwrap().unwrap();
        assert_eq!(updated.status, otpgw_core::RequestStatus::Sending);
        assert_eq!(updated.channel_status, Some(ChannelEventType::Sending));
    }

    #[tokio::test]
    async fn duplicate_terminal_event_is_suppressed() {
        let (store, bus) = test_bus();
        let req = sample_request(None);
        store.create_request(&req).await.unwrap();

        let first = bus.emit(&req.id, Channel::Sms, ChannelEventType::Delivered, EventData::new()).await.unwrap();
        assert!(first.is_some());
        let second = bus.emit(&req.id, Channel::Sms, ChannelEventType::Delivered, EventData::new()).await.unwrap();
        assert!(second.is_none());
        assert_eq!(bus.metrics.snapshot().duplicates_suppressed, 1);
    }

    #[tokio::test]
    async fn voice_hangup_resolves_via_otp_played_flag() {
        let (store, bus) = test_bus();
        let mut req = sample_request(None);
        req.channels_requested = vec![Channel::Voice];
        store.create_request(&req).await.unwrap();

        let mut data = EventData::new();
        data.insert("otp_played".to_owned(), serde_json::json!(true));
        bus.emit(&req.id, Channel::Voice, ChannelEventType::Hangup, data).await.unwrap();

        let updated = store.get_request(&req.id).await.unwrap().unwrap();
        assert_eq!(updated.status, otpgw_core::RequestStatus::Delivered);
    }

    #[tokio::test]
    async fn webhook_url_present_enqueues_job() {
        let (store, bus) = test_bus();
        let req = sample_request(Some("http://127.0.0.1:1/webhook"));
        store.create_request(&req).await.unwrap();

        bus.emit(&req.id, Channel::Sms, ChannelEventType::Sent, EventData::new()).await.unwrap();
        // The job was spawned; give it a tick to attempt (and fail, since
        // nothing is listening) without asserting on the outcome here.
        tokio::task::yield_now().await;
        assert_eq!(bus.metrics.snapshot().webhooks_enqueued, 1);
    }
}
