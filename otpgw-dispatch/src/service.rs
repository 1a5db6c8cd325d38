//! The Dispatch Service (spec §4.J): intake, fraud gating, and
//! caller-ID-routed delivery with channel failover.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use otpgw_core::{
    hash_code, Channel, ChannelDispatchError, ChannelEventType, ChannelProvider, Phone, Request, RequestId,
};
use otpgw_bus::{EventBus, ShadowBanSimulator};
use otpgw_fraud::{FraudEngine, FraudInput};
use otpgw_router::CallerIdRouter;
use otpgw_store::Store;

use crate::error::DispatchError;
use crate::normalize::{normalize_phone, validate_code};

/// The literal `status` value returned by every `dispatch` call, shadow-banned
/// or not (spec §8 invariant #6, scenarios S1/S4). By response time a real
/// SMS dispatch has already advanced the persisted status past `sending`
/// (the queued/sending/sent triplet runs synchronously) while a
/// shadow-banned one is still `pending` in the store; reporting either
/// request's *actual* status would leak the ban, so the response always
/// reports this fixed value instead.
const RESPONSE_STATUS: &str = "sending";

/// `POST /dispatch` request body (spec §6).
#[derive(Debug, Clone)]
pub struct DispatchInput {
    pub phone: String,
    pub code: String,
    pub session_id: Option<String>,
    pub channels: Vec<Channel>,
    pub webhook_url: Option<String>,
    pub ip: String,
}

/// `POST /dispatch` response body. Identical in shape whether the request
/// was allowed or shadow-banned (spec §4.J step 4's anti-oracle
/// requirement): nothing in this struct reveals which path was taken.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DispatchOutput {
    pub status: String,
    pub request_id: String,
    pub channel: String,
    pub phone: String,
}

pub struct DispatchService {
    store: Arc<dyn Store>,
    fraud: Arc<FraudEngine>,
    router: Arc<CallerIdRouter>,
    providers: HashMap<Channel, Arc<dyn ChannelProvider>>,
    shadow_ban: Arc<ShadowBanSimulator>,
    event_bus: Arc<EventBus>,
    failover_enabled: bool,
}

impl DispatchService {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        fraud: Arc<FraudEngine>,
        router: Arc<CallerIdRouter>,
        providers: HashMap<Channel, Arc<dyn ChannelProvider>>,
        shadow_ban: Arc<ShadowBanSimulator>,
        event_bus: Arc<EventBus>,
        failover_enabled: bool,
    ) -> Self {
        Self { store, fraud, router, providers, shadow_ban, event_bus, failover_enabled }
    }

    pub async fn dispatch(&self, input: DispatchInput) -> Result<DispatchOutput, DispatchError> {
        if input.channels.is_empty() {
            return Err(DispatchError::NoChannels);
        }
        validate_code(&input.code)?;
        let phone = normalize_phone(&input.phone)?;

        // Step 2: generate request id, hash code, persist pending.
        let request_id = RequestId::generate();
        let now = chrono::Utc::now();
        let code_hash = hash_code(&input.code);

        // Step 3: invoke the Fraud Engine before the request is persisted,
        // so its derived fields land in the same initial row.
        let fraud_input = FraudInput { phone: phone.clone(), ip: input.ip.clone(), session_id: input.session_id.clone() };
        let fraud_output = self.fraud.score(&fraud_input).await?;

        let request = Request {
            id: request_id.clone(),
            phone: Phone::new(phone.clone()),
            code_hash,
            status: otpgw_core::RequestStatus::Pending,
            channel_status: None,
            channel: None,
            auth_status: otpgw_core::AuthStatus::Unverified,
            channels_requested: input.channels.clone(),
            ip_address: input.ip.clone(),
            ip_subnet: otpgw_core::IpSubnet::new(fraud_output.ip_subnet.clone()),
            asn: fraud_output.asn,
            ip_country: fraud_output.ip_country.clone(),
            phone_country: fraud_output.phone_country.clone(),
            phone_prefix: fraud_output.phone_prefix.clone(),
            fraud_score: fraud_output.score,
            fraud_reasons: fraud_output.reasons.clone(),
            shadow_banned: fraud_output.shadow_ban,
            webhook_url: input.webhook_url.clone(),
            session_id: input.session_id.clone(),
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
        };
        self.store.create_request(&request).await?;

        let first_channel = input.channels[0];

        if fraud_output.shadow_ban {
            // Step 4: never touch a real provider; simulate instead.
            info!(request_id = %request_id.as_str(), "dispatching shadow-banned request to simulator");
            self.shadow_ban.simulate(request_id.clone(), first_channel);
            return Ok(DispatchOutput {
                status: RESPONSE_STATUS.to_owned(),
                request_id: request_id.as_str().to_owned(),
                channel: first_channel.as_str().to_owned(),
                phone,
            });
        }

        // Step 5: resolve a route and dispatch, with failover across the
        // requested channels.
        for channel in &input.channels {
            let Some(provider) = self.providers.get(channel) else {
                continue;
            };
            let Some(caller_id) = self.router.resolve(*channel, &phone) else {
                warn!(channel = %channel, "no caller-id route for destination");
                if !self.failover_enabled {
                    break;
                }
                continue;
            };

            match provider.dispatch(&request, &input.code, Some(&caller_id)).await {
                Ok(_outcome) => {
                    return Ok(DispatchOutput {
                        status: RESPONSE_STATUS.to_owned(),
                        request_id: request_id.as_str().to_owned(),
                        channel: channel.as_str().to_owned(),
                        phone,
                    });
                }
                Err(err) => {
                    warn!(channel = %channel, error = %err, "provider dispatch failed");
                    self.emit_failed(&request_id, *channel, &err).await;
                    if !self.failover_enabled {
                        break;
                    }
                }
            }
        }

        Err(DispatchError::NoProviderAvailable)
    }

    async fn emit_failed(&self, request_id: &RequestId, channel: Channel, err: &ChannelDispatchError) {
        let mut data = otpgw_core::EventData::new();
        data.insert("error".to_owned(), serde_json::json!(err.to_string()));
        let _ = self.event_bus.emit(request_id, channel, ChannelEventType::Failed, data).await;
    }

    /// `POST /webhooks/auth` (spec §6 + §8 invariant #3). A shadow-banned
    /// request never becomes `verified`: this refuses to apply feedback to
    /// one at all, so its `auth_status` is untouched regardless of
    /// `success`. Otherwise applies [`otpgw_core::AuthStatus::apply_feedback`]
    /// and feeds the outcome back into the Fraud Engine's reputation
    /// tracking, the same signal `dispatch` would have recorded on a
    /// terminal delivery outcome.
    pub async fn record_auth_feedback(&self, request_id: &RequestId, success: bool) -> Result<(), DispatchError> {
        let Some(request) = self.store.get_request(request_id).await? else {
            return Ok(());
        };
        if request.shadow_banned {
            return Ok(());
        }

        let new_auth_status = request.auth_status.apply_feedback(success);
        let patch = otpgw_core::RequestPatch { auth_status: Some(new_auth_status), ..Default::default() };
        self.store.update_request_partial(request_id, &patch).await?;

        if success {
            self.fraud.record_success(request.phone.as_str(), request.ip_subnet.as_str()).await?;
        } else {
            self.fraud.record_failure(request.phone.as_str(), request.ip_subnet.as_str()).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use otpgw_bus::{BusMetrics, LivePush, WebhookConfig, WebhookDispatcher};
    use otpgw_core::CallerIdRoute;
    use otpgw_fraud::{FraudConfig, NullAsnResolver, NullGeoIpResolver, PhoneIntelligence};
    use otpgw_statekv_memory::MemoryStateStore;
    use otpgw_store::MemoryStore;

    struct NoIntel;
    impl PhoneIntelligence for NoIntel {
        fn country_and_prefix(&self, _phone: &str) -> (Option<otpgw_core::CountryCode>, Option<String>) {
            (None, None)
        }
    }

    struct StubProvider {
        name: &'static str,
        fails: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChannelProvider for StubProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn dispatch(
            &self,
            _request: &Request,
            _code: &str,
            _caller_id: Option<&str>,
        ) -> Result<otpgw_core::DispatchOutcome, ChannelDispatchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fails {
                Err(ChannelDispatchError::Transport("connection refused".to_owned()))
            } else {
                Ok(otpgw_core::DispatchOutcome { provider_id: Some("prov-1".to_owned()) })
            }
        }
    }

    async fn harness(
        providers: HashMap<Channel, Arc<dyn ChannelProvider>>,
        failover_enabled: bool,
    ) -> (DispatchService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        store
            .upsert_route(&CallerIdRoute { channel: Channel::Sms, prefix: "*".to_owned(), caller_id: "+15005550000".to_owned(), enabled: true })
            .await
            .unwrap();
        store
            .upsert_route(&CallerIdRoute { channel: Channel::Voice, prefix: "*".to_owned(), caller_id: "+15005550001".to_owned(), enabled: true })
            .await
            .unwrap();

        let router = Arc::new(CallerIdRouter::new(store.clone() as Arc<dyn Store>));
        router.reload().await.unwrap();

        let fraud = Arc::new(FraudEngine::new(
            store.clone() as Arc<dyn Store>,
            Arc::new(MemoryStateStore::default()),
            Arc::new(NullAsnResolver),
            Arc::new(NullGeoIpResolver),
            Arc::new(NoIntel),
            FraudConfig::default(),
        ));

        let metrics = Arc::new(BusMetrics::default());
        let live_push = Arc::new(LivePush::new(metrics.clone()));
        let webhook = Arc::new(WebhookDispatcher::new(WebhookConfig::default(), metrics.clone()));
        let event_bus = Arc::new(EventBus::new(store.clone() as Arc<dyn Store>, live_push, webhook, metrics));
        let shadow_ban = Arc::new(ShadowBanSimulator::new(event_bus.clone()));

        let service = DispatchService::new(store.clone() as Arc<dyn Store>, fraud, router, providers, shadow_ban, event_bus, failover_enabled);
        (service, store)
    }

    fn input(channels: Vec<Channel>) -> DispatchInput {
        DispatchInput {
            phone: "+1 (415) 555-0100".to_owned(),
            code: "123456".to_owned(),
            session_id: None,
            channels,
            webhook_url: None,
            ip: "203.0.113.42".to_owned(),
        }
    }

    #[tokio::test]
    async fn happy_path_sms_dispatch_persists_pending_request() {
        let providers: HashMap<Channel, Arc<dyn ChannelProvider>> =
            HashMap::from([(Channel::Sms, Arc::new(StubProvider { name: "sms", fails: false, calls: AtomicUsize::new(0) }) as Arc<dyn ChannelProvider>)]);
        let (service, store) = harness(providers, true).await;

        let out = service.dispatch(input(vec![Channel::Sms])).await.unwrap();
        assert_eq!(out.channel, "sms");
        assert_eq!(out.phone, "+14155550100");

        let persisted = store.get_request(&RequestId::new(out.request_id.clone())).await.unwrap().unwrap();
        assert!(!persisted.shadow_banned);
        assert_eq!(persisted.status, otpgw_core::RequestStatus::Pending);
    }

    #[tokio::test]
    async fn shadow_banned_request_never_touches_a_provider_but_returns_identical_shape() {
        let calls = Arc::new(AtomicUsize::new(0));
        struct CountingProvider(Arc<AtomicUsize>);
        #[async_trait]
        impl ChannelProvider for CountingProvider {
            fn name(&self) -> &'static str {
                "sms"
            }
            async fn dispatch(
                &self,
                _request: &Request,
                _code: &str,
                _caller_id: Option<&str>,
            ) -> Result<otpgw_core::DispatchOutcome, ChannelDispatchError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(otpgw_core::DispatchOutcome::default())
            }
        }
        let providers: HashMap<Channel, Arc<dyn ChannelProvider>> =
            HashMap::from([(Channel::Sms, Arc::new(CountingProvider(calls.clone())) as Arc<dyn ChannelProvider>)]);
        let (service, store) = harness(providers, true).await;

        // A pre-seeded honeypot hit on this subnet forces an instant,
        // shadow-banned verdict (spec §4.B R2) without touching rate limits.
        store
            .insert_honeypot(&otpgw_core::HoneypotEntry {
                subnet: "203.0.113.0/24".to_owned(),
                reason: "test".to_owned(),
                expires_at: chrono::Utc::now() + chrono::Duration::hours(1),
            })
            .await
            .unwrap();

        let out = service.dispatch(input(vec![Channel::Sms])).await.unwrap();
        assert_eq!(out.channel, "sms");
        assert_eq!(calls.load(Ordering::SeqCst), 0, "shadow-banned dispatch must never invoke a real provider");

        let persisted = store.get_request(&RequestId::new(out.request_id.clone())).await.unwrap().unwrap();
        assert!(persisted.shadow_banned);
        assert_eq!(persisted.fraud_score, 100);
    }

    #[tokio::test]
    async fn failover_tries_next_channel_after_provider_error() {
        let sms = Arc::new(StubProvider { name: "sms", fails: true, calls: AtomicUsize::new(0) });
        let voice = Arc::new(StubProvider { name: "voice", fails: false, calls: AtomicUsize::new(0) });
        let providers: HashMap<Channel, Arc<dyn ChannelProvider>> =
            HashMap::from([(Channel::Sms, sms.clone() as Arc<dyn ChannelProvider>), (Channel::Voice, voice.clone() as Arc<dyn ChannelProvider>)]);
        let (service, _store) = harness(providers, true).await;

        let out = service.dispatch(input(vec![Channel::Sms, Channel::Voice])).await.unwrap();
        assert_eq!(out.channel, "voice");
        assert_eq!(sms.calls.load(Ordering::SeqCst), 1);
        assert_eq!(voice.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failover_disabled_stops_after_first_failure() {
        let sms = Arc::new(StubProvider { name: "sms", fails: true, calls: AtomicUsize::new(0) });
        let voice = Arc::new(StubProvider { name: "voice", fails: false, calls: AtomicUsize::new(0) });
        let providers: HashMap<Channel, Arc<dyn ChannelProvider>> =
            HashMap::from([(Channel::Sms, sms.clone() as Arc<dyn ChannelProvider>), (Channel::Voice, voice.clone() as Arc<dyn ChannelProvider>)]);
        let (service, _store) = harness(providers, false).await;

        let err = service.dispatch(input(vec![Channel::Sms, Channel::Voice])).await.unwrap_err();
        assert!(matches!(err, DispatchError::NoProviderAvailable));
        assert_eq!(sms.calls.load(Ordering::SeqCst), 1);
        assert_eq!(voice.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejects_bad_code_before_touching_the_store() {
        let providers: HashMap<Channel, Arc<dyn ChannelProvider>> = HashMap::new();
        let (service, _store) = harness(providers, true).await;
        let mut bad = input(vec![Channel::Sms]);
        bad.code = "12".to_owned();
        let err = service.dispatch(bad).await.unwrap_err();
        assert!(matches!(err, DispatchError::InvalidCode(_)));
    }
}
