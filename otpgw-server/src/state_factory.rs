//! Wires the workspace's crates into one running gateway: the relational
//! store, the Fraud Engine, the Caller-ID Router, the channel providers,
//! the Event Bus and its Live Push/webhook fan-out, and the Dispatch
//! Service that ties them together (spec §4).

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use otpgw_bus::{BusMetrics, EventBus, LivePush, ShadowBanSimulator, WebhookDispatcher};
use otpgw_core::{Channel, ChannelProvider};
use otpgw_dispatch::DispatchService;
use otpgw_fraud::{CallingCodeTable, FraudEngine, NullAsnResolver, NullGeoIpResolver};
use otpgw_provider::SmsProvider;
use otpgw_router::CallerIdRouter;
use otpgw_statekv::StateStore;
use otpgw_statekv_memory::MemoryStateStore;
use otpgw_store::Store;
use otpgw_voice::{CallTracker, HttpTelephonyControl, TelephonyManagementListener, VoiceOrchestrator};

use crate::config::GatewayConfig;
use crate::error::ServerError;

/// Everything [`crate::api`] needs to serve requests.
pub struct Gateway {
    pub dispatch: Arc<DispatchService>,
    pub store: Arc<dyn Store>,
    pub live_push: Arc<LivePush>,
    pub metrics: Arc<BusMetrics>,
    pub router: Arc<CallerIdRouter>,
    pub event_bus: Arc<EventBus>,
    /// `None` when `dispatch.voice_enabled = false`; both report connected
    /// iff their respective long-running tasks currently hold a live
    /// connection (spec §6 `GET /health`'s `asterisk` field).
    pub telephony: Option<Telephony>,
    /// `POST /webhooks/cdr` trunk filter (spec §6), `None` accepts every
    /// record.
    pub cdr_target_trunk_id: Option<String>,
}

pub struct Telephony {
    pub control_plane: Arc<HttpTelephonyControl>,
    pub management_listener: Arc<TelephonyManagementListener>,
}

impl Telephony {
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.control_plane.is_connected() && self.management_listener.is_connected()
    }
}

/// Builds the full dependency graph from `config` and spawns the
/// long-running background tasks. Webhook delivery is spawned per-job by
/// [`WebhookDispatcher`] itself; the telephony management listener and
/// control-plane poller run for the life of the process and are spawned
/// here.
pub async fn build(config: GatewayConfig) -> Result<Gateway, ServerError> {
    let cdr_target_trunk_id = config.cdr.target_trunk_id.clone();
    let store: Arc<dyn Store> = match config.store.backend.as_str() {
        "memory" => Arc::new(otpgw_store::MemoryStore::new()),
        "sqlite" => {
            let url = config
                .store
                .url
                .as_deref()
                .ok_or_else(|| ServerError::Config("sqlite backend requires 'url' in [store]".into()))?;
            Arc::new(
                otpgw_store::SqliteStore::connect(url, 5)
                    .await
                    .map_err(|e| ServerError::Config(format!("sqlite store: {e}")))?,
            )
        }
        other => return Err(ServerError::Config(format!("unsupported store backend: {other}"))),
    };

    let statekv: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());

    let fraud = Arc::new(FraudEngine::new(
        Arc::clone(&store),
        statekv,
        Arc::new(NullAsnResolver),
        Arc::new(NullGeoIpResolver),
        Arc::new(CallingCodeTable),
        config.fraud,
    ));

    let router = Arc::new(CallerIdRouter::new(Arc::clone(&store)));
    router.reload().await.map_err(ServerError::Store)?;

    let metrics = Arc::new(BusMetrics::default());
    let live_push = Arc::new(LivePush::new(Arc::clone(&metrics)));
    tokio::spawn({
        let live_push = Arc::clone(&live_push);
        async move {
            let mut ticker = tokio::time::interval(otpgw_bus::KEEPALIVE_INTERVAL);
            loop {
                ticker.tick().await;
                live_push.sweep().await;
            }
        }
    });
    let webhook = Arc::new(WebhookDispatcher::new(config.webhook.into_bus_config(), Arc::clone(&metrics)));
    let event_bus = Arc::new(EventBus::new(Arc::clone(&store), Arc::clone(&live_push), webhook, Arc::clone(&metrics)));
    let shadow_ban = Arc::new(ShadowBanSimulator::new(Arc::clone(&event_bus)));

    let mut providers: HashMap<Channel, Arc<dyn ChannelProvider>> = HashMap::new();
    let mut telephony: Option<Telephony> = None;

    let sms_provider = Arc::new(SmsProvider::new(config.sms.into_provider_config(), Arc::clone(&event_bus) as _));
    providers.insert(Channel::Sms, sms_provider);

    if config.dispatch.voice_enabled {
        let call_tracker = Arc::new(CallTracker::new());
        let control_plane = Arc::new(HttpTelephonyControl::new(config.control_plane.into_voice_config()));
        let orchestrator = Arc::new(VoiceOrchestrator::new(
            config.voice.into_orchestrator_config(),
            Arc::clone(&call_tracker),
            Arc::clone(&control_plane) as _,
            Arc::clone(&event_bus) as _,
        ));
        providers.insert(Channel::Voice, Arc::clone(&orchestrator) as Arc<dyn ChannelProvider>);

        let management_listener = Arc::new(TelephonyManagementListener::new(
            config.management.into_voice_config(),
            Arc::clone(&call_tracker),
            Arc::clone(&event_bus) as _,
        ));

        tokio::spawn({
            let control_plane = Arc::clone(&control_plane);
            let orchestrator = Arc::clone(&orchestrator);
            async move {
                control_plane.run(orchestrator).await;
            }
        });
        tokio::spawn({
            let management_listener = Arc::clone(&management_listener);
            async move {
                management_listener.run().await;
            }
        });
        info!("voice channel enabled: control-plane poller and management listener started");
        telephony = Some(Telephony { control_plane, management_listener });
    } else {
        info!("voice channel disabled (dispatch.voice_enabled = false)");
    }

    let dispatch = Arc::new(DispatchService::new(
        Arc::clone(&store),
        fraud,
        Arc::clone(&router),
        providers,
        shadow_ban,
        Arc::clone(&event_bus),
        config.dispatch.failover_enabled,
    ));

    Ok(Gateway { dispatch, store, live_push, metrics, router, event_bus, telephony, cdr_target_trunk_id })
}
