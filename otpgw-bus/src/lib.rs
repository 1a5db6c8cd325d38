//! The Event Bus, Shadow-Ban Simulator, Webhook Dispatcher, and Live Push
//! fan-out (spec §4.E, §4.K, §4.L, §4.M) -- everything downstream of "a
//! channel status changed".

pub mod error;
pub mod event_bus;
pub mod live_push;
pub mod metrics;
pub mod shadow_ban;
pub mod webhook;

pub use error::BusError;
pub use event_bus::EventBus;
pub use live_push::{LivePush, PushMessage, KEEPALIVE_INTERVAL, SILENCE_TIMEOUT};
pub use metrics::{BusMetrics, MetricsSnapshot};
pub use shadow_ban::ShadowBanSimulator;
pub use webhook::{build_payload, WebhookConfig, WebhookDispatcher, WebhookJob, WebhookPayload};
