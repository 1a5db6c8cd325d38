use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use super::schemas::HealthResponse;
use super::AppState;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// `GET /health` (spec §6): 200 when the store is reachable and, if voice
/// dispatch is enabled, both telephony subsystems are connected; 503
/// otherwise.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let database_ok = state.gateway.store.get_request(&otpgw_core::RequestId::new("health-check")).await.is_ok();
    let asterisk_ok = state.gateway.telephony.as_ref().is_none_or(|t| t.is_connected());

    let status = if database_ok && asterisk_ok { "ok" } else { "degraded" };
    let database = if database_ok { "connected" } else { "disconnected" };
    let asterisk = match &state.gateway.telephony {
        None => "disabled",
        Some(t) if t.is_connected() => "connected",
        Some(_) => "disconnected",
    };

    let body = HealthResponse {
        status,
        database,
        asterisk,
        uptime: state.started_at.elapsed().as_secs(),
        version: VERSION,
    };

    let code = if database_ok && asterisk_ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (code, Json(body))
}

/// `GET /metrics`: the Event Bus's atomic counters (spec §4's observability
/// surface), unauthenticated the same way `/health` is.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.gateway.metrics.snapshot())
}
