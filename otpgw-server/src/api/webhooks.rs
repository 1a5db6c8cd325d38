//! Provider-originated webhooks (spec §6). None of these ever fail the
//! provider's request: an unrecognized or uncorrelated payload is logged
//! and acknowledged with HTTP-200 regardless.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use otpgw_core::{Channel, ChannelEventType, RequestId};

use super::schemas::{AuthWebhookRequest, CdrBody, CdrRecord, DlrWebhookRequest};
use super::AppState;

/// `POST /webhooks/auth` (spec §6). Always HTTP-200.
pub async fn auth(State(state): State<AppState>, Json(body): Json<AuthWebhookRequest>) -> StatusCode {
    let request_id = RequestId::new(body.request_id);
    if let Err(err) = state.gateway.dispatch.record_auth_feedback(&request_id, body.success).await {
        warn!(request_id = %request_id, error = %err, "auth feedback webhook failed");
    }
    StatusCode::OK
}

/// `POST /webhooks/dlr` (spec §6). Correlated by `id` against `provider_id`
/// case-insensitively; an unmatched `id` is silently acknowledged, since
/// the provider has no way to know the delivery report was unusable.
pub async fn dlr(State(state): State<AppState>, Json(body): Json<DlrWebhookRequest>) -> StatusCode {
    let Some(event_type) = map_dlr_status(&body.status) else {
        warn!(status = %body.status, "unrecognized dlr status, ignoring");
        return StatusCode::OK;
    };

    let Ok(Some(request)) = state.gateway.store.find_request_by_provider_id(&body.id.to_lowercase()).await else {
        warn!(provider_id = %body.id, "dlr webhook for unknown provider id");
        return StatusCode::OK;
    };

    let mut data = serde_json::Map::new();
    if let Some(code) = &body.error_code {
        data.insert("error_code".to_owned(), serde_json::json!(code));
    }
    if let Some(message) = &body.error_message {
        data.insert("error_message".to_owned(), serde_json::json!(message));
    }
    if let Some(fragments) = body.fragments_sent {
        data.insert("fragments_sent".to_owned(), serde_json::json!(fragments));
    }

    state.gateway.event_bus.emit(&request.id, Channel::Sms, event_type, data).await.ok();

    if let Some(price) = body.price {
        let patch = otpgw_core::RequestPatch { sms_cost_units: Some(to_cost_units(price)), ..Default::default() };
        let _ = state.gateway.store.update_request_partial(&request.id, &patch).await;
    }

    StatusCode::OK
}

/// Cost-unit fields are denominated in 1/10000ths of a dollar (spec §3).
fn to_cost_units(dollars: f64) -> i64 {
    (dollars * 10000.0).round() as i64
}

fn map_dlr_status(status: &str) -> Option<ChannelEventType> {
    match status.to_ascii_lowercase().as_str() {
        "delivered" => Some(ChannelEventType::Delivered),
        "failed" | "rejected" | "expired" => Some(ChannelEventType::Failed),
        "undelivered" | "undeliverable" => Some(ChannelEventType::Undelivered),
        "sent" => Some(ChannelEventType::Sent),
        _ => None,
    }
}

static EMBEDDED_UUID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}").expect("valid regex")
});

/// Extracts the trunk identifier from a CDR's `trunk_name`, favoring a
/// UUID embedded anywhere in the string over the raw value itself.
fn extract_trunk_id(trunk_name: &str) -> String {
    EMBEDDED_UUID.find(trunk_name).map_or_else(|| trunk_name.to_ascii_lowercase(), |m| m.as_str().to_ascii_lowercase())
}

/// `POST /webhooks/cdr` (spec §6). Accepts a single object, a JSON array,
/// or newline-delimited JSON; the latter isn't valid JSON on its own, so it
/// is parsed as a raw string and split by line before the per-object
/// `CdrBody` deserialization below ever runs.
pub async fn cdr(State(state): State<AppState>, body: String) -> StatusCode {
    let records = parse_cdr_body(&body);

    for record in records {
        let Some(trunk_name) = &record.trunk_name else { continue };
        if let Some(target) = &state.gateway.cdr_target_trunk_id {
            if extract_trunk_id(trunk_name) != target.to_ascii_lowercase() {
                continue;
            }
        }
        apply_cdr_record(&state, record).await;
    }

    StatusCode::OK
}

fn parse_cdr_body(body: &str) -> Vec<CdrRecord> {
    let trimmed = body.trim();
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        return serde_json::from_str::<CdrBody>(trimmed).map(CdrBody::into_records).unwrap_or_default();
    }

    trimmed
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str::<CdrRecord>(line).ok())
        .collect()
}

async fn apply_cdr_record(state: &AppState, record: CdrRecord) {
    let Ok(Some(request)) = state.gateway.store.find_request_by_provider_id(&record.id.to_lowercase()).await else {
        return;
    };

    let patch = otpgw_core::RequestPatch {
        voice_cost_units: record.price.map(to_cost_units),
        end_time: record.time_end,
        ..Default::default()
    };
    let _ = state.gateway.store.update_request_partial(&request.id, &patch).await;
}
