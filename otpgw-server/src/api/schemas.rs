use serde::{Deserialize, Serialize};

use otpgw_core::Channel;

/// `POST /dispatch` request body (spec §6).
#[derive(Debug, Deserialize)]
pub struct DispatchRequest {
    pub phone: String,
    pub code: String,
    pub session_id: Option<String>,
    #[serde(default = "default_channels")]
    pub channels: Vec<Channel>,
    pub webhook_url: Option<String>,
    pub ip: Option<String>,
}

fn default_channels() -> Vec<Channel> {
    vec![Channel::Sms]
}

/// `POST /webhooks/auth` request body (spec §6).
#[derive(Debug, Deserialize)]
pub struct AuthWebhookRequest {
    pub request_id: String,
    pub success: bool,
}

/// `POST /webhooks/dlr` request body: a provider-specific envelope, of
/// which only these fields are acted on (spec §6).
#[derive(Debug, Deserialize)]
pub struct DlrWebhookRequest {
    pub id: String,
    pub status: String,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub fragments_sent: Option<i64>,
    #[serde(default)]
    pub code_id: Option<String>,
}

/// One call-detail record as delivered to `POST /webhooks/cdr` (spec §6).
#[derive(Debug, Deserialize)]
pub struct CdrRecord {
    pub id: String,
    pub dst_number: Option<String>,
    pub time_start: Option<chrono::DateTime<chrono::Utc>>,
    pub time_end: Option<chrono::DateTime<chrono::Utc>>,
    pub duration: Option<i64>,
    pub price: Option<f64>,
    pub trunk_name: Option<String>,
}

/// Accepts the three shapes spec §6 allows for `POST /webhooks/cdr`: a
/// single object, a JSON array, or (via [`serde_json::Deserializer`]'s
/// stream support in the handler) newline-delimited JSON.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CdrBody {
    Many(Vec<CdrRecord>),
    One(CdrRecord),
}

impl CdrBody {
    #[must_use]
    pub fn into_records(self) -> Vec<CdrRecord> {
        match self {
            Self::Many(records) => records,
            Self::One(record) => vec![record],
        }
    }
}

/// Generic error response returned on HTTP-400/500 failures.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// `GET /health` response body (spec §6).
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
    pub asterisk: &'static str,
    pub uptime: u64,
    pub version: &'static str,
}
