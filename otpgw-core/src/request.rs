//! The `Request` aggregate (spec §3) -- the lifetime record for one OTP
//! dispatch, from intake through verification or expiry.

use serde::{Deserialize, Serialize};

use crate::event::ChannelEventType;
use crate::status::{AuthStatus, RequestStatus};
use crate::types::{Channel, CountryCode, IpSubnet, Phone, RequestId};

/// The lifetime aggregate for a single OTP dispatch (spec §3).
///
/// `status` and `channel_status` are always updated together, in the same
/// store transaction, by `otpgw-bus::EventBus::emit` -- nothing else is
/// permitted to write them (see [`crate::status`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub phone: Phone,
    pub code_hash: String,
    pub status: RequestStatus,
    pub channel_status: Option<ChannelEventType>,
    pub channel: Option<Channel>,
    pub auth_status: AuthStatus,
    pub channels_requested: Vec<Channel>,
    pub ip_address: String,
    pub ip_subnet: IpSubnet,
    pub asn: Option<u32>,
    pub ip_country: Option<CountryCode>,
    pub phone_country: Option<CountryCode>,
    pub phone_prefix: Option<String>,
    pub fraud_score: i32,
    pub fraud_reasons: Vec<String>,
    pub shadow_banned: bool,
    pub webhook_url: Option<String>,
    pub session_id: Option<String>,
    pub provider_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub start_time: Option<chrono::DateTime<chrono::Utc>>,
    pub answer_time: Option<chrono::DateTime<chrono::Utc>>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    pub sms_cost_units: i64,
    pub voice_cost_units: i64,
}

/// The externally-visible status: `verified` when [`Request::auth_status`]
/// is verified, the stored delivery `status` otherwise (spec §4.F).
///
/// A shadow-banned request never exposes `verified` (spec invariant,
/// §3): the auth-feedback handler in `otpgw-dispatch` refuses to accept
/// feedback for a shadow-banned request in the first place, so this
/// function does not need to special-case `shadow_banned` itself.
impl Request {
    #[must_use]
    pub fn combined_status(&self) -> RequestStatus {
        crate::status::combined_status(self.status, self.auth_status)
    }

    #[must_use]
    pub fn is_expired(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Fields that may be partially updated on a request (spec §4.A
/// `update_request_partial`). `None` means "leave unchanged"; this mirrors
/// the teacher's sparse-update-struct convention.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestPatch {
    pub status: Option<RequestStatus>,
    pub channel_status: Option<ChannelEventType>,
    pub channel: Option<Channel>,
    pub auth_status: Option<AuthStatus>,
    pub fraud_score: Option<i32>,
    pub fraud_reasons: Option<Vec<String>>,
    pub shadow_banned: Option<bool>,
    pub provider_id: Option<String>,
    pub error_message: Option<String>,
    pub start_time: Option<chrono::DateTime<chrono::Utc>>,
    pub answer_time: Option<chrono::DateTime<chrono::Utc>>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    pub sms_cost_units: Option<i64>,
    pub voice_cost_units: Option<i64>,
}
