//! Input/output shape of the Fraud Engine (spec §4.B).

use otpgw_core::CountryCode;
use serde::{Deserialize, Serialize};

/// What the fraud engine is asked to score.
#[derive(Debug, Clone)]
pub struct FraudInput {
    pub phone: String,
    pub ip: String,
    pub session_id: Option<String>,
}

/// What the fraud engine returns (spec §4.B): the derived geo/ASN fields
/// travel back out so the Dispatch Service can persist them on the request
/// without re-deriving them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudOutput {
    pub allowed: bool,
    pub shadow_ban: bool,
    pub score: i32,
    pub reasons: Vec<String>,
    pub ip_subnet: String,
    pub ip_country: Option<CountryCode>,
    pub phone_country: Option<CountryCode>,
    pub phone_prefix: Option<String>,
    pub asn: Option<u32>,
}
