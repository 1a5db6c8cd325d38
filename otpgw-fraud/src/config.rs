//! Tunables for the fraud engine's ten rules (spec §4.B table), loaded from
//! `otpgw-server`'s configuration file with the defaults named in the spec.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FraudConfig {
    /// R4: requests/minute per subnet before the rule fires.
    pub rate_limit_per_minute: i64,
    /// R5/R6: requests/hour per subnet or phone before the rule fires.
    pub rate_limit_per_hour: i64,
    /// R7: penalty added when the IP's and phone's countries disagree.
    pub geo_mismatch_penalty: i32,
    /// R9/R10: consecutive failures before a breaker opens.
    pub breaker_failure_threshold: i64,
    /// Score at/above which a request is shadow-banned.
    pub shadow_ban_threshold: i32,
    /// TTL applied to an auto-inserted honeypot entry (R2 insertion), hours.
    pub honeypot_ttl_hours: i64,
    /// If set, only these phone countries are allowed (R8). Empty = no gate.
    pub country_allowlist: Vec<String>,
    pub asn_blocklist: Vec<u32>,
}

impl Default for FraudConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_minute: 5,
            rate_limit_per_hour: 20,
            geo_mismatch_penalty: 30,
            breaker_failure_threshold: 3,
            shadow_ban_threshold: 50,
            honeypot_ttl_hours: 24,
            country_allowlist: Vec::new(),
            asn_blocklist: Vec::new(),
        }
    }
}
