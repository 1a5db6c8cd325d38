//! Rolling reputation counters, keyed per-subnet and per-phone (spec §3).

use serde::{Deserialize, Serialize};

/// Rolling counters the fraud engine consults and updates. One row exists
/// per subject (an IP subnet string or an E.164 phone number); `otpgw-store`
/// keys these in separate tables but the shape is identical.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reputation {
    pub subject: String,
    pub total: i64,
    pub verified: i64,
    pub failed: i64,
    pub banned: bool,
    pub first_seen: chrono::DateTime<chrono::Utc>,
    pub last_seen: chrono::DateTime<chrono::Utc>,
}

impl Reputation {
    #[must_use]
    pub fn new(subject: impl Into<String>, now: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            subject: subject.into(),
            total: 0,
            verified: 0,
            failed: 0,
            banned: false,
            first_seen: now,
            last_seen: now,
        }
    }
}
