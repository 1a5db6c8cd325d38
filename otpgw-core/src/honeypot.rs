//! Honeypot entries: subnets auto-banned after tripping the shadow-ban
//! threshold (spec §3, §4.B).

use serde::{Deserialize, Serialize};

/// A subnet temporarily treated as an instant-reject source (rule R2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoneypotEntry {
    pub subnet: String,
    pub reason: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

impl HoneypotEntry {
    #[must_use]
    pub fn is_active(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        now < self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_entry_is_inactive() {
        let now = chrono::Utc::now();
        let entry = HoneypotEntry {
            subnet: "203.0.113.0/24".to_owned(),
            reason: "shadow_ban_threshold".to_owned(),
            expires_at: now - chrono::Duration::seconds(1),
        };
        assert!(!entry.is_active(now));
    }
}
