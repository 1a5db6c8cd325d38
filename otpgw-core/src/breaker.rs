//! Per-subject circuit breaker state (spec §3, rules R9/R10).

use serde::{Deserialize, Serialize};

/// The breaker's open/closed state. `Open` means the fraud engine adds the
/// breaker penalty (R9: +50, R10: +40) unconditionally regardless of the
/// live failure count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
}

/// Circuit breaker keyed by `phone:<number>` or `ip:<subnet>` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreaker {
    pub key: String,
    pub failures: i64,
    pub successes: i64,
    pub state: BreakerState,
    pub opened_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn closed(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            failures: 0,
            successes: 0,
            state: BreakerState::Closed,
            opened_at: None,
        }
    }

    /// Key for the phone-keyed breaker (R9).
    #[must_use]
    pub fn phone_key(phone: &str) -> String {
        format!("phone:{phone}")
    }

    /// Key for the subnet-keyed breaker (R10).
    #[must_use]
    pub fn ip_key(subnet: &str) -> String {
        format!("ip:{subnet}")
    }

    /// Whether this breaker should currently contribute its penalty: either
    /// already open, or failures at/over `threshold` (spec §4.B R9/R10 --
    /// "breaker open, or failures >= threshold").
    #[must_use]
    pub fn should_penalize(&self, threshold: i64) -> bool {
        self.state == BreakerState::Open || self.failures >= threshold
    }

    /// Record a success: resets both counters and closes the breaker
    /// (spec §4.B `record_success`).
    pub fn record_success(&mut self) {
        self.failures = 0;
        self.successes += 1;
        self.state = BreakerState::Closed;
        self.opened_at = None;
    }

    /// Record a failure. Opens the breaker once `failures` reaches
    /// `threshold`, per §4.B ("R9/R10 ... +50/+40 (and open)").
    pub fn record_failure(&mut self, threshold: i64, now: chrono::DateTime<chrono::Utc>) {
        self.failures += 1;
        if self.failures >= threshold && self.state == BreakerState::Closed {
            self.state = BreakerState::Open;
            self.opened_at = Some(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breaker_opens_at_threshold() {
        let mut b = CircuitBreaker::closed(CircuitBreaker::phone_key("+15551234567"));
        let now = chrono::Utc::now();
        for _ in 0..3 {
            b.record_failure(3, now);
        }
        assert_eq!(b.state, BreakerState::Open);
        assert!(b.should_penalize(3));
    }

    #[test]
    fn breaker_resets_on_success() {
        let mut b = CircuitBreaker::closed("ip:203.0.113.0/24");
        b.record_failure(3, chrono::Utc::now());
        b.record_success();
        assert_eq!(b.failures, 0);
        assert_eq!(b.state, BreakerState::Closed);
    }

    #[test]
    fn should_penalize_below_threshold_when_closed() {
        let mut b = CircuitBreaker::closed("ip:203.0.113.0/24");
        b.record_failure(5, chrono::Utc::now());
        assert!(!b.should_penalize(5));
    }
}
