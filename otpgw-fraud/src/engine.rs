//! Orchestrates the whitelist bypass, field derivation, and ordered rule
//! evaluation into a single `score` call (spec §4.B), plus the
//! success/failure feedback hooks that keep reputation and breaker state
//! current.

use std::sync::Arc;

use otpgw_core::{derive_subnet, CircuitBreaker, HoneypotEntry};
use otpgw_statekv::StateStore;
use otpgw_store::Store;

use crate::config::FraudConfig;
use crate::error::FraudError;
use crate::resolvers::{AsnResolver, GeoIpResolver, PhoneIntelligence};
use crate::rule::{FraudRule, RuleContext, RuleVerdict};
use crate::rules::default_rules;
use crate::types::{FraudInput, FraudOutput};

pub struct FraudEngine {
    store: Arc<dyn Store>,
    statekv: Arc<dyn StateStore>,
    asn: Arc<dyn AsnResolver>,
    geoip: Arc<dyn GeoIpResolver>,
    phone_intel: Arc<dyn PhoneIntelligence>,
    config: FraudConfig,
    rules: Vec<Box<dyn FraudRule>>,
}

impl FraudEngine {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        statekv: Arc<dyn StateStore>,
        asn: Arc<dyn AsnResolver>,
        geoip: Arc<dyn GeoIpResolver>,
        phone_intel: Arc<dyn PhoneIntelligence>,
        config: FraudConfig,
    ) -> Self {
        Self {
            store,
            statekv,
            asn,
            geoip,
            phone_intel,
            config,
            rules: default_rules(),
        }
    }

    /// Score one dispatch request (spec §4.B). Whitelisted callers bypass
    /// every rule; everyone else walks the fixed rule order, with instant
    /// rules short-circuiting scoring at 100 -- which always clears the
    /// shadow-ban threshold, so an instant hit and an additive score that
    /// crosses the line are indistinguishable by the time this returns.
    pub async fn score(&self, input: &FraudInput) -> Result<FraudOutput, FraudError> {
        let now = chrono::Utc::now();
        let ip_subnet = derive_subnet(&input.ip);
        let (phone_country, phone_prefix) = self.phone_intel.country_and_prefix(&input.phone);
        let ip_country = self.geoip.country_for_ip(&input.ip).await;
        let asn = self.asn.resolve(&input.ip).await;

        if self.store.is_whitelisted(&input.ip, &input.phone).await? {
            return Ok(FraudOutput {
                allowed: true,
                shadow_ban: false,
                score: 0,
                reasons: Vec::new(),
                ip_subnet: ip_subnet.as_str().to_owned(),
                ip_country,
                phone_country,
                phone_prefix,
                asn,
            });
        }

        let ctx = RuleContext {
            phone: &input.phone,
            ip_subnet: ip_subnet.as_str(),
            ip_country: ip_country.as_ref(),
            phone_country: phone_country.as_ref(),
            asn,
            config: &self.config,
            store: self.store.as_ref(),
            statekv: self.statekv.as_ref(),
            now,
        };

        let mut score: i32 = 0;
        let mut reasons = Vec::new();

        for rule in &self.rules {
            match rule.evaluate(&ctx).await? {
                RuleVerdict::None => {}
                RuleVerdict::Additive(points) => {
                    score += points;
                    reasons.push(rule.code().to_owned());
                }
                RuleVerdict::Instant => {
                    score = 100;
                    reasons.push(rule.code().to_owned());
                    break;
                }
            }
        }

        // The instant rules short-circuit scoring (score = 100, stop
        // evaluating) but still flow through the same threshold decision as
        // every additive rule (spec §4.B): with a default threshold of 50,
        // score = 100 always clears it, so instant hits are shadow-banned
        // exactly like an additive score that crossed the line.
        let shadow_ban = score >= self.config.shadow_ban_threshold;
        if shadow_ban {
            self.store
                .insert_honeypot(&HoneypotEntry {
                    subnet: ip_subnet.as_str().to_owned(),
                    reason: "shadow_ban_threshold".to_owned(),
                    expires_at: now + chrono::Duration::hours(self.config.honeypot_ttl_hours),
                })
                .await?;
        }

        Ok(FraudOutput {
            allowed: !shadow_ban,
            shadow_ban,
            score,
            reasons,
            ip_subnet: ip_subnet.as_str().to_owned(),
            ip_country,
            phone_country,
            phone_prefix,
            asn,
        })
    }

    /// A verification or delivery succeeded: close both breakers and credit
    /// reputation (spec §4.B `record_success`).
    pub async fn record_success(&self, phone: &str, ip_subnet: &str) -> Result<(), FraudError> {
        let now = chrono::Utc::now();
        self.store.record_reputation_success(phone, now).await?;
        self.store.record_reputation_success(ip_subnet, now).await?;
        self.close_breaker(&CircuitBreaker::phone_key(phone)).await?;
        self.close_breaker(&CircuitBreaker::ip_key(ip_subnet)).await?;
        Ok(())
    }

    /// A verification or delivery failed: count it against reputation and
    /// both breakers (spec §4.B `record_failure`).
    pub async fn record_failure(&self, phone: &str, ip_subnet: &str) -> Result<(), FraudError> {
        let now = chrono::Utc::now();
        self.store.record_reputation_failure(phone, now).await?;
        self.store.record_reputation_failure(ip_subnet, now).await?;
        self.bump_breaker_failure(&CircuitBreaker::phone_key(phone), now).await?;
        self.bump_breaker_failure(&CircuitBreaker::ip_key(ip_subnet), now).await?;
        Ok(())
    }

    async fn close_breaker(&self, key: &str) -> Result<(), FraudError> {
        let mut breaker = self
            .store
            .get_breaker(key)
            .await?
            .unwrap_or_else(|| CircuitBreaker::closed(key));
        breaker.record_success();
        self.store.save_breaker(&breaker).await?;
        Ok(())
    }

    async fn bump_breaker_failure(&self, key: &str, now: chrono::DateTime<chrono::Utc>) -> Result<(), FraudError> {
        let mut breaker = self
            .store
            .get_breaker(key)
            .await?
            .unwrap_or_else(|| CircuitBreaker::closed(key));
        breaker.record_failure(self.config.breaker_failure_threshold, now);
        self.store.save_breaker(&breaker).await?;
        Ok(())
    }
}
