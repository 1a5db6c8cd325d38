//! The ten fixed fraud rules (spec §4.B table), evaluated in this exact
//! order by [`crate::engine::FraudEngine`].

use async_trait::async_trait;
use otpgw_core::CircuitBreaker;
use otpgw_statekv::StateKey;
use std::time::Duration;

use crate::error::FraudError;
use crate::rule::{FraudRule, RuleContext, RuleVerdict};

/// R1: resolved ASN is on the blocklist.
pub struct AsnBlocklist;

#[async_trait]
impl FraudRule for AsnBlocklist {
    fn code(&self) -> &'static str {
        "asn_blocklist"
    }

    async fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<RuleVerdict, FraudError> {
        match ctx.asn {
            Some(asn) if ctx.config.asn_blocklist.contains(&asn) => Ok(RuleVerdict::Instant),
            _ => Ok(RuleVerdict::None),
        }
    }
}

/// R2: the subnet is in the honeypot table and not expired.
pub struct HoneypotHit;

#[async_trait]
impl FraudRule for HoneypotHit {
    fn code(&self) -> &'static str {
        "honeypot"
    }

    async fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<RuleVerdict, FraudError> {
        if ctx.store.is_honeypot_active(ctx.ip_subnet, ctx.now).await? {
            Ok(RuleVerdict::Instant)
        } else {
            Ok(RuleVerdict::None)
        }
    }
}

/// R3: the subnet's reputation is already banned.
pub struct IpBanned;

#[async_trait]
impl FraudRule for IpBanned {
    fn code(&self) -> &'static str {
        "ip_banned"
    }

    async fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<RuleVerdict, FraudError> {
        match ctx.store.get_reputation(ctx.ip_subnet).await? {
            Some(rep) if rep.banned => Ok(RuleVerdict::Instant),
            _ => Ok(RuleVerdict::None),
        }
    }
}

/// R4: requests from this subnet in the last minute reach the per-minute
/// limit (frozen Open Question (a): uses `>= limit`).
pub struct RateLimitMinuteSubnet;

#[async_trait]
impl FraudRule for RateLimitMinuteSubnet {
    fn code(&self) -> &'static str {
        "rate_limit_minute_subnet"
    }

    async fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<RuleVerdict, FraudError> {
        let key = StateKey::rate_min_subnet(ctx.ip_subnet);
        let count = ctx.statekv.increment(&key, 1, Some(Duration::from_secs(60))).await?;
        if count >= ctx.config.rate_limit_per_minute {
            Ok(RuleVerdict::Additive(50))
        } else {
            Ok(RuleVerdict::None)
        }
    }
}

/// R5: requests from this subnet in the last hour reach the per-hour limit.
pub struct RateLimitHourSubnet;

#[async_trait]
impl FraudRule for RateLimitHourSubnet {
    fn code(&self) -> &'static str {
        "rate_limit_hour_subnet"
    }

    async fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<RuleVerdict, FraudError> {
        let key = StateKey::rate_hour_subnet(ctx.ip_subnet);
        let count = ctx.statekv.increment(&key, 1, Some(Duration::from_secs(3600))).await?;
        if count >= ctx.config.rate_limit_per_hour {
            Ok(RuleVerdict::Additive(40))
        } else {
            Ok(RuleVerdict::None)
        }
    }
}

/// R6: requests for this phone number in the last hour reach the per-hour
/// limit.
pub struct RateLimitHourPhone;

#[async_trait]
impl FraudRule for RateLimitHourPhone {
    fn code(&self) -> &'static str {
        "rate_limit_hour_phone"
    }

    async fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<RuleVerdict, FraudError> {
        let key = StateKey::rate_hour_phone(ctx.phone);
        let count = ctx.statekv.increment(&key, 1, Some(Duration::from_secs(3600))).await?;
        if count >= ctx.config.rate_limit_per_hour {
            Ok(RuleVerdict::Additive(30))
        } else {
            Ok(RuleVerdict::None)
        }
    }
}

/// R7: the IP's geolocated country disagrees with the phone's country,
/// when both are known.
pub struct GeoMismatch;

#[async_trait]
impl FraudRule for GeoMismatch {
    fn code(&self) -> &'static str {
        "geo_mismatch"
    }

    async fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<RuleVerdict, FraudError> {
        match (ctx.ip_country, ctx.phone_country) {
            (Some(ip_c), Some(phone_c)) if ip_c != phone_c => Ok(RuleVerdict::Additive(ctx.config.geo_mismatch_penalty)),
            _ => Ok(RuleVerdict::None),
        }
    }
}

/// R8: the phone's country is not on the configured allowlist, when one is
/// configured.
pub struct CountryGate;

#[async_trait]
impl FraudRule for CountryGate {
    fn code(&self) -> &'static str {
        "country_gate"
    }

    async fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<RuleVerdict, FraudError> {
        if ctx.config.country_allowlist.is_empty() {
            return Ok(RuleVerdict::None);
        }
        let allowed = ctx
            .phone_country
            .is_some_and(|c| ctx.config.country_allowlist.iter().any(|a| a == c.as_str()));
        if allowed {
            Ok(RuleVerdict::None)
        } else {
            Ok(RuleVerdict::Additive(40))
        }
    }
}

/// R9: the phone-keyed circuit breaker is open, or has reached the failure
/// threshold (in which case this rule also opens it).
pub struct BreakerPhone;

#[async_trait]
impl FraudRule for BreakerPhone {
    fn code(&self) -> &'static str {
        "breaker_phone"
    }

    async fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<RuleVerdict, FraudError> {
        evaluate_breaker(ctx, &CircuitBreaker::phone_key(ctx.phone), 50).await
    }
}

/// R10: the subnet-keyed circuit breaker is open, or has reached the
/// failure threshold.
pub struct BreakerIp;

#[async_trait]
impl FraudRule for BreakerIp {
    fn code(&self) -> &'static str {
        "breaker_ip"
    }

    async fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<RuleVerdict, FraudError> {
        evaluate_breaker(ctx, &CircuitBreaker::ip_key(ctx.ip_subnet), 40).await
    }
}

async fn evaluate_breaker(ctx: &RuleContext<'_>, key: &str, penalty: i32) -> Result<RuleVerdict, FraudError> {
    let mut breaker = ctx
        .store
        .get_breaker(key)
        .await?
        .unwrap_or_else(|| CircuitBreaker::closed(key));

    let threshold = ctx.config.breaker_failure_threshold;
    if !breaker.should_penalize(threshold) {
        return Ok(RuleVerdict::None);
    }

    if breaker.state == otpgw_core::BreakerState::Closed {
        breaker.record_failure(threshold, ctx.now);
        ctx.store.save_breaker(&breaker).await?;
    }

    Ok(RuleVerdict::Additive(penalty))
}

/// The ten rules, in the exact order spec §4.B requires: three instant
/// rules first, then the seven additive rules.
#[must_use]
pub fn default_rules() -> Vec<Box<dyn FraudRule>> {
    vec![
        Box::new(AsnBlocklist),
        Box::new(HoneypotHit),
        Box::new(IpBanned),
        Box::new(RateLimitMinuteSubnet),
        Box::new(RateLimitHourSubnet),
        Box::new(RateLimitHourPhone),
        Box::new(GeoMismatch),
        Box::new(CountryGate),
        Box::new(BreakerPhone),
        Box::new(BreakerIp),
    ]
}
