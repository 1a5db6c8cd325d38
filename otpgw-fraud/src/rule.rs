//! The `FraudRule` trait and the ordered-evaluation contract the ten rules
//! in spec §4.B share. Grounded in `acteon-rules`'s `RuleEngine::evaluate`
//! loop (ordered evaluation, short-circuit on an instant verdict, full
//! reason accumulation) but without that crate's generic expression
//! language -- the spec calls for ten fixed rules, not an operator-authored
//! rule file format.

use async_trait::async_trait;
use otpgw_core::CountryCode;
use otpgw_statekv::StateStore;
use otpgw_store::Store;

use crate::config::FraudConfig;
use crate::error::FraudError;

/// What a single rule contributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleVerdict {
    /// The rule did not trigger.
    None,
    /// An additive rule triggered; add this many points and keep evaluating.
    Additive(i32),
    /// An instant rule triggered: score becomes 100, evaluation stops.
    Instant,
}

/// Everything a rule needs to evaluate one request. Built once per
/// `FraudEngine::score` call and shared (by reference) across all ten
/// rules.
pub struct RuleContext<'a> {
    pub phone: &'a str,
    pub ip_subnet: &'a str,
    pub ip_country: Option<&'a CountryCode>,
    pub phone_country: Option<&'a CountryCode>,
    pub asn: Option<u32>,
    pub config: &'a FraudConfig,
    pub store: &'a (dyn Store + 'a),
    pub statekv: &'a (dyn StateStore + 'a),
    pub now: chrono::DateTime<chrono::Utc>,
}

/// One of the ten fixed fraud rules (spec §4.B table).
#[async_trait]
pub trait FraudRule: Send + Sync {
    /// Short reason code persisted into `Request::fraud_reasons` when this
    /// rule fires, e.g. `"asn_blocklist"`.
    fn code(&self) -> &'static str;

    async fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<RuleVerdict, FraudError>;
}
