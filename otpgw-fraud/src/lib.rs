//! Multi-rule fraud scoring engine with shadow-ban semantics (spec §4.B).
//!
//! Ten fixed rules run in a fixed order: three instant rules that reject a
//! request outright, then seven additive rules whose points accumulate into
//! a score. A request whose score reaches the shadow-ban threshold is not
//! rejected -- it is faked through as if delivery succeeded, while a
//! honeypot entry quietly starts rejecting the source subnet.

pub mod config;
pub mod engine;
pub mod error;
pub mod resolvers;
pub mod rule;
pub mod rules;
pub mod types;

pub use config::FraudConfig;
pub use engine::FraudEngine;
pub use error::FraudError;
pub use resolvers::{AsnResolver, CallingCodeTable, GeoIpResolver, NullAsnResolver, NullGeoIpResolver, PhoneIntelligence};
pub use rule::{FraudRule, RuleContext, RuleVerdict};
pub use types::{FraudInput, FraudOutput};
