//! Caller-ID routing rows (spec §3, §4.C). The in-memory cache and lookup
//! logic live in `otpgw-router`; this module only carries the record shape
//! shared with `otpgw-store`.

use serde::{Deserialize, Serialize};

use crate::types::Channel;

/// The catch-all prefix, always evaluated last regardless of insertion
/// order (spec §9(b), frozen Open Question decision).
pub const CATCH_ALL_PREFIX: &str = "*";

/// A single caller-ID routing rule: `(channel, prefix, caller_id, enabled)`,
/// unique on `(channel, prefix)` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallerIdRoute {
    pub channel: Channel,
    pub prefix: String,
    pub caller_id: String,
    pub enabled: bool,
}

impl CallerIdRoute {
    #[must_use]
    pub fn is_catch_all(&self) -> bool {
        self.prefix == CATCH_ALL_PREFIX
    }
}
