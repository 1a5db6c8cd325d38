//! Whitelist entries that bypass the fraud engine entirely (spec §3, §4.B).

use serde::{Deserialize, Serialize};

/// The kind of value a whitelist entry matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhitelistType {
    Ip,
    Phone,
}

/// A single whitelist row; any match short-circuits the Fraud Engine with
/// `{allowed: true, shadow_ban: false, score: 0}` (spec §4.B).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhitelistEntry {
    pub entry_type: WhitelistType,
    pub value: String,
    pub description: Option<String>,
}
