use std::time::Duration;

use async_trait::async_trait;

use crate::error::StateError;
use crate::key::StateKey;

/// Result of a compare-and-swap operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasResult {
    Ok,
    Conflict {
        current_value: Option<String>,
        current_version: u64,
    },
}

/// Trait for a small TTL-aware key/value store.
///
/// This backs the fraud engine's sliding rate counters (§4.B R4-R6) and any
/// other short-lived dedup state. Implementations must be `Send + Sync`.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Check if a key exists; if not, set it atomically with an optional TTL.
    /// Returns `true` if the key was newly set, `false` if it already existed.
    async fn check_and_set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StateError>;

    /// Get the value for a key. Returns `None` if not found or expired.
    async fn get(&self, key: &StateKey) -> Result<Option<String>, StateError>;

    /// Set a value with an optional TTL, overwriting any previous value.
    async fn set(&self, key: &StateKey, value: &str, ttl: Option<Duration>) -> Result<(), StateError>;

    /// Delete a key. Returns `true` if the key existed.
    async fn delete(&self, key: &StateKey) -> Result<bool, StateError>;

    /// Atomically increment a counter by `delta`, creating it at 0 first if
    /// absent. `ttl` is applied only when the counter is freshly created, so
    /// a sliding window resets cleanly instead of having its deadline pushed
    /// out by every increment.
    async fn increment(&self, key: &StateKey, delta: i64, ttl: Option<Duration>) -> Result<i64, StateError>;

    /// Compare-and-swap: update value only if the current version matches.
    async fn compare_and_swap(
        &self,
        key: &StateKey,
        expected_version: u64,
        new_value: &str,
        ttl: Option<Duration>,
    ) -> Result<CasResult, StateError>;
}
