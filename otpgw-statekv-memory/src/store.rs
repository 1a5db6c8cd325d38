use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use otpgw_statekv::error::StateError;
use otpgw_statekv::key::StateKey;
use otpgw_statekv::store::{CasResult, StateStore};

/// A single entry in the in-memory store.
#[derive(Debug, Clone)]
struct Entry {
    value: String,
    version: u64,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

fn expiry_from_ttl(ttl: Option<Duration>) -> Option<Instant> {
    ttl.map(|d| Instant::now() + d)
}

/// In-memory [`StateStore`] backed by a [`DashMap`], with lazy TTL eviction
/// on read. Used by `otpgw-fraud` unit tests and as the default backend
/// when no distributed deployment is needed.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    data: DashMap<String, Entry>,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn render_key(key: &StateKey) -> String {
        key.canonical()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn check_and_set(&self, key: &StateKey, value: &str, ttl: Option<Duration>) -> Result<bool, StateError> {
        let rendered = Self::render_key(key);

        if let Some(existing) = self.data.get(&rendered) {
            if !existing.is_expired() {
                return Ok(false);
            }
        }
        self.data.remove_if(&rendered, |_, entry| entry.is_expired());

        let was_inserted = match self.data.entry(rendered) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(Entry {
                    value: value.to_owned(),
                    version: 1,
                    expires_at: expiry_from_ttl(ttl),
                });
                true
            }
        };

        Ok(was_inserted)
    }

    async fn get(&self, key: &StateKey) -> Result<Option<String>, StateError> {
        let rendered = Self::render_key(key);

        if let Some(entry) = self.data.get(&rendered) {
            if entry.is_expired() {
                drop(entry);
                self.data.remove(&rendered);
                return Ok(None);
            }
            return Ok(Some(entry.value.clone()));
        }

        Ok(None)
    }

    async fn set(&self, key: &StateKey, value: &str, ttl: Option<Duration>) -> Result<(), StateError> {
        let rendered = Self::render_key(key);
        let expires_at = expiry_from_ttl(ttl);

        self.data
            .entry(rendered)
            .and_modify(|entry| {
                value.clone_into(&mut entry.value);
                entry.version += 1;
                entry.expires_at = expires_at;
            })
            .or_insert_with(|| Entry {
                value: value.to_owned(),
                version: 1,
                expires_at,
            });

        Ok(())
    }

    async fn delete(&self, key: &StateKey) -> Result<bool, StateError> {
        let rendered = Self::render_key(key);

        match self.data.remove(&rendered) {
            Some((_, entry)) => Ok(!entry.is_expired()),
            None => Ok(false),
        }
    }

    async fn increment(&self, key: &StateKey, delta: i64, ttl: Option<Duration>) -> Result<i64, StateError> {
        let rendered = Self::render_key(key);

        self.data.remove_if(&rendered, |_, entry| entry.is_expired());

        let mut ref_mut = self.data.entry(rendered).or_insert_with(|| Entry {
            value: "0".to_owned(),
            version: 1,
            expires_at: expiry_from_ttl(ttl),
        });

        let current: i64 = ref_mut
            .value
            .parse()
            .map_err(|e: std::num::ParseIntError| StateError::Serialization(format!("counter value is not an integer: {e}")))?;

        let new_value = current + delta;
        ref_mut.value = new_value.to_string();
        ref_mut.version += 1;

        Ok(new_value)
    }

    async fn compare_and_swap(
        &self,
        key: &StateKey,
        expected_version: u64,
        new_value: &str,
        ttl: Option<Duration>,
    ) -> Result<CasResult, StateError> {
        let rendered = Self::render_key(key);

        self.data.remove_if(&rendered, |_, entry| entry.is_expired());

        let Some(mut entry) = self.data.get_mut(&rendered) else {
            return Ok(CasResult::Conflict {
                current_value: None,
                current_version: 0,
            });
        };

        if entry.version != expected_version {
            return Ok(CasResult::Conflict {
                current_value: Some(entry.value.clone()),
                current_version: entry.version,
            });
        }

        new_value.clone_into(&mut entry.value);
        entry.version += 1;
        entry.expires_at = expiry_from_ttl(ttl).or(entry.expires_at);

        Ok(CasResult::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otpgw_statekv::key::KeyKind;

    fn test_key(id: &str) -> StateKey {
        StateKey::new(KeyKind::RateCounter, id)
    }

    #[tokio::test]
    async fn check_and_set_then_rejects_second_write() {
        let store = MemoryStateStore::new();
        let key = test_key("cas-1");
        assert!(store.check_and_set(&key, "v1", None).await.unwrap());
        assert!(!store.check_and_set(&key, "v2", None).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_expiry_via_get() {
        let store = MemoryStateStore::new();
        let key = test_key("ttl-expire");

        store.set(&key, "short-lived", Some(Duration::from_secs(5))).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap().as_deref(), Some("short-lived"));

        tokio::time::advance(Duration::from_secs(6)).await;

        assert!(store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn increment_resets_after_expiry() {
        let store = MemoryStateStore::new();
        let key = test_key("ttl-counter");

        store.increment(&key, 10, Some(Duration::from_secs(2))).await.unwrap();
        tokio::time::advance(Duration::from_secs(3)).await;

        let val = store.increment(&key, 1, None).await.unwrap();
        assert_eq!(val, 1, "counter should reset after TTL expiry");
    }

    #[tokio::test]
    async fn delete_returns_false_for_missing() {
        let store = MemoryStateStore::new();
        let key = test_key("never-set");
        assert!(!store.delete(&key).await.unwrap());
    }

    #[tokio::test]
    async fn compare_and_swap_detects_version_conflict() {
        let store = MemoryStateStore::new();
        let key = test_key("cas-conflict");
        store.set(&key, "v1", None).await.unwrap();

        let result = store.compare_and_swap(&key, 99, "v2", None).await.unwrap();
        assert!(matches!(result, CasResult::Conflict { .. }));
    }
}
