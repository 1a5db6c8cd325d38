//! In-memory [`Store`] test double, grounded in `acteon-state-memory`'s
//! `DashMap`-backed approach. Lets every other crate's tests run without a
//! real SQLite file (spec §10 Test tooling).

use std::sync::RwLock;

use async_trait::async_trait;

use otpgw_core::{
    CallerIdRoute, Channel, ChannelEventType, CircuitBreaker, Event, EventData, HoneypotEntry, Reputation,
    Request, RequestId, RequestPatch, WhitelistEntry, WhitelistType,
};

use crate::error::StoreError;
use crate::filter::{Page, RequestFilter};
use crate::store::Store;

#[derive(Default)]
struct Inner {
    requests: std::collections::HashMap<String, Request>,
    events: Vec<Event>,
    next_event_id: i64,
    reputation: std::collections::HashMap<String, Reputation>,
    breakers: std::collections::HashMap<String, CircuitBreaker>,
    routes: Vec<CallerIdRoute>,
    whitelist: Vec<WhitelistEntry>,
    honeypot: Vec<HoneypotEntry>,
}

/// In-memory store. Single-process, guarded by a `RwLock` -- adequate for
/// tests and for the reference single-node deployment described in §1's
/// Non-goals (no multi-node coordination).
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn apply_patch(request: &mut Request, patch: &RequestPatch) {
        if let Some(v) = patch.status {
            request.status = v;
        }
        if let Some(v) = patch.channel_status {
            request.channel_status = Some(v);
        }
        if let Some(v) = patch.channel {
            request.channel = Some(v);
        }
        if let Some(v) = patch.auth_status {
            request.auth_status = v;
        }
        if let Some(ref v) = patch.fraud_reasons {
            request.fraud_reasons = v.clone();
        }
        if let Some(v) = patch.fraud_score {
            request.fraud_score = v;
        }
        if let Some(v) = patch.shadow_banned {
            request.shadow_banned = v;
        }
        if let Some(ref v) = patch.provider_id {
            request.provider_id = Some(v.clone());
        }
        if let Some(ref v) = patch.error_message {
            request.error_message = Some(v.clone());
        }
        if let Some(v) = patch.start_time {
            request.start_time = Some(v);
        }
        if let Some(v) = patch.answer_time {
            request.answer_time = Some(v);
        }
        if let Some(v) = patch.end_time {
            request.end_time = Some(v);
        }
        if let Some(v) = patch.sms_cost_units {
            request.sms_cost_units = v;
        }
        if let Some(v) = patch.voice_cost_units {
            request.voice_cost_units = v;
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_request(&self, request: &Request) -> Result<(), StoreError> {
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.requests.insert(request.id.as_str().to_owned(), request.clone());
        Ok(())
    }

    async fn get_request(&self, id: &RequestId) -> Result<Option<Request>, StoreError> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner.requests.get(id.as_str()).cloned())
    }

    async fn find_request_by_provider_id(&self, provider_id: &str) -> Result<Option<Request>, StoreError> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner
            .requests
            .values()
            .find(|r| r.provider_id.as_deref().is_some_and(|p| p.eq_ignore_ascii_case(provider_id)))
            .cloned())
    }

    async fn update_request_partial(&self, id: &RequestId, patch: &RequestPatch) -> Result<(), StoreError> {
        let mut inner = self.inner.write().expect("lock poisoned");
        let request = inner
            .requests
            .get_mut(id.as_str())
            .ok_or_else(|| StoreError::RequestNotFound(id.to_string()))?;
        Self::apply_patch(request, patch);
        request.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn append_event_and_update_request(
        &self,
        request_id: &RequestId,
        channel: Channel,
        event_type: ChannelEventType,
        event_data: EventData,
        patch: &RequestPatch,
    ) -> Result<i64, StoreError> {
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.next_event_id += 1;
        let id = inner.next_event_id;
        inner.events.push(Event {
            id,
            request_id: request_id.clone(),
            channel,
            event_type,
            event_data,
            created_at: chrono::Utc::now(),
        });
        let request = inner
            .requests
            .get_mut(request_id.as_str())
            .ok_or_else(|| StoreError::RequestNotFound(request_id.to_string()))?;
        Self::apply_patch(request, patch);
        request.updated_at = chrono::Utc::now();
        Ok(id)
    }

    async fn has_terminal_event(&self, request_id: &RequestId, channel: Channel) -> Result<bool, StoreError> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner
            .events
            .iter()
            .any(|e| e.request_id == *request_id && e.channel == channel && e.event_type.is_terminal_delivery()))
    }

    async fn list_events(&self, request_id: &RequestId) -> Result<Vec<Event>, StoreError> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner
            .events
            .iter()
            .filter(|e| e.request_id == *request_id)
            .cloned()
            .collect())
    }

    async fn list_requests(&self, filter: &RequestFilter, page: Page) -> Result<Vec<Request>, StoreError> {
        let inner = self.inner.read().expect("lock poisoned");
        let mut matches: Vec<Request> = inner
            .requests
            .values()
            .filter(|r| filter.status.is_none_or(|s| r.status == s))
            .filter(|r| filter.channel.is_none_or(|c| r.channel == Some(c)))
            .filter(|r| {
                filter
                    .phone_substring
                    .as_ref()
                    .is_none_or(|s| r.phone.as_str().contains(s.as_str()))
            })
            .filter(|r| {
                filter
                    .country
                    .as_ref()
                    .is_none_or(|c| r.phone_country.as_ref().is_some_and(|pc| pc.as_str() == c))
            })
            .filter(|r| filter.min_fraud_score.is_none_or(|m| r.fraud_score >= m))
            .filter(|r| filter.max_fraud_score.is_none_or(|m| r.fraud_score <= m))
            .filter(|r| filter.since.is_none_or(|s| r.created_at >= s))
            .filter(|r| filter.until.is_none_or(|u| r.created_at <= u))
            .cloned()
            .collect();
        matches.sort_by_key(|r| r.created_at);
        let start = usize::try_from(page.offset).unwrap_or(0).min(matches.len());
        let end = start
            .saturating_add(usize::try_from(page.limit).unwrap_or(0))
            .min(matches.len());
        Ok(matches[start..end].to_vec())
    }

    async fn get_reputation(&self, subject: &str) -> Result<Option<Reputation>, StoreError> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner.reputation.get(subject).cloned())
    }

    async fn record_reputation_success(
        &self,
        subject: &str,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Reputation, StoreError> {
        let mut inner = self.inner.write().expect("lock poisoned");
        let rep = inner
            .reputation
            .entry(subject.to_owned())
            .or_insert_with(|| Reputation::new(subject, now));
        rep.total += 1;
        rep.verified += 1;
        rep.last_seen = now;
        Ok(rep.clone())
    }

    async fn record_reputation_failure(
        &self,
        subject: &str,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Reputation, StoreError> {
        let mut inner = self.inner.write().expect("lock poisoned");
        let rep = inner
            .reputation
            .entry(subject.to_owned())
            .or_insert_with(|| Reputation::new(subject, now));
        rep.total += 1;
        rep.failed += 1;
        rep.last_seen = now;
        Ok(rep.clone())
    }

    async fn ban_reputation(&self, subject: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().expect("lock poisoned");
        let now = chrono::Utc::now();
        let rep = inner
            .reputation
            .entry(subject.to_owned())
            .or_insert_with(|| Reputation::new(subject, now));
        rep.banned = true;
        Ok(())
    }

    async fn get_breaker(&self, key: &str) -> Result<Option<CircuitBreaker>, StoreError> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner.breakers.get(key).cloned())
    }

    async fn save_breaker(&self, breaker: &CircuitBreaker) -> Result<(), StoreError> {
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.breakers.insert(breaker.key.clone(), breaker.clone());
        Ok(())
    }

    async fn list_routes(&self, channel: Channel) -> Result<Vec<CallerIdRoute>, StoreError> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner
            .routes
            .iter()
            .filter(|r| r.channel == channel && r.enabled)
            .cloned()
            .collect())
    }

    async fn upsert_route(&self, route: &CallerIdRoute) -> Result<(), StoreError> {
        let mut inner = self.inner.write().expect("lock poisoned");
        if let Some(existing) = inner
            .routes
            .iter_mut()
            .find(|r| r.channel == route.channel && r.prefix == route.prefix)
        {
            *existing = route.clone();
        } else {
            inner.routes.push(route.clone());
        }
        Ok(())
    }

    async fn is_whitelisted(&self, ip: &str, phone: &str) -> Result<bool, StoreError> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner.whitelist.iter().any(|e| match e.entry_type {
            WhitelistType::Ip => e.value == ip,
            WhitelistType::Phone => e.value == phone,
        }))
    }

    async fn list_whitelist(&self) -> Result<Vec<WhitelistEntry>, StoreError> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner.whitelist.clone())
    }

    async fn is_honeypot_active(&self, subnet: &str, now: chrono::DateTime<chrono::Utc>) -> Result<bool, StoreError> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner.honeypot.iter().any(|e| e.subnet == subnet && e.is_active(now)))
    }

    async fn insert_honeypot(&self, entry: &HoneypotEntry) -> Result<(), StoreError> {
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.honeypot.retain(|e| e.subnet != entry.subnet);
        inner.honeypot.push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otpgw_core::{AuthStatus, RequestStatus};

    fn sample_request(phone: &str) -> Request {
        let now = chrono::Utc::now();
        Request {
            id: RequestId::generate(),
            phone: otpgw_core::Phone::new(phone),
            code_hash: otpgw_core::hash_code("123456"),
            status: RequestStatus::Pending,
            channel_status: None,
            channel: None,
            auth_status: AuthStatus::Unverified,
            channels_requested: vec![Channel::Sms],
            ip_address: "203.0.113.5".to_owned(),
            ip_subnet: otpgw_core::derive_subnet("203.0.113.5"),
            asn: None,
            ip_country: None,
            phone_country: None,
            phone_prefix: None,
            fraud_score: 0,
            fraud_reasons: Vec::new(),
            shadow_banned: false,
            webhook_url: None,
            session_id: None,
            provider_id: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            expires_at: now + chrono::Duration::minutes(5),
            start_time: None,
            answer_time: None,
            end_time: None,
            sms_cost_units: 0,
            voice_cost_units: 0,
        }
    }

    #[tokio::test]
    async fn create_and_get_roundtrip() {
        let store = MemoryStore::new();
        let req = sample_request("+15551234567");
        store.create_request(&req).await.unwrap();
        let fetched = store.get_request(&req.id).await.unwrap().unwrap();
        assert_eq!(fetched.phone.as_str(), "+15551234567");
    }

    #[tokio::test]
    async fn append_event_updates_request_atomically() {
        let store = MemoryStore::new();
        let req = sample_request("+15551234567");
        store.create_request(&req).await.unwrap();

        let patch = RequestPatch {
            status: Some(RequestStatus::Sending),
            channel_status: Some(ChannelEventType::Sending),
            ..Default::default()
        };
        store
            .append_event_and_update_request(&req.id, Channel::Sms, ChannelEventType::Sending, EventData::new(), &patch)
            .await
            .unwrap();

        let fetched = store.get_request(&req.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, RequestStatus::Sending);
        let events = store.list_events(&req.id).await.unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_terminal_event_is_detectable() {
        let store = MemoryStore::new();
        let req = sample_request("+15551234567");
        store.create_request(&req).await.unwrap();
        store
            .append_event_and_update_request(
                &req.id,
                Channel::Sms,
                ChannelEventType::Delivered,
                EventData::new(),
                &RequestPatch::default(),
            )
            .await
            .unwrap();
        assert!(store.has_terminal_event(&req.id, Channel::Sms).await.unwrap());
    }

    #[tokio::test]
    async fn reputation_tracks_success_and_failure() {
        let store = MemoryStore::new();
        let now = chrono::Utc::now();
        store.record_reputation_success("203.0.113.0/24", now).await.unwrap();
        store.record_reputation_failure("203.0.113.0/24", now).await.unwrap();
        let rep = store.get_reputation("203.0.113.0/24").await.unwrap().unwrap();
        assert_eq!(rep.total, 2);
        assert_eq!(rep.verified, 1);
        assert_eq!(rep.failed, 1);
    }
}
