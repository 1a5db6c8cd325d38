use async_trait::async_trait;

use otpgw_core::{
    CallerIdRoute, Channel, ChannelEventType, CircuitBreaker, Event, EventData, HoneypotEntry, Reputation,
    Request, RequestId, RequestPatch, WhitelistEntry,
};

use crate::error::StoreError;
use crate::filter::{Page, RequestFilter};

/// Relational store for the request/event lifecycle and its supporting
/// tables (spec §4.A). All reads happen by primary key or a small indexed
/// range; writes that mutate both `request` and `event` for one logical
/// event are transactional.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_request(&self, request: &Request) -> Result<(), StoreError>;

    async fn get_request(&self, id: &RequestId) -> Result<Option<Request>, StoreError>;

    /// Find a request by its provider-assigned id, matched
    /// case-insensitively (spec §6 `POST /webhooks/dlr`: "Correlated by
    /// `id` against `provider_id` case-insensitively").
    async fn find_request_by_provider_id(&self, provider_id: &str) -> Result<Option<Request>, StoreError>;

    async fn update_request_partial(&self, id: &RequestId, patch: &RequestPatch) -> Result<(), StoreError>;

    /// Append an event and apply `patch` to the owning request in a single
    /// transaction (spec §4.E step 2 + step 4). Returns the new event id.
    async fn append_event_and_update_request(
        &self,
        request_id: &RequestId,
        channel: Channel,
        event_type: ChannelEventType,
        event_data: EventData,
        patch: &RequestPatch,
    ) -> Result<i64, StoreError>;

    /// `true` if a terminal delivery event (`delivered`/`completed`)
    /// already exists for `(request_id, channel)` -- the duplicate
    /// suppression check in spec §4.E step 1.
    async fn has_terminal_event(&self, request_id: &RequestId, channel: Channel) -> Result<bool, StoreError>;

    async fn list_events(&self, request_id: &RequestId) -> Result<Vec<Event>, StoreError>;

    async fn list_requests(&self, filter: &RequestFilter, page: Page) -> Result<Vec<Request>, StoreError>;

    async fn get_reputation(&self, subject: &str) -> Result<Option<Reputation>, StoreError>;

    /// Record a successful verification: increments `total` and `verified`,
    /// creating the row if absent (spec §4.B `record_success`).
    async fn record_reputation_success(&self, subject: &str, now: chrono::DateTime<chrono::Utc>) -> Result<Reputation, StoreError>;

    /// Record a failed delivery/verification: increments `total` and
    /// `failed` (spec §4.B `record_failure`).
    async fn record_reputation_failure(&self, subject: &str, now: chrono::DateTime<chrono::Utc>) -> Result<Reputation, StoreError>;

    async fn ban_reputation(&self, subject: &str) -> Result<(), StoreError>;

    async fn get_breaker(&self, key: &str) -> Result<Option<CircuitBreaker>, StoreError>;

    async fn save_breaker(&self, breaker: &CircuitBreaker) -> Result<(), StoreError>;

    async fn list_routes(&self, channel: Channel) -> Result<Vec<CallerIdRoute>, StoreError>;

    async fn upsert_route(&self, route: &CallerIdRoute) -> Result<(), StoreError>;

    async fn is_whitelisted(&self, ip: &str, phone: &str) -> Result<bool, StoreError>;

    async fn list_whitelist(&self) -> Result<Vec<WhitelistEntry>, StoreError>;

    async fn is_honeypot_active(&self, subnet: &str, now: chrono::DateTime<chrono::Utc>) -> Result<bool, StoreError>;

    async fn insert_honeypot(&self, entry: &HoneypotEntry) -> Result<(), StoreError>;
}
