//! SQLite-backed [`Store`] implementation (spec §4.A), grounded in
//! `acteon-state-postgres::store::PostgresStateStore`'s pool + upsert idioms
//! but adapted to the embedded single-process backend the spec's Non-goals
//! require ("no persistence beyond a single embedded relational store").

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};

use otpgw_core::{
    BreakerState, CallerIdRoute, Channel, ChannelEventType, CircuitBreaker, CountryCode, Event, EventData,
    HoneypotEntry, IpSubnet, Phone, Reputation, Request, RequestId, RequestPatch, RequestStatus, WhitelistEntry,
    WhitelistType,
};

use crate::error::StoreError;
use crate::filter::{Page, RequestFilter};
use crate::migrations;
use crate::store::Store;

/// SQLite-backed store. One pool, one file (or `:memory:` for tests),
/// matching the spec's single-process assumption.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to `database_url` (e.g. `sqlite://otpgw.db`), run migrations,
    /// and return a ready-to-use store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if the pool cannot be created, or
    /// [`StoreError::Backend`] if migrations fail.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        migrations::run_migrations(&pool).await.map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Wrap an already-open pool (migrations still run).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if migrations fail.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        migrations::run_migrations(&pool).await.map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { pool })
    }

    fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<Request, StoreError> {
        let channels_requested_raw: String = row.try_get("channels_requested")?;
        let channels_requested = channels_requested_raw
            .split(',')
            .filter(|s| !s.is_empty())
            .map(Channel::from_str)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let fraud_reasons_raw: String = row.try_get("fraud_reasons")?;
        let fraud_reasons = fraud_reasons_raw
            .split('\u{1f}')
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned)
            .collect();

        let status_raw: String = row.try_get("status")?;
        let status = parse_status(&status_raw)?;

        let channel_status_raw: Option<String> = row.try_get("channel_status")?;
        let channel_status = channel_status_raw
            .map(|s| ChannelEventType::from_str(&s))
            .transpose()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let channel_raw: Option<String> = row.try_get("channel")?;
        let channel = channel_raw.map(|s| Channel::from_str(&s)).transpose().map_err(|e| StoreError::Serialization(e.to_string()))?;

        let auth_status_raw: String = row.try_get("auth_status")?;
        let auth_status = parse_auth_status(&auth_status_raw)?;

        Ok(Request {
            id: RequestId::new(row.try_get::<String, _>("id")?),
            phone: Phone::new(row.try_get::<String, _>("phone")?),
            code_hash: row.try_get("code_hash")?,
            status,
            channel_status,
            channel,
            auth_status,
            channels_requested,
            ip_address: row.try_get("ip_address")?,
            ip_subnet: IpSubnet::new(row.try_get::<String, _>("ip_subnet")?),
            asn: row.try_get::<Option<i64>, _>("asn")?.map(|v| v as u32),
            ip_country: row.try_get::<Option<String>, _>("ip_country")?.map(CountryCode::new),
            phone_country: row.try_get::<Option<String>, _>("phone_country")?.map(CountryCode::new),
            phone_prefix: row.try_get("phone_prefix")?,
            fraud_score: row.try_get::<i64, _>("fraud_score")? as i32,
            fraud_reasons,
            shadow_banned: row.try_get::<i64, _>("shadow_banned")? != 0,
            webhook_url: row.try_get("webhook_url")?,
            session_id: row.try_get("session_id")?,
            provider_id: row.try_get("provider_id")?,
            error_message: row.try_get("error_message")?,
            created_at: parse_ts(row.try_get::<String, _>("created_at")?)?,
            updated_at: parse_ts(row.try_get::<String, _>("updated_at")?)?,
            expires_at: parse_ts(row.try_get::<String, _>("expires_at")?)?,
            start_time: row.try_get::<Option<String>, _>("start_time")?.map(parse_ts).transpose()?,
            answer_time: row.try_get::<Option<String>, _>("answer_time")?.map(parse_ts).transpose()?,
            end_time: row.try_get::<Option<String>, _>("end_time")?.map(parse_ts).transpose()?,
            sms_cost_units: row.try_get("sms_cost_units")?,
            voice_cost_units: row.try_get("voice_cost_units")?,
        })
    }
}

fn parse_ts(raw: String) -> Result<chrono::DateTime<chrono::Utc>, StoreError> {
    chrono::DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| StoreError::Serialization(e.to_string()))
}

fn parse_status(raw: &str) -> Result<RequestStatus, StoreError> {
    serde_json::from_value(serde_json::Value::String(raw.to_owned())).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn parse_auth_status(raw: &str) -> Result<otpgw_core::AuthStatus, StoreError> {
    serde_json::from_value(serde_json::Value::String(raw.to_owned())).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn status_str(s: RequestStatus) -> String {
    s.to_string()
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_request(&self, request: &Request) -> Result<(), StoreError> {
        let channels_requested = request
            .channels_requested
            .iter()
            .map(Channel::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let fraud_reasons = request.fraud_reasons.join("\u{1f}");

        sqlx::query(
            "INSERT INTO requests (
                id, phone, code_hash, status, channel_status, channel, auth_status,
                channels_requested, ip_address, ip_subnet, asn, ip_country, phone_country,
                phone_prefix, fraud_score, fraud_reasons, shadow_banned, webhook_url,
                session_id, provider_id, error_message, created_at, updated_at, expires_at,
                start_time, answer_time, end_time, sms_cost_units, voice_cost_units
            ) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)",
        )
        .bind(request.id.as_str())
        .bind(request.phone.as_str())
        .bind(&request.code_hash)
        .bind(status_str(request.status))
        .bind(request.channel_status.map(ChannelEventType::as_str))
        .bind(request.channel.map(Channel::as_str))
        .bind(request.auth_status.to_string())
        .bind(channels_requested)
        .bind(&request.ip_address)
        .bind(request.ip_subnet.as_str())
        .bind(request.asn.map(i64::from))
        .bind(request.ip_country.as_ref().map(otpgw_core::CountryCode::as_str))
        .bind(request.phone_country.as_ref().map(otpgw_core::CountryCode::as_str))
        .bind(&request.phone_prefix)
        .bind(i64::from(request.fraud_score))
        .bind(fraud_reasons)
        .bind(i64::from(request.shadow_banned))
        .bind(&request.webhook_url)
        .bind(&request.session_id)
        .bind(&request.provider_id)
        .bind(&request.error_message)
        .bind(request.created_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .bind(request.expires_at.to_rfc3339())
        .bind(request.start_time.map(|t| t.to_rfc3339()))
        .bind(request.answer_time.map(|t| t.to_rfc3339()))
        .bind(request.end_time.map(|t| t.to_rfc3339()))
        .bind(request.sms_cost_units)
        .bind(request.voice_cost_units)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_request(&self, id: &RequestId) -> Result<Option<Request>, StoreError> {
        let row = sqlx::query("SELECT * FROM requests WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_request).transpose()
    }

    async fn find_request_by_provider_id(&self, provider_id: &str) -> Result<Option<Request>, StoreError> {
        let row = sqlx::query("SELECT * FROM requests WHERE provider_id = ? COLLATE NOCASE")
            .bind(provider_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_request).transpose()
    }

    async fn update_request_partial(&self, id: &RequestId, patch: &RequestPatch) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        apply_patch_sql(&mut tx, id, patch).await?;
        tx.commit().await?;
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
        let mut tx = self.pool.begin().await?;

        let data_json = serde_json::to_string(&event_data).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let result = sqlx::query(
            "INSERT INTO events (request_id, channel, event_type, event_data, created_at) VALUES (?,?,?,?,?)",
        )
        .bind(request_id.as_str())
        .bind(channel.as_str())
        .bind(event_type.as_str())
        .bind(data_json)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;
        let event_id = result.last_insert_rowid();

        apply_patch_sql(&mut tx, request_id, patch).await?;

        tx.commit().await?;
        Ok(event_id)
    }

    async fn has_terminal_event(&self, request_id: &RequestId, channel: Channel) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "SELECT 1 FROM events WHERE request_id = ? AND channel = ? AND event_type IN ('delivered', 'completed') LIMIT 1",
        )
        .bind(request_id.as_str())
        .bind(channel.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn list_events(&self, request_id: &RequestId) -> Result<Vec<Event>, StoreError> {
        let rows = sqlx::query("SELECT * FROM events WHERE request_id = ? ORDER BY id ASC")
            .bind(request_id.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<Event, StoreError> {
                let event_data_raw: String = row.try_get("event_data")?;
                let event_data: EventData =
                    serde_json::from_str(&event_data_raw).map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok(Event {
                    id: row.try_get("id")?,
                    request_id: RequestId::new(row.try_get::<String, _>("request_id")?),
                    channel: Channel::from_str(&row.try_get::<String, _>("channel")?)
                        .map_err(|e| StoreError::Serialization(e.to_string()))?,
                    event_type: ChannelEventType::from_str(&row.try_get::<String, _>("event_type")?)
                        .map_err(|e| StoreError::Serialization(e.to_string()))?,
                    event_data,
                    created_at: parse_ts(row.try_get::<String, _>("created_at")?)?,
                })
            })
            .collect()
    }

    async fn list_requests(&self, filter: &RequestFilter, page: Page) -> Result<Vec<Request>, StoreError> {
        let mut sql = "SELECT * FROM requests WHERE 1=1".to_owned();
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.channel.is_some() {
            sql.push_str(" AND channel = ?");
        }
        if filter.phone_substring.is_some() {
            sql.push_str(" AND phone LIKE ?");
        }
        if filter.country.is_some() {
            sql.push_str(" AND phone_country = ?");
        }
        if filter.min_fraud_score.is_some() {
            sql.push_str(" AND fraud_score >= ?");
        }
        if filter.max_fraud_score.is_some() {
            sql.push_str(" AND fraud_score <= ?");
        }
        if filter.since.is_some() {
            sql.push_str(" AND created_at >= ?");
        }
        if filter.until.is_some() {
            sql.push_str(" AND created_at <= ?");
        }
        sql.push_str(" ORDER BY created_at ASC LIMIT ? OFFSET ?");

        let mut query = sqlx::query(&sql);
        if let Some(s) = filter.status {
            query = query.bind(status_str(s));
        }
        if let Some(c) = filter.channel {
            query = query.bind(c.as_str());
        }
        if let Some(ref s) = filter.phone_substring {
            query = query.bind(format!("%{s}%"));
        }
        if let Some(ref c) = filter.country {
            query = query.bind(c.clone());
        }
        if let Some(m) = filter.min_fraud_score {
            query = query.bind(i64::from(m));
        }
        if let Some(m) = filter.max_fraud_score {
            query = query.bind(i64::from(m));
        }
        if let Some(s) = filter.since {
            query = query.bind(s.to_rfc3339());
        }
        if let Some(u) = filter.until {
            query = query.bind(u.to_rfc3339());
        }
        query = query.bind(page.limit).bind(page.offset);

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_request).collect()
    }

    async fn get_reputation(&self, subject: &str) -> Result<Option<Reputation>, StoreError> {
        let row = sqlx::query("SELECT * FROM reputation WHERE subject = ?")
            .bind(subject)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_reputation(&r)).transpose()
    }

    async fn record_reputation_success(
        &self,
        subject: &str,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Reputation, StoreError> {
        upsert_reputation(&self.pool, subject, now, true).await
    }

    async fn record_reputation_failure(
        &self,
        subject: &str,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Reputation, StoreError> {
        upsert_reputation(&self.pool, subject, now, false).await
    }

    async fn ban_reputation(&self, subject: &str) -> Result<(), StoreError> {
        let now = chrono::Utc::now();
        sqlx::query(
            "INSERT INTO reputation (subject, total, verified, failed, banned, first_seen, last_seen)
             VALUES (?, 0, 0, 0, 1, ?, ?)
             ON CONFLICT(subject) DO UPDATE SET banned = 1, last_seen = excluded.last_seen",
        )
        .bind(subject)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_breaker(&self, key: &str) -> Result<Option<CircuitBreaker>, StoreError> {
        let row = sqlx::query("SELECT * FROM breakers WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_breaker(&r)).transpose()
    }

    async fn save_breaker(&self, breaker: &CircuitBreaker) -> Result<(), StoreError> {
        let state = match breaker.state {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
        };
        sqlx::query(
            "INSERT INTO breakers (key, failures, successes, state, opened_at) VALUES (?,?,?,?,?)
             ON CONFLICT(key) DO UPDATE SET failures = excluded.failures, successes = excluded.successes,
                 state = excluded.state, opened_at = excluded.opened_at",
        )
        .bind(&breaker.key)
        .bind(breaker.failures)
        .bind(breaker.successes)
        .bind(state)
        .bind(breaker.opened_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_routes(&self, channel: Channel) -> Result<Vec<CallerIdRoute>, StoreError> {
        let rows = sqlx::query("SELECT * FROM caller_id_routes WHERE channel = ? AND enabled = 1")
            .bind(channel.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| -> Result<CallerIdRoute, StoreError> {
                Ok(CallerIdRoute {
                    channel: Channel::from_str(&row.try_get::<String, _>("channel")?)
                        .map_err(|e| StoreError::Serialization(e.to_string()))?,
                    prefix: row.try_get("prefix")?,
                    caller_id: row.try_get("caller_id")?,
                    enabled: row.try_get::<i64, _>("enabled")? != 0,
                })
            })
            .collect()
    }

    async fn upsert_route(&self, route: &CallerIdRoute) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO caller_id_routes (channel, prefix, caller_id, enabled) VALUES (?,?,?,?)
             ON CONFLICT(channel, prefix) DO UPDATE SET caller_id = excluded.caller_id, enabled = excluded.enabled",
        )
        .bind(route.channel.as_str())
        .bind(&route.prefix)
        .bind(&route.caller_id)
        .bind(i64::from(route.enabled))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn is_whitelisted(&self, ip: &str, phone: &str) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "SELECT 1 FROM whitelist WHERE (entry_type = 'ip' AND value = ?) OR (entry_type = 'phone' AND value = ?) LIMIT 1",
        )
        .bind(ip)
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn list_whitelist(&self) -> Result<Vec<WhitelistEntry>, StoreError> {
        let rows = sqlx::query("SELECT * FROM whitelist").fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| -> Result<WhitelistEntry, StoreError> {
                let entry_type_raw: String = row.try_get("entry_type")?;
                Ok(WhitelistEntry {
                    entry_type: if entry_type_raw == "ip" { WhitelistType::Ip } else { WhitelistType::Phone },
                    value: row.try_get("value")?,
                    description: row.try_get("description")?,
                })
            })
            .collect()
    }

    async fn is_honeypot_active(&self, subnet: &str, now: chrono::DateTime<chrono::Utc>) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT expires_at FROM honeypot WHERE subnet = ?")
            .bind(subnet)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else { return Ok(false) };
        let expires_at = parse_ts(row.try_get::<String, _>("expires_at")?)?;
        Ok(now < expires_at)
    }

    async fn insert_honeypot(&self, entry: &HoneypotEntry) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO honeypot (subnet, reason, expires_at) VALUES (?,?,?)
             ON CONFLICT(subnet) DO UPDATE SET reason = excluded.reason, expires_at = excluded.expires_at",
        )
        .bind(&entry.subnet)
        .bind(&entry.reason)
        .bind(entry.expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

async fn apply_patch_sql(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    id: &RequestId,
    patch: &RequestPatch,
) -> Result<(), StoreError> {
    // Built field-by-field: sqlite lacks a convenient partial-upsert syntax
    // for arbitrary subsets, so each present field gets its own statement.
    // This runs inside the caller's transaction, so the whole patch is atomic.
    if let Some(v) = patch.status {
        sqlx::query("UPDATE requests SET status = ? WHERE id = ?").bind(status_str(v)).bind(id.as_str()).execute(&mut **tx).await?;
    }
    if let Some(v) = patch.channel_status {
        sqlx::query("UPDATE requests SET channel_status = ? WHERE id = ?").bind(v.as_str()).bind(id.as_str()).execute(&mut **tx).await?;
    }
    if let Some(v) = patch.channel {
        sqlx::query("UPDATE requests SET channel = COALESCE(channel, ?) WHERE id = ?").bind(v.as_str()).bind(id.as_str()).execute(&mut **tx).await?;
    }
    if let Some(v) = patch.auth_status {
        sqlx::query("UPDATE requests SET auth_status = ? WHERE id = ?").bind(v.to_string()).bind(id.as_str()).execute(&mut **tx).await?;
    }
    if let Some(v) = patch.fraud_score {
        sqlx::query("UPDATE requests SET fraud_score = ? WHERE id = ?").bind(i64::from(v)).bind(id.as_str()).execute(&mut **tx).await?;
    }
    if let Some(ref v) = patch.fraud_reasons {
        sqlx::query("UPDATE requests SET fraud_reasons = ? WHERE id = ?").bind(v.join("\u{1f}")).bind(id.as_str()).execute(&mut **tx).await?;
    }
    if let Some(v) = patch.shadow_banned {
        sqlx::query("UPDATE requests SET shadow_banned = ? WHERE id = ?").bind(i64::from(v)).bind(id.as_str()).execute(&mut **tx).await?;
    }
    if let Some(ref v) = patch.provider_id {
        sqlx::query("UPDATE requests SET provider_id = ? WHERE id = ?").bind(v).bind(id.as_str()).execute(&mut **tx).await?;
    }
    if let Some(ref v) = patch.error_message {
        sqlx::query("UPDATE requests SET error_message = ? WHERE id = ?").bind(v).bind(id.as_str()).execute(&mut **tx).await?;
    }
    if let Some(v) = patch.start_time {
        sqlx::query("UPDATE requests SET start_time = ? WHERE id = ?").bind(v.to_rfc3339()).bind(id.as_str()).execute(&mut **tx).await?;
    }
    if let Some(v) = patch.answer_time {
        sqlx::query("UPDATE requests SET answer_time = ? WHERE id = ?").bind(v.to_rfc3339()).bind(id.as_str()).execute(&mut **tx).await?;
    }
    if let Some(v) = patch.end_time {
        sqlx::query("UPDATE requests SET end_time = ? WHERE id = ?").bind(v.to_rfc3339()).bind(id.as_str()).execute(&mut **tx).await?;
    }
    if let Some(v) = patch.sms_cost_units {
        sqlx::query("UPDATE requests SET sms_cost_units = ? WHERE id = ?").bind(v).bind(id.as_str()).execute(&mut **tx).await?;
    }
    if let Some(v) = patch.voice_cost_units {
        sqlx::query("UPDATE requests SET voice_cost_units = ? WHERE id = ?").bind(v).bind(id.as_str()).execute(&mut **tx).await?;
    }
    sqlx::query("UPDATE requests SET updated_at = ? WHERE id = ?")
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(id.as_str())
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn upsert_reputation(
    pool: &SqlitePool,
    subject: &str,
    now: chrono::DateTime<chrono::Utc>,
    success: bool,
) -> Result<Reputation, StoreError> {
    let (verified_inc, failed_inc) = if success { (1, 0) } else { (0, 1) };
    sqlx::query(
        "INSERT INTO reputation (subject, total, verified, failed, banned, first_seen, last_seen)
         VALUES (?, 1, ?, ?, 0, ?, ?)
         ON CONFLICT(subject) DO UPDATE SET
             total = reputation.total + 1,
             verified = reputation.verified + ?,
             failed = reputation.failed + ?,
             last_seen = excluded.last_seen",
    )
    .bind(subject)
    .bind(verified_inc)
    .bind(failed_inc)
    .bind(now.to_rfc3339())
    .bind(now.to_rfc3339())
    .bind(verified_inc)
    .bind(failed_inc)
    .execute(pool)
    .await?;

    let row = sqlx::query("SELECT * FROM reputation WHERE subject = ?")
        .bind(subject)
        .fetch_one(pool)
        .await?;
    row_to_reputation(&row)
}

fn row_to_reputation(row: &sqlx::sqlite::SqliteRow) -> Result<Reputation, StoreError> {
    Ok(Reputation {
        subject: row.try_get("subject")?,
        total: row.try_get("total")?,
        verified: row.try_get("verified")?,
        failed: row.try_get("failed")?,
        banned: row.try_get::<i64, _>("banned")? != 0,
        first_seen: parse_ts(row.try_get::<String, _>("first_seen")?)?,
        last_seen: parse_ts(row.try_get::<String, _>("last_seen")?)?,
    })
}

fn row_to_breaker(row: &sqlx::sqlite::SqliteRow) -> Result<CircuitBreaker, StoreError> {
    let state_raw: String = row.try_get("state")?;
    Ok(CircuitBreaker {
        key: row.try_get("key")?,
        failures: row.try_get("failures")?,
        successes: row.try_get("successes")?,
        state: if state_raw == "open" { BreakerState::Open } else { BreakerState::Closed },
        opened_at: row.try_get::<Option<String>, _>("opened_at")?.map(parse_ts).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use otpgw_core::{AuthStatus, Phone, RequestId, RequestStatus};

    async fn test_store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:", 1).await.unwrap()
    }

    fn sample_request() -> Request {
        let now = chrono::Utc::now();
        Request {
            id: RequestId::generate(),
            phone: Phone::new("+15551234567"),
            code_hash: otpgw_core::hash_code("123456"),
            status: RequestStatus::Pending,
            channel_status: None,
            channel: None,
            auth_status: AuthStatus::Unverified,
            channels_requested: vec![Channel::Sms, Channel::Voice],
            ip_address: "203.0.113.5".to_owned(),
            ip_subnet: otpgw_core::derive_subnet("203.0.113.5"),
            asn: Some(64512),
            ip_country: Some(CountryCode::new("US")),
            phone_country: Some(CountryCode::new("US")),
            phone_prefix: Some("1555".to_owned()),
            fraud_score: 0,
            fraud_reasons: Vec::new(),
            shadow_banned: false,
            webhook_url: Some("https://example.com/hook".to_owned()),
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
    async fn create_and_fetch_roundtrip() {
        let store = test_store().await;
        let req = sample_request();
        store.create_request(&req).await.unwrap();

        let fetched = store.get_request(&req.id).await.unwrap().unwrap();
        assert_eq!(fetched.phone.as_str(), "+15551234567");
        assert_eq!(fetched.channels_requested, vec![Channel::Sms, Channel::Voice]);
        assert_eq!(fetched.asn, Some(64512));
    }

    #[tokio::test]
    async fn event_append_is_atomic_with_request_update() {
        let store = test_store().await;
        let req = sample_request();
        store.create_request(&req).await.unwrap();

        let patch = RequestPatch {
            status: Some(RequestStatus::Delivered),
            channel_status: Some(ChannelEventType::Delivered),
            channel: Some(Channel::Sms),
            ..Default::default()
        };
        store
            .append_event_and_update_request(&req.id, Channel::Sms, ChannelEventType::Delivered, EventData::new(), &patch)
            .await
            .unwrap();

        let fetched = store.get_request(&req.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, RequestStatus::Delivered);
        assert!(store.has_terminal_event(&req.id, Channel::Sms).await.unwrap());
    }

    #[tokio::test]
    async fn honeypot_expiry() {
        let store = test_store().await;
        let now = chrono::Utc::now();
        store
            .insert_honeypot(&HoneypotEntry {
                subnet: "203.0.113.0/24".to_owned(),
                reason: "shadow_ban_threshold".to_owned(),
                expires_at: now + chrono::Duration::hours(24),
            })
            .await
            .unwrap();
        assert!(store.is_honeypot_active("203.0.113.0/24", now).await.unwrap());
        assert!(!store
            .is_honeypot_active("203.0.113.0/24", now + chrono::Duration::hours(25))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn breaker_round_trip() {
        let store = test_store().await;
        let mut breaker = CircuitBreaker::closed(CircuitBreaker::phone_key("+15551234567"));
        breaker.record_failure(3, chrono::Utc::now());
        store.save_breaker(&breaker).await.unwrap();

        let fetched = store.get_breaker(&breaker.key).await.unwrap().unwrap();
        assert_eq!(fetched.failures, 1);
    }
}
