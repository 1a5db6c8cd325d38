//! Filter predicates for the admin-facing paginated list query (spec §4.A:
//! "Paginated list queries with filter predicates ... for admin consumers
//! only").

use otpgw_core::{Channel, RequestStatus};

/// Filter predicates for `Store::list_requests`. All fields are optional;
/// an absent field imposes no constraint.
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub channel: Option<Channel>,
    pub phone_substring: Option<String>,
    pub country: Option<String>,
    pub min_fraud_score: Option<i32>,
    pub max_fraud_score: Option<i32>,
    pub since: Option<chrono::DateTime<chrono::Utc>>,
    pub until: Option<chrono::DateTime<chrono::Utc>>,
}

/// Offset/limit pagination, following the teacher's admin-query convention.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub offset: i64,
    pub limit: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self { offset: 0, limit: 50 }
    }
}
