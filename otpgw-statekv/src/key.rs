use serde::{Deserialize, Serialize};

/// The kind of value addressed by a [`StateKey`]. Kept small and specific
/// to what the fraud engine and dispatch pipeline actually need -- this is
/// a single-process store, so there is no namespace/tenant dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    /// Sliding-window rate counter (R4/R5/R6).
    RateCounter,
    /// Generic TTL-scoped dedup marker.
    Dedup,
}

impl KeyKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RateCounter => "rate_counter",
            Self::Dedup => "dedup",
        }
    }
}

impl std::fmt::Display for KeyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key used to address entries in a [`crate::StateStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateKey {
    pub kind: KeyKind,
    pub id: String,
}

impl StateKey {
    #[must_use]
    pub fn new(kind: KeyKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }

    /// Canonical string form: `kind:id`.
    #[must_use]
    pub fn canonical(&self) -> String {
        format!("{}:{}", self.kind, self.id)
    }

    /// The rate-counter key for rule R4 (per-minute subnet count).
    #[must_use]
    pub fn rate_min_subnet(subnet: &str) -> Self {
        Self::new(KeyKind::RateCounter, format!("subnet_min:{subnet}"))
    }

    /// The rate-counter key for rule R5 (per-hour subnet count).
    #[must_use]
    pub fn rate_hour_subnet(subnet: &str) -> Self {
        Self::new(KeyKind::RateCounter, format!("subnet_hour:{subnet}"))
    }

    /// The rate-counter key for rule R6 (per-hour phone count).
    #[must_use]
    pub fn rate_hour_phone(phone: &str) -> Self {
        Self::new(KeyKind::RateCounter, format!("phone_hour:{phone}"))
    }
}

impl std::fmt::Display for StateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical())
    }
}
