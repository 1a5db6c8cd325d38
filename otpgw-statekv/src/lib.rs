//! Generic TTL-aware key/value store abstraction. Backs the fraud engine's
//! sliding rate counters; the relational request/event data lives in
//! `otpgw-store` instead, since it doesn't fit a flat key/value shape.
//!
//! No distributed lock is exposed here: the spec assumes one process owns
//! one store, so cross-process coordination is out of scope.

pub mod error;
pub mod key;
pub mod store;

pub use error::StateError;
pub use key::{KeyKind, StateKey};
pub use store::{CasResult, StateStore};
