//! The relational store (spec §4.A): durable state for requests, events,
//! reputation, circuit breakers, caller-ID routes, whitelist and honeypot
//! entries. Backed by SQLite (`otpgw-store::sqlite::SqliteStore`) in
//! production, or an in-memory double (`otpgw-store::memory::MemoryStore`)
//! in tests -- both implement the same [`Store`] trait.

pub mod error;
pub mod filter;
pub mod memory;
pub mod migrations;
pub mod sqlite;
pub mod store;

pub use error::StoreError;
pub use filter::{Page, RequestFilter};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::Store;
