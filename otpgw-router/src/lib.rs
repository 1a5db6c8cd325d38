//! Caller-ID Router (spec §4.C): an in-memory, hot-reloadable, per-channel
//! longest-prefix lookup of outbound caller identity.

pub mod cache;
pub mod router;

pub use cache::RouteTable;
pub use router::{normalize_destination, CallerIdRouter};
