//! Core domain types and the status state machine for the OTP delivery
//! gateway: the `Request`/`Event` aggregates, the channel-event-to-status
//! mapping table, and the small value types shared by every other crate in
//! the workspace.

pub mod breaker;
pub mod call;
pub mod emitter;
pub mod error;
pub mod event;
pub mod honeypot;
pub mod provider;
pub mod reputation;
pub mod request;
pub mod route;
pub mod status;
pub mod types;
pub mod whitelist;

pub use breaker::{BreakerState, CircuitBreaker};
pub use call::{CallDurations, CallState};
pub use emitter::EventEmitter;
pub use error::CoreError;
pub use event::{ChannelEventType, Event, EventData};
pub use honeypot::HoneypotEntry;
pub use provider::{ChannelDispatchError, ChannelProvider, DispatchOutcome};
pub use reputation::Reputation;
pub use request::{Request, RequestPatch};
pub use route::{CallerIdRoute, CATCH_ALL_PREFIX};
pub use status::{combined_status, map_channel_event, AuthStatus, RequestStatus};
pub use types::{derive_subnet, hash_code, Channel, CountryCode, IpSubnet, Phone, RequestId};
pub use whitelist::{WhitelistEntry, WhitelistType};
