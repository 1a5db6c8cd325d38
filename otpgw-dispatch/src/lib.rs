//! Dispatch Service (spec §4.J): the entry point that ties the Fraud
//! Engine, Caller-ID Router, channel providers, and Shadow-Ban Simulator
//! together into one `POST /dispatch` call.

pub mod error;
pub mod normalize;
pub mod service;

pub use error::DispatchError;
pub use normalize::{normalize_phone, validate_code};
pub use service::{DispatchInput, DispatchOutput, DispatchService};
