//! Channel providers (spec §4.D): the SMS provider speaks HTTP directly;
//! the voice provider lives in `otpgw-voice` and implements the same
//! [`otpgw_core::ChannelProvider`] contract by delegating to the Voice
//! Orchestrator.

pub mod error;
pub mod sms;

pub use error::ProviderError;
pub use sms::{SmsProvider, SmsProviderConfig};
