//! Backoff curve shared by the webhook dispatcher (spec §4.L: fixed 2s/10s/
//! 30s schedule) and the telephony management listener's reconnector
//! (spec §4.I: exponential, initial 5s, capped at 10 attempts).

pub mod retry;

pub use retry::RetryStrategy;
