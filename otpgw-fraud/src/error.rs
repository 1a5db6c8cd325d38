use thiserror::Error;

/// Errors raised by the fraud engine.
#[derive(Debug, Error)]
pub enum FraudError {
    #[error("store error: {0}")]
    Store(#[from] otpgw_store::StoreError),

    #[error("state error: {0}")]
    State(#[from] otpgw_statekv::StateError),

    #[error("invalid phone number: {0}")]
    InvalidPhone(String),
}
