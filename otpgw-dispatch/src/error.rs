use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid phone number: {0}")]
    InvalidPhone(String),

    #[error("invalid code: {0}")]
    InvalidCode(String),

    #[error("no channels requested")]
    NoChannels,

    #[error("store error: {0}")]
    Store(#[from] otpgw_store::StoreError),

    #[error("fraud engine error: {0}")]
    Fraud(#[from] otpgw_fraud::FraudError),

    #[error("no route or provider available for any requested channel")]
    NoProviderAvailable,
}
