use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("store error: {0}")]
    Store(#[from] otpgw_store::StoreError),

    #[error("request not found: {0}")]
    RequestNotFound(String),
}
