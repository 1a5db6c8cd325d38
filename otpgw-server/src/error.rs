use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use thiserror::Error;

/// Errors that can occur when running the OTP gateway server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O error (e.g. binding the listener).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A store error surfaced through the API.
    #[error("store error: {0}")]
    Store(#[from] otpgw_store::StoreError),

    /// A dispatch-pipeline error.
    #[error("dispatch error: {0}")]
    Dispatch(#[from] otpgw_dispatch::DispatchError),
}

/// Maps each variant to the HTTP status the spec assigns it (§7): bad
/// input is the caller's fault (400); everything else means the gateway
/// itself could not do its job (500). Fraud rejection is deliberately not
/// a variant here -- it is surfaced as an ordinary success (spec §4.J step
/// 4), never as an error.
impl IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            Self::Dispatch(
                otpgw_dispatch::DispatchError::InvalidPhone(_)
                | otpgw_dispatch::DispatchError::InvalidCode(_)
                | otpgw_dispatch::DispatchError::NoChannels,
            ) => StatusCode::BAD_REQUEST,
            Self::Dispatch(_) | Self::Store(_) | Self::Config(_) | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({
            "error": status.canonical_reason().unwrap_or("error"),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}
