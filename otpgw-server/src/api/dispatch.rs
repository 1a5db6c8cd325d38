use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use otpgw_dispatch::DispatchInput;

use crate::error::ServerError;

use super::schemas::DispatchRequest;
use super::AppState;

/// `POST /dispatch` (spec §6). Always HTTP-200 on a well-formed request,
/// whether or not the Fraud Engine silently shadow-banned it (spec §4.J
/// step 4's anti-oracle requirement) -- the response body is identical
/// either way.
pub async fn dispatch(State(state): State<AppState>, Json(body): Json<DispatchRequest>) -> Result<impl IntoResponse, ServerError> {
    let input = DispatchInput {
        phone: body.phone,
        code: body.code,
        session_id: body.session_id,
        channels: body.channels,
        webhook_url: body.webhook_url,
        ip: body.ip.unwrap_or_default(),
    };

    let output = state.gateway.dispatch.dispatch(input).await?;
    Ok((StatusCode::OK, Json(output)))
}
