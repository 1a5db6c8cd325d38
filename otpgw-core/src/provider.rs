//! The common contract channel providers implement (spec §4.D): SMS and
//! voice are dispatched the same way from the caller's perspective even
//! though voice delegates to an orchestrator under the hood.

use async_trait::async_trait;
use thiserror::Error;

use crate::request::Request;

#[derive(Debug, Error)]
pub enum ChannelDispatchError {
    #[error("provider transport error: {0}")]
    Transport(String),

    #[error("provider rejected the request: {0}")]
    Rejected(String),

    #[error("provider timed out")]
    Timeout,
}

/// What a successful `dispatch` call hands back to the caller immediately.
/// Everything past this point (delivery reports, call progress) arrives
/// later as events through [`crate::EventEmitter`].
#[derive(Debug, Clone, Default)]
pub struct DispatchOutcome {
    pub provider_id: Option<String>,
}

/// `dispatch(request, caller_id) -> result` (spec §4.D). Implemented by the
/// SMS provider (synchronous HTTP POST) and the voice provider (delegates to
/// the orchestrator).
///
/// `code` is the plaintext OTP, passed alongside `request` since
/// [`Request`] only ever carries `code_hash`.
#[async_trait]
pub trait ChannelProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn dispatch(
        &self,
        request: &Request,
        code: &str,
        caller_id: Option<&str>,
    ) -> Result<DispatchOutcome, ChannelDispatchError>;
}
