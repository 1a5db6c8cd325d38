use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request did not contain a {0}")]
    MissingField(&'static str),

    #[error("http transport error: {0}")]
    Transport(String),

    #[error("provider responded with a non-success status: {0}")]
    NonSuccessStatus(u16),

    #[error("provider response could not be parsed: {0}")]
    Serialization(String),
}

impl From<ProviderError> for otpgw_core::ChannelDispatchError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Transport(msg) => Self::Transport(msg),
            other => Self::Rejected(other.to_string()),
        }
    }
}
