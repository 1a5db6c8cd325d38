use thiserror::Error;

/// Errors raised by the core domain layer (parsing, validation, state machine).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    #[error("unknown channel event type: {0}")]
    UnknownEventType(String),

    #[error("invalid phone number: {0}")]
    InvalidPhone(String),

    #[error("invalid auth transition: {from:?} -> {to:?}")]
    InvalidAuthTransition { from: String, to: String },

    #[error("event type {event} does not apply to channel {channel}")]
    EventChannelMismatch { channel: String, event: String },
}
