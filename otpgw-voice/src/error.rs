use thiserror::Error;

/// Errors raised by the voice stack: call tracking, orchestration, and the
/// telephony management listener.
#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("no call tracked for request {0}")]
    UnknownRequest(String),

    #[error("no call tracked for channel {0}")]
    UnknownChannel(String),

    #[error("no call tracked for phone {0}")]
    UnknownPhone(String),

    #[error("telephony control error: {0}")]
    Control(String),

    #[error("TTS playback timed out")]
    PlaybackTimeout,

    #[error("channel no longer exists mid-call (caller hung up)")]
    ChannelGone,

    #[error("telephony management connection failed: {0}")]
    Connect(String),

    #[error("telephony management protocol error: {0}")]
    Protocol(String),
}
