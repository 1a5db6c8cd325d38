//! The call-control seam the Voice Orchestrator drives (spec §4.H). No real
//! call-control API is reachable from this workspace; production wires a
//! real implementation behind this trait the same way `otpgw-fraud` wires a
//! real `AsnResolver`/`GeoIpResolver` behind a null object in tests.

use std::time::Duration;

use async_trait::async_trait;

use otpgw_core::RequestId;

use crate::error::VoiceError;

/// Drives one call on the telephony platform. Implementations own the
/// control-connection plumbing (originate requests, Stasis event
/// subscriptions, playback commands); the orchestrator only ever sees this
/// trait.
///
/// `originate_and_await_start` intentionally folds origination and waiting
/// for the platform's "Stasis Start" notification into one call: the two
/// are inseparable from the orchestrator's point of view since nothing
/// useful can happen between them.
#[async_trait]
pub trait TelephonyControl: Send + Sync {
    /// Originate a call to `destination` with the given caller id and block
    /// until the platform signals the channel entered the app, or
    /// origination fails outright. Returns the platform's opaque unique id
    /// on success.
    async fn originate_and_await_start(
        &self,
        request_id: &RequestId,
        destination: &str,
        caller_id: &str,
    ) -> Result<String, VoiceError>;

    /// Synthesize and play `text` on the given channel, waiting for
    /// "Playback Finished". Implementations enforce their own timeout;
    /// the orchestrator additionally bounds the call with `tts_timeout`.
    async fn play_tts(&self, unique_id: &str, text: &str) -> Result<(), VoiceError>;

    /// Fallback when TTS synthesis fails: speak `digits` one at a time with
    /// `inter_digit_pause` between each.
    async fn play_digits(&self, unique_id: &str, digits: &str, inter_digit_pause: Duration) -> Result<(), VoiceError>;

    /// Hang up the channel. Returns [`VoiceError::ChannelGone`] if the
    /// channel had already disappeared (the caller hung up first).
    async fn hangup(&self, unique_id: &str) -> Result<(), VoiceError>;
}
