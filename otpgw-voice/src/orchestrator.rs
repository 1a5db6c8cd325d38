//! Drives one call through the Voice Orchestrator's state machine (spec
//! §4.H) and exposes it as an [`otpgw_core::ChannelProvider`] so the
//! dispatch service can treat voice identically to SMS.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use otpgw_core::{
    ChannelDispatchError, ChannelEventType, ChannelProvider, DispatchOutcome, EventEmitter, Request,
};

use crate::call_tracker::CallTracker;
use crate::error::VoiceError;
use crate::telephony::TelephonyControl;

/// Template and timing knobs for TTS playback (spec §4.H step 4).
#[derive(Debug, Clone)]
pub struct VoiceOrchestratorConfig {
    /// `{code}` is substituted with the OTP, spelled out as space-separated
    /// digits so the TTS engine reads it back one digit at a time.
    pub message_template: String,
    /// Upper bound on how long TTS playback is allowed to run before the
    /// orchestrator falls back to spoken digits.
    pub tts_timeout: Duration,
    /// Pause between each spoken digit in the digit-by-digit fallback.
    pub inter_digit_pause: Duration,
    /// Brief pause after answering before starting playback.
    pub answer_pause: Duration,
}

impl Default for VoiceOrchestratorConfig {
    fn default() -> Self {
        Self {
            message_template: "Your verification code is {code}. Again, your code is {code}.".to_owned(),
            tts_timeout: Duration::from_secs(60),
            inter_digit_pause: Duration::from_millis(600),
            answer_pause: Duration::from_millis(400),
        }
    }
}

fn spaced_digits(code: &str) -> String {
    code.chars().filter(char::is_ascii_digit).map(|c| c.to_string()).collect::<Vec<_>>().join(" ")
}

fn render_template(template: &str, code: &str) -> String {
    template.replace("{code}", &spaced_digits(code))
}

/// Drives calls end-to-end: origination, TTS (with digit fallback), and the
/// system-initiated hangup on success. Mid-call user hangups and the
/// post-completion "Stasis End" case are handled by `on_hangup`, called from
/// the Telephony Management Listener or from the platform's own Stasis End
/// notification -- whichever arrives first wins, since `end_call` removes
/// the call from the tracker.
pub struct VoiceOrchestrator {
    config: VoiceOrchestratorConfig,
    call_tracker: Arc<CallTracker>,
    telephony: Arc<dyn TelephonyControl>,
    emitter: Arc<dyn EventEmitter>,
}

impl VoiceOrchestrator {
    #[must_use]
    pub fn new(
        config: VoiceOrchestratorConfig,
        call_tracker: Arc<CallTracker>,
        telephony: Arc<dyn TelephonyControl>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        Self { config, call_tracker, telephony, emitter }
    }

    #[must_use]
    pub fn call_tracker(&self) -> &Arc<CallTracker> {
        &self.call_tracker
    }

    async fn emit(&self, request: &Request, event_type: ChannelEventType, data: serde_json::Map<String, serde_json::Value>) {
        self.emitter.emit(&request.id, otpgw_core::Channel::Voice, event_type, data).await;
    }

    /// Play the OTP: TTS first, falling back to digit-by-digit on failure or
    /// timeout (spec §4.H step 4).
    async fn play_otp(&self, unique_id: &str, code: &str) -> Result<(), VoiceError> {
        let speech = render_template(&self.config.message_template, code);
        let tts_result = tokio::time::timeout(self.config.tts_timeout, self.telephony.play_tts(unique_id, &speech)).await;

        match tts_result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(VoiceError::ChannelGone)) => Err(VoiceError::ChannelGone),
            Ok(Err(err)) => {
                warn!(error = %err, "tts playback failed, falling back to spoken digits");
                self.telephony.play_digits(unique_id, code, self.config.inter_digit_pause).await
            }
            Err(_) => {
                warn!("tts playback timed out, falling back to spoken digits");
                self.telephony.play_digits(unique_id, code, self.config.inter_digit_pause).await
            }
        }
    }

    /// Called when a Telephony Management Listener "Hangup"/"Stasis End"
    /// notification is correlated to a still-tracked request: emits
    /// `voice:hangup` per spec §4.H steps 6-7 and removes the call from the
    /// tracker. No-op (returns `Ok(None)`) if the request is no longer
    /// tracked (already ended via the primary control plane).
    pub async fn on_hangup(&self, request_id: &otpgw_core::RequestId) -> Result<Option<()>, VoiceError> {
        let Some(call) = self.call_tracker.get(request_id) else {
            return Ok(None);
        };
        let now = chrono::Utc::now();
        self.call_tracker.end_call(request_id, now)?;

        let mut data = serde_json::Map::new();
        data.insert("hung_up_by".to_owned(), json!("user"));
        data.insert("otp_played".to_owned(), json!(call.otp_played));
        self.emitter.emit(request_id, otpgw_core::Channel::Voice, ChannelEventType::Hangup, data).await;
        Ok(Some(()))
    }
}

#[async_trait]
impl ChannelProvider for VoiceOrchestrator {
    fn name(&self) -> &'static str {
        "voice"
    }

    async fn dispatch(
        &self,
        request: &Request,
        code: &str,
        caller_id: Option<&str>,
    ) -> Result<DispatchOutcome, ChannelDispatchError> {
        let caller_id = caller_id.unwrap_or("anonymous");
        let now = chrono::Utc::now();

        // Step 1: register call state, emit voice:calling.
        let destination = self.call_tracker.register(request.id.clone(), request.phone.as_str(), code, caller_id, now);
        self.emit(request, ChannelEventType::Calling, serde_json::Map::new()).await;

        // Step 2: originate, emit voice:ringing.
        let unique_id = match self.telephony.originate_and_await_start(&request.id, &destination, caller_id).await {
            Ok(uid) => uid,
            Err(err) => {
                let _ = self.call_tracker.end_call(&request.id, chrono::Utc::now());
                return Err(ChannelDispatchError::Transport(err.to_string()));
            }
        };
        self.emit(request, ChannelEventType::Ringing, serde_json::Map::new()).await;
        if let Err(err) = self.call_tracker.bind_unique_id(&request.id, unique_id.clone()) {
            warn!(error = %err, "failed to bind unique id after successful origination");
        }

        // Step 3: Stasis Start arrived (folded into originate_and_await_start above).
        let ring_duration = self
            .call_tracker
            .mark_answered(&request.id, chrono::Utc::now())
            .map_err(|e| ChannelDispatchError::Transport(e.to_string()))?;
        info!(request_id = %request.id.as_str(), ring_ms = ring_duration.num_milliseconds(), "voice call answered");
        self.emit(request, ChannelEventType::Answered, serde_json::Map::new()).await;

        // Step 4: brief pause, emit voice:playing, play the OTP.
        tokio::time::sleep(self.config.answer_pause).await;
        self.emit(request, ChannelEventType::Playing, serde_json::Map::new()).await;

        match self.play_otp(&unique_id, code).await {
            Ok(()) => {
                // Step 5: success. System hangup.
                let _ = self.call_tracker.mark_otp_played(&request.id);
                let _ = self.call_tracker.mark_system_hangup(&request.id);
                let hangup_result = self.telephony.hangup(&unique_id).await;
                let _ = self.call_tracker.end_call(&request.id, chrono::Utc::now());

                if let Err(err) = hangup_result {
                    warn!(error = %err, "hangup after successful playback failed (channel likely already gone)");
                }
                let mut data = serde_json::Map::new();
                data.insert("hung_up_by".to_owned(), json!("system"));
                self.emit(request, ChannelEventType::Completed, data).await;
                Ok(DispatchOutcome { provider_id: Some(unique_id) })
            }
            Err(VoiceError::ChannelGone) => {
                // Step 6: channel disappeared mid-flight; treat as user hangup.
                let (call, _) = self
                    .call_tracker
                    .end_call(&request.id, chrono::Utc::now())
                    .map_err(|e| ChannelDispatchError::Transport(e.to_string()))?;
                let mut data = serde_json::Map::new();
                data.insert("hung_up_by".to_owned(), json!("user"));
                data.insert("otp_played".to_owned(), json!(call.otp_played));
                self.emit(request, ChannelEventType::Hangup, data).await;
                Ok(DispatchOutcome { provider_id: Some(unique_id) })
            }
            Err(err) => {
                let _ = self.call_tracker.end_call(&request.id, chrono::Utc::now());
                let mut data = serde_json::Map::new();
                data.insert("error".to_owned(), json!(err.to_string()));
                self.emit(request, ChannelEventType::Failed, data).await;
                Err(ChannelDispatchError::Transport(err.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otpgw_core::RequestId;
    use std::sync::Mutex;

    struct RecordingEmitter {
        events: Mutex<Vec<(otpgw_core::Channel, ChannelEventType)>>,
    }

    impl RecordingEmitter {
        fn new() -> Self {
            Self { events: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl EventEmitter for RecordingEmitter {
        async fn emit(
            &self,
            _request_id: &RequestId,
            channel: otpgw_core::Channel,
            event_type: ChannelEventType,
            _event_data: serde_json::Map<String, serde_json::Value>,
        ) {
            self.events.lock().unwrap().push((channel, event_type));
        }
    }

    struct ScriptedTelephony {
        fail_tts: bool,
        channel_gone: bool,
    }

    #[async_trait]
    impl TelephonyControl for ScriptedTelephony {
        async fn originate_and_await_start(
            &self,
            _request_id: &RequestId,
            _destination: &str,
            _caller_id: &str,
        ) -> Result<String, VoiceError> {
            Ok("unique-1".to_owned())
        }

        async fn play_tts(&self, _unique_id: &str, _text: &str) -> Result<(), VoiceError> {
            if self.channel_gone {
                return Err(VoiceError::ChannelGone);
            }
            if self.fail_tts {
                return Err(VoiceError::Control("tts engine unavailable".to_owned()));
            }
            Ok(())
        }

        async fn play_digits(&self, _unique_id: &str, _digits: &str, _pause: Duration) -> Result<(), VoiceError> {
            Ok(())
        }

        async fn hangup(&self, _unique_id: &str) -> Result<(), VoiceError> {
            Ok(())
        }
    }

    fn sample_request() -> Request {
        let now = chrono::Utc::now();
        Request {
            id: RequestId::generate(),
            phone: otpgw_core::Phone::new("+15551234567"),
            code_hash: otpgw_core::hash_code("123456"),
            status: otpgw_core::RequestStatus::Pending,
            channel_status: None,
            channel: None,
            auth_status: otpgw_core::AuthStatus::Unverified,
            channels_requested: vec![otpgw_core::Channel::Voice],
            ip_address: "203.0.113.1".to_owned(),
            ip_subnet: otpgw_core::derive_subnet("203.0.113.1"),
            asn: None,
            ip_country: None,
            phone_country: Some(otpgw_core::CountryCode::new("US")),
            phone_prefix: Some("1".to_owned()),
            fraud_score: 0,
            fraud_reasons: Vec::new(),
            shadow_banned: false,
            webhook_url: None,
            session_id: None,
            provider_id: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            expires_at: now + chrono::Duration::minutes(5),
            start_time: None,
            answer_time: None,
            end_time: None,
            sms_cost_units: 0,
            voice_cost_units: 0,
        }
    }

    #[tokio::test]
    async fn successful_call_emits_full_happy_path_and_ends_call() {
        let tracker = Arc::new(CallTracker::new());
        let telephony = Arc::new(ScriptedTelephony { fail_tts: false, channel_gone: false });
        let emitter = Arc::new(RecordingEmitter::new());
        let orchestrator =
            VoiceOrchestrator::new(VoiceOrchestratorConfig::default(), tracker.clone(), telephony, emitter.clone());

        let request = sample_request();
        let outcome = orchestrator.dispatch(&request, "123456", Some("+15550000000")).await.unwrap();
        assert_eq!(outcome.provider_id, Some("unique-1".to_owned()));
        assert!(tracker.get(&request.id).is_none());

        let events = emitter.events.lock().unwrap();
        let kinds: Vec<ChannelEventType> = events.iter().map(|(_, e)| *e).collect();
        assert_eq!(
            kinds,
            vec![
                ChannelEventType::Calling,
                ChannelEventType::Ringing,
                ChannelEventType::Answered,
                ChannelEventType::Playing,
                ChannelEventType::Completed,
            ]
        );
    }

    #[tokio::test]
    async fn tts_failure_falls_back_to_digits_and_still_completes() {
        let tracker = Arc::new(CallTracker::new());
        let telephony = Arc::new(ScriptedTelephony { fail_tts: true, channel_gone: false });
        let emitter = Arc::new(RecordingEmitter::new());
        let orchestrator =
            VoiceOrchestrator::new(VoiceOrchestratorConfig::default(), tracker, telephony, emitter.clone());

        let request = sample_request();
        let outcome = orchestrator.dispatch(&request, "123456", Some("+15550000000")).await.unwrap();
        assert!(outcome.provider_id.is_some());

        let events = emitter.events.lock().unwrap();
        assert!(events.iter().any(|(_, e)| *e == ChannelEventType::Completed));
    }

    #[tokio::test]
    async fn channel_gone_mid_playback_resolves_to_user_hangup() {
        let tracker = Arc::new(CallTracker::new());
        let telephony = Arc::new(ScriptedTelephony { fail_tts: false, channel_gone: true });
        let emitter = Arc::new(RecordingEmitter::new());
        let orchestrator =
            VoiceOrchestrator::new(VoiceOrchestratorConfig::default(), tracker, telephony, emitter.clone());

        let request = sample_request();
        orchestrator.dispatch(&request, "123456", Some("+15550000000")).await.unwrap();

        let events = emitter.events.lock().unwrap();
        let kinds: Vec<ChannelEventType> = events.iter().map(|(_, e)| *e).collect();
        assert_eq!(
            kinds,
            vec![
                ChannelEventType::Calling,
                ChannelEventType::Ringing,
                ChannelEventType::Answered,
                ChannelEventType::Playing,
                ChannelEventType::Hangup,
            ]
        );
    }
}
