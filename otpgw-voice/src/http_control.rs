//! The production [`TelephonyControl`] implementation (spec §4.H step 2,
//! §5): an HTTP control API for originate/play/hangup commands, paired with
//! a background long-poll reader that correlates the platform's
//! asynchronous "Stasis Start" and "Playback Finished" notifications back
//! to the call that is waiting on them.
//!
//! The request/response shape mirrors `otpgw-provider`'s SMS client
//! (basic-auth'd JSON over `reqwest`); the reconnect loop mirrors the
//! telephony management listener's own connect/backoff/retry shape, just
//! against an HTTP long-poll endpoint instead of a raw socket.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::oneshot;
use tracing::{info, warn};

use otpgw_core::RequestId;
use otpgw_retry::RetryStrategy;

use crate::error::VoiceError;
use crate::orchestrator::VoiceOrchestrator;
use crate::telephony::TelephonyControl;

/// Configuration for the telephony control plane's HTTP endpoint.
#[derive(Debug, Clone)]
pub struct ControlPlaneConfig {
    /// Base URL of the control API, e.g. `http://127.0.0.1:8088/ari`.
    pub base_url: String,
    /// Name the Stasis application registers under; threaded through as
    /// `appArgs`/query params so the platform routes events back to us.
    pub app_name: String,
    pub basic_auth_user: String,
    pub basic_auth_password: String,
    /// Budget for origination to resolve to a Stasis Start notification.
    pub originate_timeout: Duration,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8088/ari".to_owned(),
            app_name: "otpgw".to_owned(),
            basic_auth_user: String::new(),
            basic_auth_password: String::new(),
            originate_timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ControlEvent {
    StasisStart { channel: ChannelRef, args: Vec<String> },
    StasisEnd { channel: ChannelRef },
    PlaybackFinished { playback: PlaybackRef },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ChannelRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PlaybackRef {
    /// `channel:<id>` for the common case of a playback targeting a single
    /// channel, per the platform's own playback-target addressing.
    target_uri: String,
}

type OriginateWaiters = Mutex<HashMap<String, oneshot::Sender<Result<String, VoiceError>>>>;
type PlaybackWaiters = Mutex<HashMap<String, oneshot::Sender<Result<(), VoiceError>>>>;

/// Drives calls over the telephony platform's HTTP control API and
/// correlates its asynchronous event stream back to pending requests.
pub struct HttpTelephonyControl {
    config: ControlPlaneConfig,
    client: Client,
    pending_originate: OriginateWaiters,
    pending_playback: PlaybackWaiters,
    connected: AtomicBool,
}

impl HttpTelephonyControl {
    #[must_use]
    pub fn new(config: ControlPlaneConfig) -> Self {
        Self {
            config,
            client: Client::new(),
            pending_originate: Mutex::new(HashMap::new()),
            pending_playback: Mutex::new(HashMap::new()),
            connected: AtomicBool::new(false),
        }
    }

    /// Whether the long-poll event stream is currently established. Backs
    /// `GET /health`'s `asterisk` field (spec §6).
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    fn auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.basic_auth(&self.config.basic_auth_user, Some(&self.config.basic_auth_password))
    }

    /// Run the long-poll event loop forever, reconnecting with backoff on
    /// disconnect (spec §4.H: "reconnect with backoff, initial 1s, x2, cap
    /// 30s"). Correlated events feed both this struct's own waiter maps
    /// (origination, playback) and, for mid-call hangups the control plane
    /// didn't initiate itself, the orchestrator's `on_hangup`.
    pub async fn run(self: Arc<Self>, orchestrator: Arc<VoiceOrchestrator>) {
        let backoff = RetryStrategy::control_plane_reconnect();
        let mut attempt: u32 = 0;

        loop {
            match self.poll_events_once(&orchestrator).await {
                Ok(()) => {
                    info!("telephony control-plane event stream closed cleanly");
                    self.connected.store(false, Ordering::Relaxed);
                    attempt = 0;
                }
                Err(err) => {
                    warn!(error = %err, attempt, "telephony control-plane event stream disconnected");
                    self.connected.store(false, Ordering::Relaxed);
                    attempt += 1;
                }
            }
            tokio::time::sleep(backoff.delay_for(attempt.saturating_sub(1))).await;
        }
    }

    async fn poll_events_once(&self, orchestrator: &Arc<VoiceOrchestrator>) -> Result<(), VoiceError> {
        let url = format!("{}/events?app={}", self.config.base_url, self.config.app_name);
        let response = self
            .auth(self.client.get(&url))
            .send()
            .await
            .map_err(|e| VoiceError::Connect(e.to_string()))?;

        if !response.status().is_success() {
            return Err(VoiceError::Connect(format!("event poll rejected: {}", response.status())));
        }
        self.connected.store(true, Ordering::Relaxed);

        let body = response.text().await.map_err(|e| VoiceError::Protocol(e.to_string()))?;
        for line in body.lines().filter(|l| !l.trim().is_empty()) {
            let event: ControlEvent = match serde_json::from_str(line) {
                Ok(event) => event,
                Err(err) => {
                    warn!(error = %err, "discarding unparsable control-plane event");
                    continue;
                }
            };
            self.dispatch_event(event, orchestrator).await;
        }
        Ok(())
    }

    async fn dispatch_event(&self, event: ControlEvent, orchestrator: &Arc<VoiceOrchestrator>) {
        match event {
            ControlEvent::StasisStart { channel, args } => {
                let Some(request_id) = args.first() else {
                    return;
                };
                if let Some(tx) = self.pending_originate.lock().remove(request_id) {
                    let _ = tx.send(Ok(channel.id));
                }
            }
            ControlEvent::PlaybackFinished { playback } => {
                let Some(unique_id) = playback.target_uri.strip_prefix("channel:") else {
                    return;
                };
                if let Some(tx) = self.pending_playback.lock().remove(unique_id) {
                    let _ = tx.send(Ok(()));
                }
            }
            ControlEvent::StasisEnd { channel } => {
                // A waiting playback should resolve immediately rather than
                // ride out its full timeout once the channel is gone.
                if let Some(tx) = self.pending_playback.lock().remove(&channel.id) {
                    let _ = tx.send(Err(VoiceError::ChannelGone));
                }
                if let Some(request_id) = orchestrator.call_tracker().find_request_by_channel(&channel.id) {
                    let _ = orchestrator.on_hangup(&request_id).await;
                }
            }
            ControlEvent::Other => {}
        }
    }
}

#[async_trait]
impl TelephonyControl for HttpTelephonyControl {
    async fn originate_and_await_start(
        &self,
        request_id: &RequestId,
        destination: &str,
        caller_id: &str,
    ) -> Result<String, VoiceError> {
        let (tx, rx) = oneshot::channel();
        self.pending_originate.lock().insert(request_id.as_str().to_owned(), tx);

        let url = format!("{}/channels", self.config.base_url);
        let send_result = self
            .auth(self.client.post(&url))
            .json(&serde_json::json!({
                "endpoint": format!("PJSIP/{destination}"),
                "app": self.config.app_name,
                "appArgs": request_id.as_str(),
                "callerId": caller_id,
            }))
            .send()
            .await;

        match send_result {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                self.pending_originate.lock().remove(request_id.as_str());
                return Err(VoiceError::Control(format!("originate rejected: {}", response.status())));
            }
            Err(err) => {
                self.pending_originate.lock().remove(request_id.as_str());
                return Err(VoiceError::Connect(err.to_string()));
            }
        }

        match tokio::time::timeout(self.config.originate_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_canceled)) => Err(VoiceError::ChannelGone),
            Err(_elapsed) => {
                self.pending_originate.lock().remove(request_id.as_str());
                Err(VoiceError::Control("timed out waiting for the platform to answer origination".to_owned()))
            }
        }
    }

    async fn play_tts(&self, unique_id: &str, text: &str) -> Result<(), VoiceError> {
        self.play_media(unique_id, &format!("tts:{text}")).await
    }

    async fn play_digits(&self, unique_id: &str, digits: &str, inter_digit_pause: Duration) -> Result<(), VoiceError> {
        let url = format!("{}/channels/{unique_id}/play", self.config.base_url);
        self.request_playback(unique_id, &url, &format!("digits:{digits}"), Some(inter_digit_pause))
            .await
    }

    async fn hangup(&self, unique_id: &str) -> Result<(), VoiceError> {
        let url = format!("{}/channels/{unique_id}", self.config.base_url);
        let response = self
            .auth(self.client.delete(&url))
            .send()
            .await
            .map_err(|e| VoiceError::Connect(e.to_string()))?;

        if response.status().is_success() || response.status() == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(VoiceError::Control(format!("hangup rejected: {}", response.status())))
        }
    }
}

impl HttpTelephonyControl {
    async fn play_media(&self, unique_id: &str, media: &str) -> Result<(), VoiceError> {
        let url = format!("{}/channels/{unique_id}/play", self.config.base_url);
        self.request_playback(unique_id, &url, media, None).await
    }

    /// POST a playback command and wait for its correlated "Playback
    /// Finished" event. A second playback on the same channel simply
    /// replaces the first waiter -- the orchestrator never plays two
    /// things concurrently on one call, so there is never a live receiver
    /// to orphan.
    async fn request_playback(
        &self,
        unique_id: &str,
        url: &str,
        media: &str,
        inter_digit_pause: Option<Duration>,
    ) -> Result<(), VoiceError> {
        let (tx, rx) = oneshot::channel();
        self.pending_playback.lock().insert(unique_id.to_owned(), tx);

        let mut body = serde_json::json!({ "media": media });
        if let Some(pause) = inter_digit_pause {
            body["interDigitMs"] = serde_json::json!(pause.as_millis());
        }

        let send_result = self.auth(self.client.post(url)).json(&body).send().await;

        match send_result {
            Ok(response) if response.status().is_success() => {}
            Ok(response) if response.status() == reqwest::StatusCode::NOT_FOUND => {
                self.pending_playback.lock().remove(unique_id);
                return Err(VoiceError::ChannelGone);
            }
            Ok(response) => {
                self.pending_playback.lock().remove(unique_id);
                return Err(VoiceError::Control(format!("playback rejected: {}", response.status())));
            }
            Err(err) => {
                self.pending_playback.lock().remove(unique_id);
                return Err(VoiceError::Connect(err.to_string()));
            }
        }

        rx.await.unwrap_or(Err(VoiceError::ChannelGone))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otpgw_core::{Channel, EventData};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    struct UnusedTelephony;

    #[async_trait]
    impl TelephonyControl for UnusedTelephony {
        async fn originate_and_await_start(&self, _: &RequestId, _: &str, _: &str) -> Result<String, VoiceError> {
            unimplemented!("not exercised by these tests")
        }
        async fn play_tts(&self, _: &str, _: &str) -> Result<(), VoiceError> {
            unimplemented!("not exercised by these tests")
        }
        async fn play_digits(&self, _: &str, _: &str, _: Duration) -> Result<(), VoiceError> {
            unimplemented!("not exercised by these tests")
        }
        async fn hangup(&self, _: &str) -> Result<(), VoiceError> {
            unimplemented!("not exercised by these tests")
        }
    }

    struct DiscardingEmitter;

    #[async_trait]
    impl otpgw_core::EventEmitter for DiscardingEmitter {
        async fn emit(&self, _: &RequestId, _: Channel, _: otpgw_core::ChannelEventType, _: EventData) {}
    }

    fn dummy_orchestrator() -> Arc<VoiceOrchestrator> {
        Arc::new(VoiceOrchestrator::new(
            crate::orchestrator::VoiceOrchestratorConfig::default(),
            Arc::new(crate::call_tracker::CallTracker::new()),
            Arc::new(UnusedTelephony),
            Arc::new(DiscardingEmitter),
        ))
    }

    async fn respond_once(listener: TcpListener, status_code: u16, body: &str) {
        let body = body.to_owned();
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 8192];
        let _ = stream.read(&mut buf).await.unwrap();
        let response = format!(
            "HTTP/1.1 {status_code} OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.unwrap();
    }

    fn config_for(port: u16) -> ControlPlaneConfig {
        ControlPlaneConfig {
            base_url: format!("http://127.0.0.1:{port}/ari"),
            app_name: "otpgw".to_owned(),
            basic_auth_user: "user".to_owned(),
            basic_auth_password: "pass".to_owned(),
            originate_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn originate_resolves_once_stasis_start_event_arrives() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(respond_once(listener, 200, "{}"));

        let control = Arc::new(HttpTelephonyControl::new(config_for(port)));
        let request_id = RequestId::new("req-1");

        let control_clone = control.clone();
        let request_id_clone = request_id.clone();
        let originate = tokio::spawn(async move {
            control_clone
                .originate_and_await_start(&request_id_clone, "+15551234567", "+15550000000")
                .await
        });

        server.await.unwrap();
        // Give the POST a moment to register the waiter before the
        // simulated Stasis Start event arrives.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let event = ControlEvent::StasisStart {
            channel: ChannelRef { id: "chan-1".to_owned() },
            args: vec!["req-1".to_owned()],
        };
        // `dispatch_event` takes an `Arc<VoiceOrchestrator>` only to reach
        // hangup correlation on StasisEnd; StasisStart never touches it.
        let orchestrator = dummy_orchestrator();
        control.dispatch_event(event, &orchestrator).await;

        let unique_id = originate.await.unwrap().unwrap();
        assert_eq!(unique_id, "chan-1");
    }

    #[tokio::test]
    async fn originate_times_out_when_no_stasis_start_arrives() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(respond_once(listener, 200, "{}"));

        let mut config = config_for(port);
        config.originate_timeout = Duration::from_millis(50);
        let control = HttpTelephonyControl::new(config);
        let request_id = RequestId::new("req-2");

        let result = control.originate_and_await_start(&request_id, "+15551234567", "+15550000000").await;
        server.await.unwrap();

        assert!(matches!(result, Err(VoiceError::Control(_))));
        assert!(control.pending_originate.lock().is_empty());
    }

    #[tokio::test]
    async fn originate_rejected_outright_returns_control_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(respond_once(listener, 400, r#"{"error":"bad endpoint"}"#));

        let control = HttpTelephonyControl::new(config_for(port));
        let request_id = RequestId::new("req-3");

        let result = control.originate_and_await_start(&request_id, "bogus", "+15550000000").await;
        server.await.unwrap();

        assert!(matches!(result, Err(VoiceError::Control(_))));
        assert!(control.pending_originate.lock().is_empty());
    }

    #[tokio::test]
    async fn hangup_tolerates_already_gone_channel() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(respond_once(listener, 404, r#"{"error":"not found"}"#));

        let control = HttpTelephonyControl::new(config_for(port));
        let result = control.hangup("chan-gone").await;
        server.await.unwrap();

        assert!(result.is_ok());
    }
}
