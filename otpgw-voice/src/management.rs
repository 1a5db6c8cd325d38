//! Connects to the telephony platform's line-oriented management socket,
//! authenticates, subscribes to the "call" event mask, and correlates
//! asynchronous channel events back to tracked requests (spec §4.I).
//!
//! Records are delimited the way the platform's management protocol
//! actually frames them: `Key: Value\r\n` lines terminated by a blank line.
//! The read loop below mirrors the incremental line-buffering shape used
//! elsewhere in this workspace's client code for other line-oriented
//! streaming protocols.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use otpgw_core::{ChannelEventType, EventEmitter};
use otpgw_retry::RetryStrategy;

use crate::call_tracker::CallTracker;
use crate::cause::{classify_cause, CauseOutcome};
use crate::error::VoiceError;

const MAX_RECONNECT_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone)]
pub struct ManagementConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Overall budget for connect + authenticate, distinct from per-read
    /// timeouts on the established connection (spec §5).
    pub connect_timeout: Duration,
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8021,
            username: String::new(),
            password: String::new(),
            connect_timeout: Duration::from_secs(15),
        }
    }
}

/// One parsed `Key: Value` record block.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    fields: HashMap<String, String>,
}

impl Frame {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn event(&self) -> Option<&str> {
        self.get("Event")
    }
}

/// Parse a block of raw lines (already split on `\r\n`, blank-line
/// terminated, blank line excluded) into a [`Frame`].
#[must_use]
pub fn parse_frame(lines: &[String]) -> Frame {
    let mut fields = HashMap::new();
    for line in lines {
        if let Some((key, value)) = line.split_once(':') {
            fields.insert(key.trim().to_owned(), value.trim().to_owned());
        }
    }
    Frame { fields }
}

/// Read frames from `reader` until EOF, calling `on_frame` for each one.
/// Extracted from the connection-owning loop so the parsing logic is
/// testable against an in-memory buffer.
async fn read_frames<R, F, Fut>(mut reader: R, mut on_frame: F) -> Result<(), VoiceError>
where
    R: AsyncBufReadExt + Unpin,
    F: FnMut(Frame) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let mut current = Vec::new();
    loop {
        let mut line = String::new();
        let bytes = reader.read_line(&mut line).await.map_err(|e| VoiceError::Protocol(e.to_string()))?;
        if bytes == 0 {
            return Ok(());
        }
        let trimmed = line.trim_end_matches(['\r', '\n']).to_owned();
        if trimmed.is_empty() {
            if !current.is_empty() {
                let frame = parse_frame(&current);
                current.clear();
                on_frame(frame).await;
            }
            continue;
        }
        current.push(trimmed);
    }
}

/// Drives the management-socket connection: authenticate, subscribe, read
/// frames, correlate `Hangup` notifications to tracked calls via the Call
/// Tracker, and reconnect with backoff on disconnect.
pub struct TelephonyManagementListener {
    config: ManagementConfig,
    call_tracker: Arc<CallTracker>,
    emitter: Arc<dyn EventEmitter>,
    connected: AtomicBool,
}

impl TelephonyManagementListener {
    #[must_use]
    pub fn new(config: ManagementConfig, call_tracker: Arc<CallTracker>, emitter: Arc<dyn EventEmitter>) -> Self {
        Self { config, call_tracker, emitter, connected: AtomicBool::new(false) }
    }

    /// Whether the management socket is currently authenticated and
    /// reading events. Backs `GET /health`'s `asterisk` field (spec §6).
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Run the connect/auth/subscribe/read loop forever, reconnecting with
    /// backoff on disconnect. Gives up after [`MAX_RECONNECT_ATTEMPTS`],
    /// logging a "failure-detection disabled" warning: real-time call
    /// failure detection stops, but outbound dispatch keeps working (the
    /// primary Stasis control plane is unaffected).
    pub async fn run(&self) {
        let backoff = RetryStrategy::telephony_reconnect();
        let mut attempt: u32 = 0;

        loop {
            match self.connect_and_serve().await {
                Ok(()) => {
                    info!("telephony management connection closed cleanly");
                    self.connected.store(false, Ordering::Relaxed);
                    attempt = 0;
                }
                Err(err) => {
                    warn!(error = %err, attempt, "telephony management connection failed");
                    self.connected.store(false, Ordering::Relaxed);
                    attempt += 1;
                    if attempt >= MAX_RECONNECT_ATTEMPTS {
                        warn!("giving up on telephony management reconnection: failure-detection disabled");
                        return;
                    }
                    tokio::time::sleep(backoff.delay_for(attempt - 1)).await;
                    continue;
                }
            }
        }
    }

    async fn connect_and_serve(&self) -> Result<(), VoiceError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let stream = tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| VoiceError::Connect("connect timed out".to_owned()))?
            .map_err(|e| VoiceError::Connect(e.to_string()))?;

        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        tokio::time::timeout(self.config.connect_timeout, self.authenticate(&mut reader, &mut write_half))
            .await
            .map_err(|_| VoiceError::Connect("authentication timed out".to_owned()))??;

        self.subscribe(&mut write_half).await?;
        self.connected.store(true, Ordering::Relaxed);

        read_frames(reader, |frame| async move {
            self.handle_frame(&frame).await;
        })
        .await
    }

    async fn authenticate<R, W>(&self, reader: &mut R, writer: &mut W) -> Result<(), VoiceError>
    where
        R: AsyncBufReadExt + Unpin,
        W: AsyncWriteExt + Unpin,
    {
        let login = format!(
            "Action: Login\r\nUsername: {}\r\nSecret: {}\r\n\r\n",
            self.config.username, self.config.password
        );
        writer.write_all(login.as_bytes()).await.map_err(|e| VoiceError::Connect(e.to_string()))?;

        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            let bytes = reader.read_line(&mut line).await.map_err(|e| VoiceError::Connect(e.to_string()))?;
            if bytes == 0 {
                return Err(VoiceError::Connect("connection closed during authentication".to_owned()));
            }
            let trimmed = line.trim_end_matches(['\r', '\n']).to_owned();
            if trimmed.is_empty() {
                break;
            }
            lines.push(trimmed);
        }
        let frame = parse_frame(&lines);
        match frame.get("Response") {
            Some("Success") => Ok(()),
            other => Err(VoiceError::Protocol(format!("login failed: {other:?}"))),
        }
    }

    async fn subscribe<W>(&self, writer: &mut W) -> Result<(), VoiceError>
    where
        W: AsyncWriteExt + Unpin,
    {
        writer
            .write_all(b"Action: Events\r\nEventMask: call\r\n\r\n")
            .await
            .map_err(|e| VoiceError::Connect(e.to_string()))
    }

    async fn handle_frame(&self, frame: &Frame) {
        match frame.event() {
            Some("Newchannel" | "DialBegin") => self.handle_newchannel(frame),
            Some("Hangup") => self.handle_hangup(frame).await,
            Some(other) => debug!(event = other, "unhandled telephony management event"),
            None => {}
        }
    }

    fn handle_newchannel(&self, frame: &Frame) {
        let (Some(phone), Some(channel)) = (frame.get("CallerIDNum"), frame.get("Channel")) else {
            return;
        };
        self.call_tracker.register_side_channel(phone, channel.to_owned());
    }

    async fn handle_hangup(&self, frame: &Frame) {
        let request_id = frame
            .get("Channel")
            .and_then(|ch| self.call_tracker.find_request_by_channel(ch))
            .or_else(|| frame.get("ConnectedLineNum").and_then(|phone| self.call_tracker.find_request_by_phone(phone)));

        let Some(request_id) = request_id else {
            return;
        };
        let Some(call) = self.call_tracker.get(&request_id) else {
            // Already resolved via the primary Stasis control plane.
            return;
        };

        let cause: u16 = frame.get("Cause").and_then(|c| c.parse().ok()).unwrap_or(0);
        let ring_positive = call.answer_time.is_some();

        match classify_cause(cause, ring_positive) {
            CauseOutcome::NormalClearing => {}
            CauseOutcome::Failed { description, cause_code } => {
                let mut data = serde_json::Map::new();
                data.insert("error".to_owned(), serde_json::json!(description));
                if let Some(code) = cause_code {
                    data.insert("cause_code".to_owned(), serde_json::json!(code));
                }
                self.emitter.emit(&request_id, otpgw_core::Channel::Voice, ChannelEventType::Failed, data).await;
                let _ = self.call_tracker.end_call(&request_id, chrono::Utc::now());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_frame_splits_key_value_lines() {
        let lines = vec!["Event: Hangup".to_owned(), "Channel: PJSIP/15551234567-00000001".to_owned(), "Cause: 16".to_owned()];
        let frame = parse_frame(&lines);
        assert_eq!(frame.event(), Some("Hangup"));
        assert_eq!(frame.get("Cause"), Some("16"));
    }

    #[tokio::test]
    async fn read_frames_invokes_callback_once_per_blank_line_delimited_block() {
        let raw = "Event: Newchannel\r\nChannel: PJSIP/1-1\r\n\r\nEvent: Hangup\r\nCause: 16\r\n\r\n";
        let reader = tokio::io::BufReader::new(raw.as_bytes());
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        read_frames(reader, move |frame| {
            let seen = seen2.clone();
            async move {
                seen.lock().unwrap().push(frame.event().map(str::to_owned));
            }
        })
        .await
        .unwrap();
        let got = seen.lock().unwrap().clone();
        assert_eq!(got, vec![Some("Newchannel".to_owned()), Some("Hangup".to_owned())]);
    }

    #[tokio::test]
    async fn hangup_for_untracked_channel_is_ignored() {
        let tracker = Arc::new(CallTracker::new());
        struct NullEmitter;
        #[async_trait::async_trait]
        impl EventEmitter for NullEmitter {
            async fn emit(
                &self,
                _request_id: &otpgw_core::RequestId,
                _channel: otpgw_core::Channel,
                _event_type: ChannelEventType,
                _event_data: serde_json::Map<String, serde_json::Value>,
            ) {
            }
        }
        let listener = TelephonyManagementListener::new(ManagementConfig::default(), tracker, Arc::new(NullEmitter));
        let frame = parse_frame(&["Event: Hangup".to_owned(), "Channel: PJSIP/99999-1".to_owned(), "Cause: 16".to_owned()]);
        // Should not panic even though nothing is tracked.
        listener.handle_hangup(&frame).await;
    }
}
