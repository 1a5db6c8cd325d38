//! The SMS provider (spec §4.D): a synchronous HTTP POST to an outbound
//! messaging endpoint, wrapped by the `queued`/`sending`/`sent` event
//! triplet the spec requires around the call.

use std::sync::Arc;

use async_trait::async_trait;
use otpgw_core::{ChannelDispatchError, ChannelProvider, DispatchOutcome, EventEmitter};
use otpgw_core::{Channel, ChannelEventType, Request};
use reqwest::Client;
use serde::Deserialize;

use crate::error::ProviderError;

/// Configuration for the outbound SMS HTTP endpoint.
#[derive(Debug, Clone)]
pub struct SmsProviderConfig {
    pub endpoint: String,
    pub basic_auth_user: String,
    pub basic_auth_password: String,
    /// Message body template; `{code}` is replaced with the plaintext OTP.
    pub message_template: String,
}

impl SmsProviderConfig {
    fn render(&self, code: &str) -> String {
        self.message_template.replace("{code}", code)
    }
}

#[derive(Debug, Deserialize)]
struct SmsApiResponse {
    #[serde(alias = "message_id", alias = "id")]
    provider_id: Option<String>,
}

pub struct SmsProvider {
    config: SmsProviderConfig,
    client: Client,
    emitter: Arc<dyn EventEmitter>,
}

impl SmsProvider {
    #[must_use]
    pub fn new(config: SmsProviderConfig, emitter: Arc<dyn EventEmitter>) -> Self {
        Self {
            config,
            client: Client::new(),
            emitter,
        }
    }

    #[must_use]
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    async fn post_message(&self, to: &str, body: &str) -> Result<SmsApiResponse, ProviderError> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .basic_auth(&self.config.basic_auth_user, Some(&self.config.basic_auth_password))
            .json(&serde_json::json!({ "to": to, "body": body }))
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::NonSuccessStatus(status.as_u16()));
        }

        response
            .json::<SmsApiResponse>()
            .await
            .map_err(|e| ProviderError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl ChannelProvider for SmsProvider {
    fn name(&self) -> &'static str {
        "sms"
    }

    async fn dispatch(&self, request: &Request, code: &str, _caller_id: Option<&str>) -> Result<DispatchOutcome, ChannelDispatchError> {
        let to = request.phone.as_str();
        let body = self.config.render(code);

        self.emitter
            .emit(&request.id, Channel::Sms, ChannelEventType::Queued, otpgw_core::EventData::new())
            .await;
        self.emitter
            .emit(&request.id, Channel::Sms, ChannelEventType::Sending, otpgw_core::EventData::new())
            .await;

        match self.post_message(to, &body).await {
            Ok(api_response) => {
                let mut data = otpgw_core::EventData::new();
                if let Some(ref provider_id) = api_response.provider_id {
                    data.insert("provider_id".to_owned(), serde_json::Value::String(provider_id.clone()));
                }
                self.emitter.emit(&request.id, Channel::Sms, ChannelEventType::Sent, data).await;
                Ok(DispatchOutcome {
                    provider_id: api_response.provider_id,
                })
            }
            Err(err) => {
                let mut data = otpgw_core::EventData::new();
                data.insert("error".to_owned(), serde_json::Value::String(err.to_string()));
                self.emitter.emit(&request.id, Channel::Sms, ChannelEventType::Failed, data).await;
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otpgw_core::{AuthStatus, Phone, RequestId, RequestStatus};
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[derive(Default)]
    struct RecordingEmitter {
        events: Mutex<Vec<ChannelEventType>>,
    }

    #[async_trait]
    impl EventEmitter for RecordingEmitter {
        async fn emit(&self, _request_id: &RequestId, _channel: Channel, event_type: ChannelEventType, _event_data: otpgw_core::EventData) {
            self.events.lock().unwrap().push(event_type);
        }
    }

    fn sample_request() -> Request {
        let now = chrono::Utc::now();
        Request {
            id: RequestId::generate(),
            phone: Phone::new("+15559876543"),
            code_hash: otpgw_core::hash_code("483920"),
            status: RequestStatus::Pending,
            channel_status: None,
            channel: None,
            auth_status: AuthStatus::Unverified,
            channels_requested: vec![Channel::Sms],
            ip_address: "203.0.113.5".to_owned(),
            ip_subnet: otpgw_core::derive_subnet("203.0.113.5"),
            asn: None,
            ip_country: None,
            phone_country: None,
            phone_prefix: None,
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

    #[tokio::test]
    async fn successful_dispatch_emits_queued_sending_sent_and_returns_provider_id() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(respond_once(listener, 200, r#"{"message_id":"sms-abc-123"}"#));

        let config = SmsProviderConfig {
            endpoint: format!("http://127.0.0.1:{port}/send"),
            basic_auth_user: "user".to_owned(),
            basic_auth_password: "pass".to_owned(),
            message_template: "Your code is {code}".to_owned(),
        };
        let emitter = Arc::new(RecordingEmitter::default());
        let provider = SmsProvider::new(config, emitter.clone());

        let outcome = provider.dispatch(&sample_request(), "483920", None).await.unwrap();
        server.await.unwrap();

        assert_eq!(outcome.provider_id.as_deref(), Some("sms-abc-123"));
        let events = emitter.events.lock().unwrap().clone();
        assert_eq!(events, vec![ChannelEventType::Queued, ChannelEventType::Sending, ChannelEventType::Sent]);
    }

    #[tokio::test]
    async fn non_success_status_emits_failed_and_errors() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(respond_once(listener, 500, r#"{"error":"boom"}"#));

        let config = SmsProviderConfig {
            endpoint: format!("http://127.0.0.1:{port}/send"),
            basic_auth_user: "user".to_owned(),
            basic_auth_password: "pass".to_owned(),
            message_template: "Your code is {code}".to_owned(),
        };
        let emitter = Arc::new(RecordingEmitter::default());
        let provider = SmsProvider::new(config, emitter.clone());

        let result = provider.dispatch(&sample_request(), "483920", None).await;
        server.await.unwrap();

        assert!(result.is_err());
        let events = emitter.events.lock().unwrap().clone();
        assert_eq!(events, vec![ChannelEventType::Queued, ChannelEventType::Sending, ChannelEventType::Failed]);
    }
}
