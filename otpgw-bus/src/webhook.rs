//! POSTs a compact status payload to a request's `webhook_url` with retries
//! on a fixed schedule (spec §4.L). Failure after the last attempt is
//! logged, never surfaced -- nothing downstream of event persistence is
//! allowed to fail the request.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use otpgw_core::{Channel, RequestId};
use otpgw_retry::RetryStrategy;

use crate::metrics::BusMetrics;

const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub timeout: Duration,
    pub retry: RetryStrategy,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(5), retry: RetryStrategy::webhook_default() }
    }
}

/// One webhook delivery job.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub event: String,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub phone: String,
    pub status: String,
    pub channel: String,
    /// Epoch milliseconds (spec §6 outbound webhook payload).
    pub timestamp: i64,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

pub struct WebhookJob {
    pub url: String,
    pub payload: WebhookPayload,
}

/// Dispatches webhook jobs. Jobs are handed off to a background task via
/// [`Self::enqueue`] so the Event Bus's `emit` call never blocks on an
/// outbound HTTP request.
pub struct WebhookDispatcher {
    client: reqwest::Client,
    config: WebhookConfig,
    metrics: Arc<BusMetrics>,
}

impl WebhookDispatcher {
    #[must_use]
    pub fn new(config: WebhookConfig, metrics: Arc<BusMetrics>) -> Self {
        Self { client: reqwest::Client::new(), config, metrics }
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client, config: WebhookConfig, metrics: Arc<BusMetrics>) -> Self {
        Self { client, config, metrics }
    }

    /// Fire-and-forget: spawn a background task that attempts delivery up
    /// to [`MAX_ATTEMPTS`] times on the configured retry schedule.
    pub fn enqueue(self: &Arc<Self>, job: WebhookJob) {
        self.metrics.increment_webhooks_enqueued();
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.deliver_with_retries(job).await;
        });
    }

    async fn deliver_with_retries(&self, job: WebhookJob) {
        for attempt in 0..MAX_ATTEMPTS {
            match self.attempt(&job).await {
                Ok(status) => {
                    tracing::info!(url = %job.url, status, attempt, "webhook delivered");
                    self.metrics.increment_webhooks_delivered();
                    return;
                }
                Err(err) => {
                    warn!(url = %job.url, attempt, error = %err, "webhook delivery attempt failed");
                    if attempt + 1 < MAX_ATTEMPTS {
                        tokio::time::sleep(self.config.retry.delay_for(attempt)).await;
                    }
                }
            }
        }
        warn!(url = %job.url, request_id = %job.payload.request_id, "webhook delivery exhausted all retries, giving up");
        self.metrics.increment_webhooks_failed();
    }

    async fn attempt(&self, job: &WebhookJob) -> Result<u16, String> {
        let response = self
            .client
            .post(&job.url)
            .timeout(self.config.timeout)
            .header("User-Agent", concat!("OTP-Gateway/", env!("CARGO_PKG_VERSION")))
            .header("X-Webhook-Event", &job.payload.event)
            .header("X-Request-ID", &job.payload.request_id)
            .json(&job.payload)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status();
        if status.is_success() {
            Ok(status.as_u16())
        } else {
            Err(format!("non-2xx status {status}"))
        }
    }
}

#[must_use]
pub fn build_payload(
    event: &str,
    request_id: &RequestId,
    session_id: Option<&str>,
    phone: &str,
    status: &str,
    channel: Channel,
    metadata: serde_json::Map<String, serde_json::Value>,
) -> WebhookPayload {
    WebhookPayload {
        event: event.to_owned(),
        request_id: request_id.as_str().to_owned(),
        session_id: session_id.map(str::to_owned),
        phone: phone.to_owned(),
        status: status.to_owned(),
        channel: channel.as_str().to_owned(),
        timestamp: chrono::Utc::now().timestamp_millis(),
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_payload_omits_absent_session_id() {
        let payload = build_payload(
            "delivered",
            &RequestId::generate(),
            None,
            "+15551234567",
            "delivered",
            Channel::Sms,
            serde_json::Map::new(),
        );
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("session_id").is_none());
    }

    #[tokio::test]
    async fn successful_delivery_increments_delivered_metric() {
        let server = spawn_http_200_server().await;
        let dispatcher = Arc::new(WebhookDispatcher::new(WebhookConfig::default(), Arc::new(BusMetrics::default())));
        let job = WebhookJob {
            url: server.url.clone(),
            payload: build_payload(
                "delivered",
                &RequestId::generate(),
                None,
                "+15551234567",
                "delivered",
                Channel::Sms,
                serde_json::Map::new(),
            ),
        };
        dispatcher.deliver_with_retries(job).await;
        assert_eq!(dispatcher.metrics.snapshot().webhooks_delivered, 1);
        server.stop().await;
    }

    /// Minimal hand-rolled HTTP server returning 200 for any POST, grounded
    /// in the SMS provider's mock-server test pattern.
    struct MockServer {
        url: String,
        handle: tokio::task::JoinHandle<()>,
    }

    impl MockServer {
        async fn stop(self) {
            self.handle.abort();
        }
    }

    async fn spawn_http_200_server() -> MockServer {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else { return };
                tokio::spawn(async move {
                    use tokio::io::{AsyncReadExt, AsyncWriteExt};
                    let mut buf = [0u8; 4096];
                    let _ = stream.read(&mut buf).await;
                    let _ = stream
                        .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nContent-Type: application/json\r\n\r\n{}")
                        .await;
                });
            }
        });
        MockServer { url: format!("http://{addr}/"), handle }
    }
}
