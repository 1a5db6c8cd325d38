use serde::Deserialize;

/// Top-level configuration for the OTP gateway server, loaded from a TOML
/// file.
#[derive(Debug, Deserialize)]
pub struct GatewayConfig {
    /// HTTP server bind configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Relational store configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Fraud Engine tunables (spec §4.B).
    #[serde(default)]
    pub fraud: otpgw_fraud::FraudConfig,
    /// Outbound webhook dispatcher configuration.
    #[serde(default)]
    pub webhook: WebhookConfig,
    /// SMS provider configuration.
    #[serde(default)]
    pub sms: SmsConfig,
    /// Voice orchestrator configuration.
    #[serde(default)]
    pub voice: VoiceConfig,
    /// Telephony management-socket listener configuration.
    #[serde(default)]
    pub management: ManagementConfig,
    /// Telephony HTTP control-plane configuration.
    #[serde(default)]
    pub control_plane: ControlPlaneConfig,
    /// Dispatch-pipeline behavior.
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// `POST /webhooks/cdr` filtering (spec §6).
    #[serde(default)]
    pub cdr: CdrConfig,
}

/// HTTP server bind configuration.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Graceful shutdown timeout in seconds: the deadline for in-flight
    /// calls to finish and the webhook queue to drain (spec §5).
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_owned()
}

fn default_port() -> u16 {
    8080
}

fn default_shutdown_timeout() -> u64 {
    30
}

/// Configuration for the relational store backend (spec §4.A).
#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    /// `"memory"` or `"sqlite"`.
    #[serde(default = "default_store_backend")]
    pub backend: String,
    /// `sqlite` connection string, e.g. `sqlite://otpgw.db`. Ignored for
    /// the memory backend.
    pub url: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { backend: default_store_backend(), url: None }
    }
}

fn default_store_backend() -> String {
    "memory".to_owned()
}

/// Mirrors [`otpgw_bus::WebhookConfig`] in TOML-friendly form (plain
/// seconds rather than a [`std::time::Duration`]).
#[derive(Debug, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_webhook_timeout")]
    pub timeout_seconds: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self { timeout_seconds: default_webhook_timeout() }
    }
}

fn default_webhook_timeout() -> u64 {
    5
}

impl WebhookConfig {
    #[must_use]
    pub fn into_bus_config(self) -> otpgw_bus::WebhookConfig {
        otpgw_bus::WebhookConfig {
            timeout: std::time::Duration::from_secs(self.timeout_seconds),
            retry: otpgw_retry::RetryStrategy::webhook_default(),
        }
    }
}

/// Configuration for the outbound SMS HTTP endpoint (mirrors
/// [`otpgw_provider::SmsProviderConfig`]).
#[derive(Debug, Deserialize)]
pub struct SmsConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub basic_auth_user: String,
    #[serde(default)]
    pub basic_auth_password: String,
    #[serde(default = "default_sms_template")]
    pub message_template: String,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            basic_auth_user: String::new(),
            basic_auth_password: String::new(),
            message_template: default_sms_template(),
        }
    }
}

fn default_sms_template() -> String {
    "Your verification code is {code}.".to_owned()
}

impl SmsConfig {
    #[must_use]
    pub fn into_provider_config(self) -> otpgw_provider::SmsProviderConfig {
        otpgw_provider::SmsProviderConfig {
            endpoint: self.endpoint,
            basic_auth_user: self.basic_auth_user,
            basic_auth_password: self.basic_auth_password,
            message_template: self.message_template,
        }
    }
}

/// Mirrors [`otpgw_voice::VoiceOrchestratorConfig`] in TOML-friendly form.
#[derive(Debug, Deserialize)]
pub struct VoiceConfig {
    #[serde(default = "default_voice_template")]
    pub message_template: String,
    #[serde(default = "default_tts_timeout")]
    pub tts_timeout_seconds: u64,
    #[serde(default = "default_inter_digit_pause")]
    pub inter_digit_pause_ms: u64,
    #[serde(default = "default_answer_pause")]
    pub answer_pause_ms: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            message_template: default_voice_template(),
            tts_timeout_seconds: default_tts_timeout(),
            inter_digit_pause_ms: default_inter_digit_pause(),
            answer_pause_ms: default_answer_pause(),
        }
    }
}

fn default_voice_template() -> String {
    "Your verification code is {code}. Again, your code is {code}.".to_owned()
}

fn default_tts_timeout() -> u64 {
    60
}

fn default_inter_digit_pause() -> u64 {
    600
}

fn default_answer_pause() -> u64 {
    400
}

impl VoiceConfig {
    #[must_use]
    pub fn into_orchestrator_config(self) -> otpgw_voice::VoiceOrchestratorConfig {
        otpgw_voice::VoiceOrchestratorConfig {
            message_template: self.message_template,
            tts_timeout: std::time::Duration::from_secs(self.tts_timeout_seconds),
            inter_digit_pause: std::time::Duration::from_millis(self.inter_digit_pause_ms),
            answer_pause: std::time::Duration::from_millis(self.answer_pause_ms),
        }
    }
}

/// Mirrors [`otpgw_voice::ManagementConfig`] in TOML-friendly form.
#[derive(Debug, Deserialize)]
pub struct ManagementConfig {
    #[serde(default = "default_management_host")]
    pub host: String,
    #[serde(default = "default_management_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_management_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self {
            host: default_management_host(),
            port: default_management_port(),
            username: String::new(),
            password: String::new(),
            connect_timeout_seconds: default_management_connect_timeout(),
        }
    }
}

fn default_management_host() -> String {
    "127.0.0.1".to_owned()
}

fn default_management_port() -> u16 {
    8021
}

fn default_management_connect_timeout() -> u64 {
    15
}

impl ManagementConfig {
    #[must_use]
    pub fn into_voice_config(self) -> otpgw_voice::ManagementConfig {
        otpgw_voice::ManagementConfig {
            host: self.host,
            port: self.port,
            username: self.username,
            password: self.password,
            connect_timeout: std::time::Duration::from_secs(self.connect_timeout_seconds),
        }
    }
}

/// Mirrors [`otpgw_voice::ControlPlaneConfig`] in TOML-friendly form.
#[derive(Debug, Deserialize)]
pub struct ControlPlaneConfig {
    #[serde(default = "default_control_base_url")]
    pub base_url: String,
    #[serde(default = "default_control_app_name")]
    pub app_name: String,
    #[serde(default)]
    pub basic_auth_user: String,
    #[serde(default)]
    pub basic_auth_password: String,
    #[serde(default = "default_originate_timeout")]
    pub originate_timeout_seconds: u64,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            base_url: default_control_base_url(),
            app_name: default_control_app_name(),
            basic_auth_user: String::new(),
            basic_auth_password: String::new(),
            originate_timeout_seconds: default_originate_timeout(),
        }
    }
}

fn default_control_base_url() -> String {
    "http://127.0.0.1:8088/ari".to_owned()
}

fn default_control_app_name() -> String {
    "otpgw".to_owned()
}

fn default_originate_timeout() -> u64 {
    15
}

impl ControlPlaneConfig {
    #[must_use]
    pub fn into_voice_config(self) -> otpgw_voice::ControlPlaneConfig {
        otpgw_voice::ControlPlaneConfig {
            base_url: self.base_url,
            app_name: self.app_name,
            basic_auth_user: self.basic_auth_user,
            basic_auth_password: self.basic_auth_password,
            originate_timeout: std::time::Duration::from_secs(self.originate_timeout_seconds),
        }
    }
}

/// Behavior knobs for the Dispatch Service itself.
#[derive(Debug, Deserialize)]
pub struct DispatchConfig {
    /// Whether a failed channel falls through to the next requested one
    /// (spec §4.J step 5).
    #[serde(default = "default_failover_enabled")]
    pub failover_enabled: bool,
    /// Whether the voice channel is wired up at all. Disabling it skips
    /// starting the management listener and control-plane poller, useful
    /// when no telephony backend is reachable.
    #[serde(default = "default_voice_enabled")]
    pub voice_enabled: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { failover_enabled: default_failover_enabled(), voice_enabled: default_voice_enabled() }
    }
}

fn default_failover_enabled() -> bool {
    true
}

fn default_voice_enabled() -> bool {
    true
}

/// Call-detail records arrive from every trunk the telephony platform
/// carries traffic on; only the one this gateway originated calls through
/// is relevant.
#[derive(Debug, Deserialize, Default)]
pub struct CdrConfig {
    /// UUID identifying this gateway's trunk, matched against each
    /// record's `trunk_name` (favoring an embedded UUID over an exact
    /// string match). `None` accepts every record.
    #[serde(default)]
    pub target_trunk_id: Option<String>,
}
