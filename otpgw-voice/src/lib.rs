//! Call tracking, voice call orchestration, and the telephony management
//! listener (spec §4.G, §4.H, §4.I).
//!
//! [`orchestrator::VoiceOrchestrator`] implements
//! [`otpgw_core::ChannelProvider`] so the dispatch service dispatches to
//! voice the same way it dispatches to SMS; the telephony-specific pieces
//! (call tracking, a management-socket listener) live alongside it.

pub mod call_tracker;
pub mod cause;
pub mod error;
pub mod http_control;
pub mod management;
pub mod orchestrator;
pub mod telephony;

pub use call_tracker::CallTracker;
pub use cause::{classify_cause, CauseOutcome};
pub use error::VoiceError;
pub use http_control::{ControlPlaneConfig, HttpTelephonyControl};
pub use management::{ManagementConfig, TelephonyManagementListener};
pub use orchestrator::{VoiceOrchestrator, VoiceOrchestratorConfig};
pub use telephony::TelephonyControl;
