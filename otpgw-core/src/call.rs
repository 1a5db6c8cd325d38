//! Ephemeral per-call state owned exclusively by the Call Tracker
//! (spec §3, §4.G). Never persisted; removed on terminal event.

use serde::{Deserialize, Serialize};

use crate::types::RequestId;

/// The telephony-platform channel naming convention the Call Tracker
/// derives from a phone number, e.g. `PJSIP/15551234567`.
#[must_use]
pub fn channel_pattern(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    format!("PJSIP/{digits}")
}

/// One call in flight. Owned by `otpgw-voice::CallTracker`; mutated only by
/// the Voice Orchestrator and the Telephony Management Listener (spec §5
/// shared-resource policy).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallState {
    pub request_id: RequestId,
    pub phone: String,
    pub code: String,
    pub caller_id: String,
    pub otp_played: bool,
    pub system_hangup: bool,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub answer_time: Option<chrono::DateTime<chrono::Utc>>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    pub channel_id: Option<String>,
    pub unique_id: Option<String>,
    pub channel_pattern: String,
}

impl CallState {
    #[must_use]
    pub fn new(
        request_id: RequestId,
        phone: impl Into<String>,
        code: impl Into<String>,
        caller_id: impl Into<String>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        let phone = phone.into();
        let channel_pattern = channel_pattern(&phone);
        Self {
            request_id,
            phone,
            code: code.into(),
            caller_id: caller_id.into(),
            otp_played: false,
            system_hangup: false,
            start_time: now,
            answer_time: None,
            end_time: None,
            channel_id: None,
            unique_id: None,
            channel_pattern,
        }
    }
}

/// Durations computed when a call ends (spec §4.G).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CallDurations {
    pub ring: chrono::Duration,
    pub talk: chrono::Duration,
    pub total: chrono::Duration,
}

impl CallState {
    /// Compute final durations. `ring = answer - start`, `talk = end -
    /// answer`, `total = end - start` (spec §4.G). Durations against a
    /// missing `answer_time` (never answered) are reported as zero, matching
    /// the "no talk time on an unanswered call" real-world expectation.
    #[must_use]
    pub fn durations(&self, end_time: chrono::DateTime<chrono::Utc>) -> CallDurations {
        match self.answer_time {
            Some(answer) => CallDurations {
                ring: answer - self.start_time,
                talk: end_time - answer,
                total: end_time - self.start_time,
            },
            None => CallDurations {
                ring: end_time - self.start_time,
                talk: chrono::Duration::zero(),
                total: end_time - self.start_time,
            },
        }
    }
}
