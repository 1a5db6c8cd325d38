//! The immutable per-request event timeline (spec §3, §4.E).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{Channel, RequestId};

/// A channel-specific event type, as reported by a provider or orchestrator.
///
/// Only a subset applies to each [`Channel`]; `otpgw-bus::EventBus::emit`
/// validates the `(channel, event_type)` pair before handing it to
/// [`crate::status::map_channel_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelEventType {
    Queued,
    Sending,
    Sent,
    Delivered,
    Failed,
    Undelivered,
    Calling,
    Ringing,
    Answered,
    Playing,
    Completed,
    NoAnswer,
    Busy,
    Hangup,
}

impl ChannelEventType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Undelivered => "undelivered",
            Self::Calling => "calling",
            Self::Ringing => "ringing",
            Self::Answered => "answered",
            Self::Playing => "playing",
            Self::Completed => "completed",
            Self::NoAnswer => "no_answer",
            Self::Busy => "busy",
            Self::Hangup => "hangup",
        }
    }

    /// Whether this event type is meaningful for the given channel. Used by
    /// `otpgw-bus::EventBus::emit` to reject malformed emissions early.
    #[must_use]
    pub fn applies_to(self, channel: Channel) -> bool {
        match channel {
            Channel::Sms => matches!(
                self,
                Self::Queued | Self::Sending | Self::Sent | Self::Delivered | Self::Failed | Self::Undelivered
            ),
            Channel::Voice => matches!(
                self,
                Self::Queued
                    | Self::Calling
                    | Self::Ringing
                    | Self::Answered
                    | Self::Playing
                    | Self::Completed
                    | Self::Failed
                    | Self::NoAnswer
                    | Self::Busy
                    | Self::Hangup
            ),
        }
    }

    /// Terminal delivery event types subject to duplicate suppression
    /// (spec §4.E step 1: at most one `delivered`/`completed` per
    /// `(request_id, channel)`).
    #[must_use]
    pub fn is_terminal_delivery(self) -> bool {
        matches!(self, Self::Delivered | Self::Completed)
    }
}

impl fmt::Display for ChannelEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChannelEventType {
    type Err = crate::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "queued" => Self::Queued,
            "sending" => Self::Sending,
            "sent" => Self::Sent,
            "delivered" => Self::Delivered,
            "failed" => Self::Failed,
            "undelivered" => Self::Undelivered,
            "calling" => Self::Calling,
            "ringing" => Self::Ringing,
            "answered" => Self::Answered,
            "playing" => Self::Playing,
            "completed" => Self::Completed,
            "no_answer" => Self::NoAnswer,
            "busy" => Self::Busy,
            "hangup" => Self::Hangup,
            other => return Err(crate::CoreError::UnknownEventType(other.to_owned())),
        })
    }
}

/// An opaque key/value bag attached to an event (spec §3: `event_data`).
///
/// A thin wrapper over `serde_json::Value` so callers can stash
/// provider-specific fields (`hung_up_by`, `cause_code`, `error`,
/// `provider_id`) without `otpgw-core` knowing about every provider.
pub type EventData = serde_json::Map<String, serde_json::Value>;

/// A single immutable timeline entry for a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic id assigned by the store on insert.
    pub id: i64,
    pub request_id: RequestId,
    pub channel: Channel,
    pub event_type: ChannelEventType,
    pub event_data: EventData,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
