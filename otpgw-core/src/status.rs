//! The request status state machine (spec §4.F).
//!
//! Every high-level [`RequestStatus`] write must go through
//! [`map_channel_event`] or [`resolve_auth_status`] -- individual components
//! are forbidden from writing status strings directly. This is the mechanism
//! that prevents duplicate/`delivered`-clobber bugs: the mapping table below
//! is the single source of truth for "what does this event mean".

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::event::ChannelEventType;
use crate::types::Channel;

/// High-level delivery status of a request.
///
/// Ordered along the partial order `pending -> sending -> sent -> delivered
/// -> verified`, with terminal side-branches `failed`, `rejected`, `expired`
/// reachable from any non-terminal state. `verified` is reached only via
/// auth feedback (see [`AuthStatus`]), never from a channel event directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Sending,
    Sent,
    Delivered,
    Verified,
    Failed,
    Rejected,
    Expired,
}

impl RequestStatus {
    /// Rank along the delivery partial order. Terminal side-branches share no
    /// meaningful rank with the happy path; this is used only to detect
    /// forward progress on the happy path itself.
    fn happy_path_rank(self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Sending => Some(1),
            Self::Sent => Some(2),
            Self::Delivered => Some(3),
            Self::Verified => Some(4),
            Self::Failed | Self::Rejected | Self::Expired => None,
        }
    }

    /// `true` once a request can no longer make forward progress.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Rejected | Self::Expired | Self::Verified)
    }

    /// Whether `self -> next` is a monotone move along the happy-path order,
    /// or a move into a terminal side-branch. Per §4.F this is advisory: the
    /// state machine still applies out-of-order transitions (events may
    /// arrive out of order from independent control planes) but logs a
    /// warning when this returns `false`.
    #[must_use]
    pub fn is_valid_transition(self, next: Self) -> bool {
        if self.is_terminal() {
            // Terminal states, once reached via the channel path, don't move
            // again except verified composing on top (handled separately).
            return self == next;
        }
        match (self.happy_path_rank(), next.happy_path_rank()) {
            (Some(a), Some(b)) => b >= a,
            // Moving into a terminal side-branch is always structurally
            // valid; out-of-order *recovery* from one is not modeled here.
            (Some(_), None) => true,
            (None, _) => self == next,
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Verified => "verified",
            Self::Failed => "failed",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// Orthogonal authentication-feedback axis (spec §3, §4.F).
///
/// Transitions only `Unverified -> {Verified, WrongCode}` and
/// `WrongCode -> Verified`, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    Unverified,
    Verified,
    WrongCode,
}

impl AuthStatus {
    /// Apply auth feedback, enforcing the one-way transition rule. Returns
    /// the resulting status; a shadow-banned request may still carry an
    /// `AuthStatus::Verified` value produced by a *caller's* feedback call,
    /// but callers of this function are responsible for refusing to surface
    /// `verified` in the combined status for shadow-banned requests (spec
    /// invariant 3) -- see `otpgw-bus` where shadow-ban state is known.
    #[must_use]
    pub fn apply_feedback(self, success: bool) -> Self {
        match (self, success) {
            (Self::Verified, _) => Self::Verified,
            (_, true) => Self::Verified,
            (_, false) => Self::WrongCode,
        }
    }
}

impl fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unverified => "unverified",
            Self::Verified => "verified",
            Self::WrongCode => "wrong_code",
        };
        f.write_str(s)
    }
}

/// Map a `(channel, event_type)` pair onto a high-level [`RequestStatus`],
/// per the authoritative table in spec §4.F.
///
/// `otp_played` disambiguates `voice:hangup`, which resolves to `delivered`
/// when the OTP had already been played and `failed` otherwise (§9(c): this
/// holds even if the hangup event is persisted before a `completed` event
/// that never arrives).
#[must_use]
pub fn map_channel_event(
    channel: Channel,
    event: ChannelEventType,
    otp_played: bool,
) -> RequestStatus {
    use ChannelEventType as E;
    match (channel, event) {
        (Channel::Sms, E::Queued) => RequestStatus::Pending,
        (Channel::Sms, E::Sending) => RequestStatus::Sending,
        (Channel::Sms, E::Sent) => RequestStatus::Sent,
        (Channel::Sms, E::Delivered) => RequestStatus::Delivered,
        (Channel::Sms, E::Failed | E::Undelivered) => RequestStatus::Failed,

        (Channel::Voice, E::Queued) => RequestStatus::Pending,
        (Channel::Voice, E::Calling) => RequestStatus::Sending,
        (Channel::Voice, E::Ringing | E::Answered | E::Playing) => RequestStatus::Sent,
        (Channel::Voice, E::Completed) => RequestStatus::Delivered,
        (Channel::Voice, E::Failed | E::NoAnswer | E::Busy) => RequestStatus::Failed,
        (Channel::Voice, E::Hangup) => {
            if otp_played {
                RequestStatus::Delivered
            } else {
                RequestStatus::Failed
            }
        }

        // Events that don't apply to the other channel can't occur by
        // construction (ChannelEventType is validated per-channel at the
        // event bus boundary), but the mapping must be total.
        (Channel::Sms, E::Calling | E::Ringing | E::Answered | E::Playing | E::Completed | E::NoAnswer | E::Busy | E::Hangup) => {
            RequestStatus::Failed
        }
        (Channel::Voice, E::Undelivered) => RequestStatus::Failed,
    }
}

/// Compose the externally-visible status from the delivery status and the
/// auth status. `verified` takes precedence in the combined view but never
/// rewrites the stored delivery-status column (spec §4.F).
#[must_use]
pub fn combined_status(delivery: RequestStatus, auth: AuthStatus) -> RequestStatus {
    if auth == AuthStatus::Verified {
        RequestStatus::Verified
    } else {
        delivery
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sms_happy_path_mapping() {
        assert_eq!(
            map_channel_event(Channel::Sms, ChannelEventType::Queued, false),
            RequestStatus::Pending
        );
        assert_eq!(
            map_channel_event(Channel::Sms, ChannelEventType::Delivered, false),
            RequestStatus::Delivered
        );
    }

    #[test]
    fn voice_hangup_depends_on_otp_played() {
        assert_eq!(
            map_channel_event(Channel::Voice, ChannelEventType::Hangup, true),
            RequestStatus::Delivered
        );
        assert_eq!(
            map_channel_event(Channel::Voice, ChannelEventType::Hangup, false),
            RequestStatus::Failed
        );
    }

    #[test]
    fn voice_in_progress_events_map_to_sent() {
        for e in [
            ChannelEventType::Ringing,
            ChannelEventType::Answered,
            ChannelEventType::Playing,
        ] {
            assert_eq!(map_channel_event(Channel::Voice, e, false), RequestStatus::Sent);
        }
    }

    #[test]
    fn auth_status_one_way_transitions() {
        assert_eq!(AuthStatus::Unverified.apply_feedback(false), AuthStatus::WrongCode);
        assert_eq!(AuthStatus::WrongCode.apply_feedback(true), AuthStatus::Verified);
        // verified never regresses, even on a later failed feedback call.
        assert_eq!(AuthStatus::Verified.apply_feedback(false), AuthStatus::Verified);
    }

    #[test]
    fn combined_status_prefers_verified() {
        assert_eq!(
            combined_status(RequestStatus::Sent, AuthStatus::Verified),
            RequestStatus::Verified
        );
        assert_eq!(
            combined_status(RequestStatus::Sent, AuthStatus::Unverified),
            RequestStatus::Sent
        );
    }

    #[test]
    fn happy_path_monotone_transitions_are_valid() {
        assert!(RequestStatus::Pending.is_valid_transition(RequestStatus::Sending));
        assert!(RequestStatus::Sending.is_valid_transition(RequestStatus::Sent));
        assert!(!RequestStatus::Sent.is_valid_transition(RequestStatus::Pending));
    }

    #[test]
    fn terminal_state_is_sticky() {
        assert!(RequestStatus::Failed.is_valid_transition(RequestStatus::Failed));
        assert!(!RequestStatus::Failed.is_valid_transition(RequestStatus::Delivered));
    }
}
