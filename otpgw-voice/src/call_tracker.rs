//! Three maps over one set of calls (spec §4.G): by request id, by channel
//! pattern, and by phone number. Kept behind a single lock so the maps never
//! drift out of sync with one another.

use std::collections::HashMap;

use chrono::Duration;
use parking_lot::RwLock;
use regex::Regex;

use otpgw_core::{CallDurations, CallState, RequestId};

use crate::error::VoiceError;

struct Inner {
    by_request: HashMap<RequestId, CallState>,
    by_pattern: HashMap<String, RequestId>,
    by_phone: HashMap<String, RequestId>,
}

/// In-memory registry of calls currently in flight. Populated by the Voice
/// Orchestrator on origination and consulted by the Telephony Management
/// Listener to correlate asynchronous platform events back to a request.
pub struct CallTracker {
    inner: RwLock<Inner>,
}

impl CallTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                by_request: HashMap::new(),
                by_pattern: HashMap::new(),
                by_phone: HashMap::new(),
            }),
        }
    }

    /// Register a new call. Returns the channel pattern derived for it so
    /// the caller can hand it to the call-control API as the destination.
    pub fn register(
        &self,
        request_id: RequestId,
        phone: impl Into<String>,
        code: impl Into<String>,
        caller_id: impl Into<String>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> String {
        let phone = phone.into();
        let call = CallState::new(request_id.clone(), phone.clone(), code, caller_id, now);
        let pattern = call.channel_pattern.clone();

        let mut inner = self.inner.write();
        inner.by_pattern.insert(pattern.clone(), request_id.clone());
        inner.by_phone.insert(phone, request_id.clone());
        inner.by_request.insert(request_id, call);
        pattern
    }

    /// Record the telephony platform's opaque call id for precise
    /// correlation alongside the phone-derived channel pattern.
    pub fn bind_unique_id(&self, request_id: &RequestId, unique_id: impl Into<String>) -> Result<(), VoiceError> {
        let mut inner = self.inner.write();
        let call = inner
            .by_request
            .get_mut(request_id)
            .ok_or_else(|| VoiceError::UnknownRequest(request_id.as_str().to_owned()))?;
        call.unique_id = Some(unique_id.into());
        Ok(())
    }

    /// Stamp `answer_time` and return the ring duration (`answer - start`).
    pub fn mark_answered(
        &self,
        request_id: &RequestId,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Duration, VoiceError> {
        let mut inner = self.inner.write();
        let call = inner
            .by_request
            .get_mut(request_id)
            .ok_or_else(|| VoiceError::UnknownRequest(request_id.as_str().to_owned()))?;
        call.answer_time = Some(now);
        Ok(now - call.start_time)
    }

    pub fn mark_otp_played(&self, request_id: &RequestId) -> Result<(), VoiceError> {
        let mut inner = self.inner.write();
        let call = inner
            .by_request
            .get_mut(request_id)
            .ok_or_else(|| VoiceError::UnknownRequest(request_id.as_str().to_owned()))?;
        call.otp_played = true;
        Ok(())
    }

    pub fn mark_system_hangup(&self, request_id: &RequestId) -> Result<(), VoiceError> {
        let mut inner = self.inner.write();
        let call = inner
            .by_request
            .get_mut(request_id)
            .ok_or_else(|| VoiceError::UnknownRequest(request_id.as_str().to_owned()))?;
        call.system_hangup = true;
        Ok(())
    }

    /// Resolve a request from a raw channel name: try it as an exact channel
    /// pattern prefix first, then fall back to extracting the `PJSIP/<digits>`
    /// portion with a regex and looking that up.
    #[must_use]
    pub fn find_request_by_channel(&self, name: &str) -> Option<RequestId> {
        let inner = self.inner.read();
        if let Some(id) = inner.by_pattern.iter().find_map(|(pattern, id)| name.starts_with(pattern.as_str()).then_some(id)) {
            return Some(id.clone());
        }
        let re = Regex::new(r"PJSIP/(\d+)").expect("static pattern is valid");
        let captured = re.captures(name)?;
        let pattern = format!("PJSIP/{}", &captured[1]);
        inner.by_pattern.get(&pattern).cloned()
    }

    /// Fallback correlation for opaque channel names the platform sometimes
    /// emits: look the call up by phone number instead.
    #[must_use]
    pub fn find_request_by_phone(&self, phone: &str) -> Option<RequestId> {
        self.inner.read().by_phone.get(phone).cloned()
    }

    /// Bridge an opaque raw channel name to a request id via phone-number
    /// lookup, so later `find_request_by_channel` calls for that name
    /// resolve directly.
    pub fn register_side_channel(&self, phone: &str, raw_channel_name: impl Into<String>) -> Option<RequestId> {
        let mut inner = self.inner.write();
        let request_id = inner.by_phone.get(phone).cloned()?;
        inner.by_pattern.insert(raw_channel_name.into(), request_id.clone());
        Some(request_id)
    }

    /// Stamp `end_time`, compute final durations, remove the call from all
    /// three maps, and return the completed state.
    pub fn end_call(
        &self,
        request_id: &RequestId,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<(CallState, CallDurations), VoiceError> {
        let mut inner = self.inner.write();
        let mut call = inner
            .by_request
            .remove(request_id)
            .ok_or_else(|| VoiceError::UnknownRequest(request_id.as_str().to_owned()))?;
        call.end_time = Some(now);
        let durations = call.durations(now);

        inner.by_pattern.retain(|_, id| id != request_id);
        inner.by_phone.retain(|_, id| id != request_id);
        Ok((call, durations))
    }

    /// Snapshot of a call's current state, without removing it.
    #[must_use]
    pub fn get(&self, request_id: &RequestId) -> Option<CallState> {
        self.inner.read().by_request.get(request_id).cloned()
    }
}

impl Default for CallTracker {
    fn default() -> Self {
        Self::new()
    }
}
