//! Q.850 hangup-cause classification for the Telephony Management Listener
//! (spec §4.I).

/// What a `Hangup` management event should do once the call is found to
/// still be tracked (not already resolved by the primary Stasis control
/// plane).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CauseOutcome {
    /// Cause 16/31: normal clearing. The primary control plane has already
    /// emitted (or will emit) the success path; nothing to do here.
    NormalClearing,
    /// Emit `voice:failed` with this description and, when present, the raw
    /// cause code to stash in `event_data`.
    Failed { description: String, cause_code: Option<u16> },
}

/// Classify a Q.850 cause code into the action the listener should take.
///
/// `ring_duration_positive` disambiguates cause 0, which the platform uses
/// both for "never answered" and "network gave up before ringing" --- spec
/// §4.I resolves the ambiguity using whether the call had started ringing.
#[must_use]
pub fn classify_cause(cause: u16, ring_duration_positive: bool) -> CauseOutcome {
    match cause {
        16 | 31 => CauseOutcome::NormalClearing,
        0 => {
            let description = if ring_duration_positive {
                "No answer (ringing timeout)"
            } else {
                "Call failed (no response from network)"
            };
            CauseOutcome::Failed { description: description.to_owned(), cause_code: Some(cause) }
        }
        other => CauseOutcome::Failed { description: describe_other(other), cause_code: Some(other) },
    }
}

fn describe_other(cause: u16) -> String {
    match cause {
        1 => "Unallocated number".to_owned(),
        17 => "User busy".to_owned(),
        18 => "No user responding".to_owned(),
        19 => "No answer from user".to_owned(),
        21 => "Call rejected".to_owned(),
        27 => "Destination out of order".to_owned(),
        34 => "No circuit/channel available".to_owned(),
        38 => "Network out of order".to_owned(),
        41 => "Temporary failure".to_owned(),
        42 => "Switching equipment congestion".to_owned(),
        other => format!("Unmapped cause {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_clearing_causes_are_no_ops() {
        assert_eq!(classify_cause(16, true), CauseOutcome::NormalClearing);
        assert_eq!(classify_cause(31, false), CauseOutcome::NormalClearing);
    }

    #[test]
    fn cause_zero_depends_on_ring_duration() {
        assert_eq!(
            classify_cause(0, true),
            CauseOutcome::Failed { description: "No answer (ringing timeout)".to_owned(), cause_code: Some(0) }
        );
        assert_eq!(
            classify_cause(0, false),
            CauseOutcome::Failed {
                description: "Call failed (no response from network)".to_owned(),
                cause_code: Some(0)
            }
        );
    }

    #[test]
    fn other_causes_carry_description_and_code() {
        match classify_cause(17, true) {
            CauseOutcome::Failed { description, cause_code } => {
                assert_eq!(description, "User busy");
                assert_eq!(cause_code, Some(17));
            }
            CauseOutcome::NormalClearing => panic!("expected Failed"),
        }
    }
}
