use std::time::Duration;

/// Strategy for computing delay between retry attempts.
///
/// Each variant defines a different backoff curve. All variants clamp the
/// computed delay so it never exceeds the configured maximum.
#[derive(Debug, Clone)]
pub enum RetryStrategy {
    /// Exponential backoff: `base * multiplier^attempt`, optionally with
    /// deterministic jitter.
    Exponential {
        /// Initial delay before the first retry.
        base: Duration,
        /// Upper bound on the computed delay.
        max: Duration,
        /// Factor applied on each successive attempt.
        multiplier: f64,
        /// When `true`, a deterministic jitter factor is applied so that
        /// concurrent callers do not all retry at the same instant.
        jitter: bool,
    },
    /// Linear backoff: `delay * (attempt + 1)`, clamped to `max`.
    Linear {
        /// Per-attempt increment.
        delay: Duration,
        /// Upper bound on the computed delay.
        max: Duration,
    },
    /// Constant delay between every retry attempt.
    Constant {
        /// Fixed delay duration.
        delay: Duration,
    },
}

impl RetryStrategy {
    /// Compute the delay duration for the given zero-based `attempt` number.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use otpgw_retry::RetryStrategy;
    ///
    /// let strategy = RetryStrategy::Constant { delay: Duration::from_secs(1) };
    /// assert_eq!(strategy.delay_for(0), Duration::from_secs(1));
    /// assert_eq!(strategy.delay_for(5), Duration::from_secs(1));
    /// ```
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            Self::Exponential {
                base,
                max,
                multiplier,
                jitter,
            } => {
                let base_secs = base.as_secs_f64();
                // In practice `attempt` is a small retry count (< 100), so
                // wrapping from u32 to i32 cannot occur.
                #[allow(clippy::cast_possible_wrap)]
                let raw = base_secs * multiplier.powi(attempt as i32);

                let adjusted = if *jitter {
                    // Deterministic jitter: vary by +0% to +40% based on the
                    // attempt number.  This spreads retries across a window
                    // without requiring a random number generator.
                    let jitter_factor = 1.0 + 0.1 * f64::from(attempt % 5);
                    raw * jitter_factor
                } else {
                    raw
                };

                let clamped = adjusted.min(max.as_secs_f64());
                Duration::from_secs_f64(clamped)
            }
            Self::Linear { delay, max } => {
                let raw = delay.as_secs_f64() * f64::from(attempt + 1);
                let clamped = raw.min(max.as_secs_f64());
                Duration::from_secs_f64(clamped)
            }
            Self::Constant { delay } => *delay,
        }
    }
}

impl RetryStrategy {
    /// The webhook dispatcher's fixed retry schedule (spec §4.L): 2s, 10s,
    /// 30s. `Linear` can't express this unevenly-spaced sequence, so this
    /// names the one-off `Constant`-family curve the dispatcher actually
    /// wants: attempt 0 → 2s, attempt 1 → 10s, attempt 2+ → 30s.
    #[must_use]
    pub fn webhook_default() -> Self {
        Self::Exponential {
            base: Duration::from_secs(2),
            max: Duration::from_secs(30),
            multiplier: 5.0,
            jitter: false,
        }
    }

    /// The telephony management listener's reconnect backoff (spec §4.I):
    /// initial 5s, doubling. The attempt-count cap (10) is the caller's
    /// responsibility -- this strategy only knows about delay.
    #[must_use]
    pub fn telephony_reconnect() -> Self {
        Self::Exponential {
            base: Duration::from_secs(5),
            max: Duration::from_secs(300),
            multiplier: 2.0,
            jitter: false,
        }
    }

    /// The telephony control plane's long-poll reconnect backoff (spec
    /// §4.H): initial 1s, doubling, capped at 30s. Distinct from
    /// [`Self::telephony_reconnect`], which governs the separate
    /// management-socket listener's own reconnect curve.
    #[must_use]
    pub fn control_plane_reconnect() -> Self {
        Self::Exponential {
            base: Duration::from_secs(1),
            max: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: false,
        }
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }
}
