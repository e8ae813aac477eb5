//! Reconnect policy - pure retry/give-up decisions
//!
//! Given the number of connection failures observed so far and the configured
//! limits, decides whether to retry and how long to wait first. Exponential
//! backoff with a ceiling; no hidden state, fully deterministic.

use std::time::Duration;

/// Retry limits and backoff shape for one session.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    /// Maximum number of retries before giving up.
    pub max_attempts: u32,
    /// Exponent base for the backoff curve, in seconds.
    pub base_secs: u64,
    /// Ceiling applied to every computed delay, in seconds.
    pub cap_secs: u64,
}

/// Outcome of one policy consultation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectDecision {
    pub should_retry: bool,
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_secs: 2,
            cap_secs: 30,
        }
    }
}

impl ReconnectPolicy {
    /// Decide what to do after a failure, given the number of failures that
    /// came *before* this one: `delay = min(base^attempt, cap)`.
    ///
    /// For the defaults (base 2, cap 30) attempts 0..5 yield delays
    /// 1, 2, 4, 8, 16, 30 seconds.
    pub fn decide(&self, attempt: u32) -> ReconnectDecision {
        let raw = self.base_secs.checked_pow(attempt).unwrap_or(self.cap_secs);
        ReconnectDecision {
            should_retry: attempt < self.max_attempts,
            delay: Duration::from_secs(raw.min(self.cap_secs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_backoff_trajectory() {
        let policy = ReconnectPolicy::default();
        let expected = [1, 2, 4, 8, 16, 30];
        for (attempt, secs) in expected.iter().enumerate() {
            let decision = policy.decide(attempt as u32);
            assert_eq!(
                decision.delay,
                Duration::from_secs(*secs),
                "attempt {} should back off {}s",
                attempt,
                secs
            );
        }
    }

    #[test]
    fn cap_applies_past_attempt_five() {
        let policy = ReconnectPolicy::default();
        // 2^5 = 32 -> capped at 30
        assert_eq!(policy.decide(5).delay, Duration::from_secs(30));
        assert_eq!(policy.decide(20).delay, Duration::from_secs(30));
    }

    #[test]
    fn retries_below_limit_only() {
        let policy = ReconnectPolicy {
            max_attempts: 5,
            ..Default::default()
        };
        for attempt in 0..5 {
            assert!(policy.decide(attempt).should_retry, "attempt {}", attempt);
        }
        for attempt in 5..10 {
            assert!(!policy.decide(attempt).should_retry, "attempt {}", attempt);
        }
    }

    #[test]
    fn zero_max_attempts_never_retries() {
        let policy = ReconnectPolicy {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(!policy.decide(0).should_retry);
    }

    #[test]
    fn deterministic_given_inputs() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.decide(3), policy.decide(3));
    }

    #[test]
    fn huge_attempt_count_does_not_overflow() {
        let policy = ReconnectPolicy::default();
        let decision = policy.decide(u32::MAX);
        assert_eq!(decision.delay, Duration::from_secs(30));
        assert!(!decision.should_retry);
    }
}
