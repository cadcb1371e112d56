use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(4);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

/// Bounded exponential backoff: the delay doubles after every failed attempt
/// and never exceeds `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1 << exponent)
            .min(self.max_delay)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff {
            policy: *self,
            attempts: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Retry(Duration),
    GiveUp,
}

/// Retry state of a single request.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    attempts: u32,
}

impl Backoff {
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Marks the start of a new attempt and returns its 1-based number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    pub fn after_failure(&self, retryable: bool) -> Step {
        if !retryable || self.attempts >= self.policy.max_attempts.max(1) {
            Step::GiveUp
        } else {
            Step::Retry(self.policy.delay_after(self.attempts))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        }
    }

    #[rstest]
    #[case(1, 100)]
    #[case(2, 200)]
    #[case(3, 350)]
    #[case(40, 350)]
    fn test_delay_doubles_up_to_cap(#[case] attempt: u32, #[case] expected_ms: u64) {
        assert_eq!(
            policy(5).delay_after(attempt),
            Duration::from_millis(expected_ms)
        );
    }

    #[test]
    fn test_default_policy_matches_three_attempts() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_after(1), Duration::from_secs(4));
        assert_eq!(policy.delay_after(2), Duration::from_secs(8));
        assert_eq!(policy.delay_after(3), Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_schedule_then_gives_up() {
        let mut backoff = policy(3).backoff();
        let mut steps = Vec::new();
        loop {
            backoff.begin_attempt();
            let step = backoff.after_failure(true);
            steps.push(step);
            if step == Step::GiveUp {
                break;
            }
        }
        assert_eq!(
            steps,
            vec![
                Step::Retry(Duration::from_millis(100)),
                Step::Retry(Duration::from_millis(200)),
                Step::GiveUp,
            ]
        );
        assert_eq!(backoff.attempts(), 3);
    }

    #[test]
    fn test_non_retryable_gives_up_immediately() {
        let mut backoff = policy(3).backoff();
        backoff.begin_attempt();
        assert_eq!(backoff.after_failure(false), Step::GiveUp);
        assert_eq!(backoff.attempts(), 1);
    }

    #[test]
    fn test_zero_attempts_still_allows_one() {
        let mut backoff = policy(0).backoff();
        assert_eq!(backoff.begin_attempt(), 1);
        assert_eq!(backoff.after_failure(true), Step::GiveUp);
    }
}
