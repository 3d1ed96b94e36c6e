//! Retry policy: decides backoff delays.

use std::time::Duration;

/// Exponential backoff with a cap.
#[derive(Debug, Clone)]
pub(crate) struct RetryPolicy {
    pub(crate) base_delay: Duration,
    pub(crate) multiplier: f64,
    pub(crate) max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before the next attempt, given the number of failures so far
    /// (1-indexed): `base_delay * multiplier^(retries - 1)`, capped at
    /// `max_delay`.
    ///
    /// Example with base=1s, multiplier=2.0, cap=30s:
    /// - failure 1: 1s
    /// - failure 2: 2s
    /// - failure 3: 4s
    /// - failure 6: 30s (capped)
    pub(crate) fn next_delay(&self, retries: u32) -> Duration {
        let exponent = retries.saturating_sub(1) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }

    #[rstest]
    #[case::first_failure(1, Duration::from_millis(100))]
    #[case::second_failure(2, Duration::from_millis(200))]
    #[case::third_failure(3, Duration::from_millis(400))]
    #[case::zero_is_treated_like_one(0, Duration::from_millis(100))]
    fn exponential_backoff(#[case] retries: u32, #[case] expected: Duration) {
        assert_eq!(policy().next_delay(retries), expected);
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        };
        // 1s * 2^9 = 512s without the cap
        assert_eq!(policy.next_delay(10), Duration::from_secs(30));
    }
}
