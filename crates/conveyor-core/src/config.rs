//! Queue configuration.

use std::time::Duration;

use crate::queue::retry::RetryPolicy;

/// Tuning knobs for one request queue instance.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// How many ids are fetched from the head of the pending list per
    /// iteration. Retrying items keep their position, so a cluster of
    /// not-yet-due items at the head can shadow ready items further back.
    pub batch_size: usize,

    /// Idle sleep between polls that found nothing ready.
    pub poll_interval: Duration,

    /// Pause after an iteration-level store failure. This stalls the whole
    /// queue, not just one item.
    pub error_cooldown: Duration,

    /// Handler timeout; expiring counts as a failed attempt.
    pub processing_timeout: Duration,

    /// Default retry budget, overridable per item at enqueue time.
    pub max_retries: u32,

    /// Base delay before the first retry.
    pub retry_delay: Duration,

    /// Exponential backoff multiplier.
    pub retry_backoff: f64,

    /// Cap on the computed backoff delay.
    pub max_retry_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            poll_interval: Duration::from_millis(100),
            error_cooldown: Duration::from_secs(5),
            processing_timeout: Duration::from_secs(60),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            retry_backoff: 2.0,
            max_retry_delay: Duration::from_secs(30),
        }
    }
}

impl QueueConfig {
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn error_cooldown(mut self, error_cooldown: Duration) -> Self {
        self.error_cooldown = error_cooldown;
        self
    }

    pub fn processing_timeout(mut self, processing_timeout: Duration) -> Self {
        self.processing_timeout = processing_timeout;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn retry_backoff(mut self, retry_backoff: f64) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }

    pub fn max_retry_delay(mut self, max_retry_delay: Duration) -> Self {
        self.max_retry_delay = max_retry_delay;
        self
    }

    pub(crate) fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: self.retry_delay,
            multiplier: self.retry_backoff,
            max_delay: self.max_retry_delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = QueueConfig::default();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.processing_timeout, Duration::from_secs(60));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(1));
        assert_eq!(config.retry_backoff, 2.0);
        assert_eq!(config.max_retry_delay, Duration::from_secs(30));
    }

    #[test]
    fn builder_setters_override_defaults() {
        let config = QueueConfig::default()
            .batch_size(5)
            .max_retries(1)
            .retry_delay(Duration::from_millis(20));
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.retry_policy().base_delay, Duration::from_millis(20));
    }
}
