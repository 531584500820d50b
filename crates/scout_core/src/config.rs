use std::time::Duration;

use crate::ConfigError;

/// What happens to fetches already in flight when a run aborts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancelMode {
    /// Await in-flight fetches and discard their results.
    #[default]
    Graceful,
    /// Ask in-flight fetches to stop, best effort.
    Immediate,
}

/// Run configuration. The core never reads the environment or files; a
/// caller builds this, usually from `Default` plus overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlConfig {
    pub max_concurrent: usize,
    /// Minimum gap between the starts of two fetches against the same source.
    pub min_delay: Duration,
    pub max_retries: u32,
    pub per_attempt_timeout: Duration,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    /// Optional cap on emitted records across the whole run.
    pub max_records: Option<usize>,
    pub fatal_cancel_mode: CancelMode,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            min_delay: Duration::from_millis(500),
            max_retries: 3,
            per_attempt_timeout: Duration::from_secs(30),
            retry_base_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(30),
            max_records: None,
            fatal_cancel_mode: CancelMode::Graceful,
        }
    }
}

impl CrawlConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.per_attempt_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    /// Delay before retrying a task whose attempt number `attempt` failed:
    /// `retry_base_delay * 2^attempt`, capped at `retry_max_delay`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.retry_base_delay
            .saturating_mul(factor)
            .min(self.retry_max_delay)
    }
}
