//! Reconnect delays.
//!
//! Two independent budgets apply. A dropped connection walks the fixed
//! reconnect `schedule` once; a failed initial connect is retried after
//! `outer_base_delay * retry_count`, up to `max_outer_retries` failures.
//! Exhausting either hands over to polling.

use std::time::Duration;

use caselink_core::config::RealtimeConfig;

/// Retry policy for the hub connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay before each reconnect attempt after a drop, in order.
    pub schedule: Vec<Duration>,
    /// Multiplied by the failure count for outer retries.
    pub outer_base_delay: Duration,
    /// Failed connect attempts tolerated before falling back to polling.
    pub max_outer_retries: u32,
}

impl BackoffPolicy {
    /// Builds the policy from configuration.
    pub fn from_config(config: &RealtimeConfig) -> Self {
        Self {
            schedule: config
                .reconnect_schedule_ms
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
            outer_base_delay: Duration::from_millis(config.outer_retry_base_delay_ms),
            max_outer_retries: config.max_outer_retries,
        }
    }

    /// Delay before reconnect attempt `attempt` (0-based) after a drop, or
    /// `None` once the schedule is exhausted.
    pub fn reconnect_delay(&self, attempt: usize) -> Option<Duration> {
        self.schedule.get(attempt).copied()
    }

    /// Delay before the next connect after `retry_count` consecutive
    /// failures.
    pub fn outer_retry_delay(&self, retry_count: u32) -> Duration {
        self.outer_base_delay.saturating_mul(retry_count)
    }

    /// Whether `retry_count` failures exhaust the outer budget.
    pub fn outer_retries_exhausted(&self, retry_count: u32) -> bool {
        retry_count >= self.max_outer_retries
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&RealtimeConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let policy = BackoffPolicy::default();
        let delays: Vec<_> = (0..5).map(|i| policy.reconnect_delay(i)).collect();
        assert_eq!(
            delays,
            vec![
                Some(Duration::ZERO),
                Some(Duration::from_secs(2)),
                Some(Duration::from_secs(10)),
                Some(Duration::from_secs(30)),
                None,
            ]
        );
    }

    #[test]
    fn test_outer_delay_is_linear() {
        let policy = BackoffPolicy {
            schedule: vec![],
            outer_base_delay: Duration::from_millis(5000),
            max_outer_retries: 3,
        };
        assert_eq!(policy.outer_retry_delay(1), Duration::from_secs(5));
        assert_eq!(policy.outer_retry_delay(3), Duration::from_secs(15));
        assert!(!policy.outer_retries_exhausted(2));
        assert!(policy.outer_retries_exhausted(3));
    }
}
