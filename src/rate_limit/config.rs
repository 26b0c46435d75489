//! Rate limiter configuration and types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Window over which the hourly budget is counted; older timestamps are pruned.
pub const HOUR: Duration = Duration::from_secs(3600);

/// Window over which the per-minute budget is counted.
pub const MINUTE: Duration = Duration::from_secs(60);

/// Longest a source can be suspended, in minutes.
pub const MAX_BLOCK_MINUTES: u64 = 60;

/// Suspension length at the first block, in minutes.
pub const BASE_BLOCK_MINUTES: u64 = 5;

/// Longest delay a config value may ask for, in seconds.
pub const MAX_DELAY_SECS: f64 = 86_400.0;

/// Seconds as a duration; negative or non-finite values count as zero.
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::ZERO)
}

/// Request budget and backoff settings for one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum requests in any rolling minute.
    pub requests_per_minute: usize,
    /// Maximum requests in any rolling hour.
    pub requests_per_hour: usize,
    /// Minimum delay between consecutive requests, in seconds.
    pub min_delay_secs: f64,
    /// Ceiling for the failure-scaled delay, in seconds.
    pub max_delay_secs: f64,
    /// Delay multiplier per consecutive failure.
    pub backoff_factor: f64,
    /// Consecutive failures before the source is suspended.
    pub max_retries: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 5,
            requests_per_hour: 100,
            min_delay_secs: 2.0,
            max_delay_secs: 10.0,
            backoff_factor: 2.0,
            max_retries: 3,
        }
    }
}

impl RateLimitConfig {
    /// Stricter settings for online travel agency sites.
    pub fn ota() -> Self {
        Self {
            requests_per_minute: 5,
            requests_per_hour: 60,
            min_delay_secs: 3.0,
            max_delay_secs: 15.0,
            ..Self::default()
        }
    }

    pub fn min_delay(&self) -> Duration {
        seconds(self.min_delay_secs)
    }

    pub fn max_delay(&self) -> Duration {
        seconds(self.max_delay_secs)
    }

    /// Inter-request delay after `failures` consecutive failures.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let scaled = self.min_delay_secs * self.backoff_factor.powi(failures.min(32) as i32);
        seconds(scaled.clamp(0.0, self.max_delay_secs.max(0.0)))
    }

    /// Wait imposed when the request budget is exhausted.
    pub fn budget_wait(&self, failures: u32) -> Duration {
        let scaled = self.min_delay() * (failures.saturating_add(1));
        scaled.min(self.max_delay())
    }

    /// Suspension length once `failures` has reached `max_retries`.
    pub fn block_duration(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(self.max_retries).min(16);
        let minutes = (BASE_BLOCK_MINUTES << exponent).min(MAX_BLOCK_MINUTES);
        Duration::from_secs(minutes * 60)
    }
}

/// Per-source rate limiter statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceStats {
    pub requests_last_minute: usize,
    pub requests_last_hour: usize,
    pub consecutive_failures: u32,
    pub is_blocked: bool,
    /// Time left on the current suspension.
    pub blocked_for: Option<Duration>,
    pub current_delay: Duration,
    pub total_requests: u64,
    pub total_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_scales_and_caps() {
        let config = RateLimitConfig::default();
        assert_eq!(config.delay_for(0), Duration::from_secs(2));
        assert_eq!(config.delay_for(1), Duration::from_secs(4));
        assert_eq!(config.delay_for(2), Duration::from_secs(8));
        assert_eq!(config.delay_for(5), Duration::from_secs(10));
    }

    #[test]
    fn test_non_finite_delays_do_not_panic() {
        let config = RateLimitConfig {
            min_delay_secs: f64::NAN,
            max_delay_secs: f64::INFINITY,
            ..RateLimitConfig::default()
        };
        assert_eq!(config.min_delay(), Duration::ZERO);
        assert_eq!(config.max_delay(), Duration::ZERO);
        assert_eq!(config.delay_for(3), Duration::ZERO);
    }

    #[test]
    fn test_budget_wait() {
        let config = RateLimitConfig::default();
        assert_eq!(config.budget_wait(0), Duration::from_secs(2));
        assert_eq!(config.budget_wait(2), Duration::from_secs(6));
        assert_eq!(config.budget_wait(9), Duration::from_secs(10));
    }

    #[test]
    fn test_block_duration_grows_and_caps() {
        let config = RateLimitConfig::default();
        assert_eq!(config.block_duration(3), Duration::from_secs(5 * 60));
        assert_eq!(config.block_duration(4), Duration::from_secs(10 * 60));
        assert_eq!(config.block_duration(6), Duration::from_secs(40 * 60));
        assert_eq!(config.block_duration(7), Duration::from_secs(60 * 60));
        assert_eq!(config.block_duration(40), Duration::from_secs(60 * 60));
    }
}
