//! Per-source rate limiting state.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use super::config::HOUR;

/// State for a single source.
#[derive(Debug, Clone, Default)]
pub struct SourceState {
    /// Request timestamps within the last hour, oldest first.
    pub requests: VecDeque<Instant>,
    /// Last request time.
    pub last_request: Option<Instant>,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// End of the current suspension, if any.
    pub blocked_until: Option<Instant>,
    /// Total requests made.
    pub total_requests: u64,
    /// Total failures recorded.
    pub total_failures: u64,
}

impl SourceState {
    /// Drop timestamps that fell out of the hourly window.
    pub fn prune(&mut self, now: Instant) {
        while let Some(front) = self.requests.front() {
            if now.saturating_duration_since(*front) >= HOUR {
                self.requests.pop_front();
            } else {
                break;
            }
        }
    }

    /// Lift an expired suspension. Returns true if one was lifted.
    pub fn clear_expired_block(&mut self, now: Instant) -> bool {
        match self.blocked_until {
            Some(until) if now >= until => {
                self.blocked_until = None;
                self.consecutive_failures = 0;
                true
            }
            _ => false,
        }
    }

    pub fn is_blocked(&self, now: Instant) -> bool {
        self.blocked_until.is_some_and(|until| now < until)
    }

    /// Time left on the current suspension.
    pub fn block_remaining(&self, now: Instant) -> Option<Duration> {
        self.blocked_until
            .filter(|until| now < *until)
            .map(|until| until.saturating_duration_since(now))
    }

    /// Requests made within `window` of `now`.
    pub fn count_within(&self, window: Duration, now: Instant) -> usize {
        self.requests
            .iter()
            .rev()
            .take_while(|t| now.saturating_duration_since(**t) < window)
            .count()
    }
}
