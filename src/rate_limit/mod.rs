//! Respectful per-source rate limiter.
//!
//! Tracks rolling per-minute and per-hour request budgets, enforces a
//! minimum delay between requests that grows with consecutive failures,
//! and suspends a source for an exponentially growing period once it keeps
//! failing.

mod config;
mod source_state;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub use config::{RateLimitConfig, SourceStats, MAX_DELAY_SECS, MINUTE};
use config::HOUR;
use source_state::SourceState;

/// Sources that get the stricter travel-agency budget by default.
pub const OTA_SOURCES: &[&str] = &["traveloka", "tiket", "pegipegi"];

/// Rate limiter shared by every scraping source. Clones share state.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    overrides: Arc<HashMap<String, RateLimitConfig>>,
    sources: Arc<Mutex<HashMap<String, SourceState>>>,
}

impl RateLimiter {
    /// Create a rate limiter with default settings and the built-in OTA overrides.
    pub fn new() -> Self {
        Self::with_config(RateLimitConfig::default(), HashMap::new())
    }

    /// Create a rate limiter with a default config and per-source overrides.
    /// The OTA defaults apply to any OTA source not overridden explicitly.
    pub fn with_config(
        config: RateLimitConfig,
        mut overrides: HashMap<String, RateLimitConfig>,
    ) -> Self {
        for source in OTA_SOURCES {
            overrides
                .entry(source.to_string())
                .or_insert_with(RateLimitConfig::ota);
        }
        Self {
            config,
            overrides: Arc::new(overrides),
            sources: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Settings that apply to a source.
    pub fn config_for(&self, source: &str) -> &RateLimitConfig {
        self.overrides.get(source).unwrap_or(&self.config)
    }

    /// Whether a request may be made right now without waiting.
    pub async fn can_request(&self, source: &str) -> bool {
        let config = self.config_for(source);
        let now = Instant::now();
        let mut sources = self.sources.lock().await;
        let state = sources.entry(source.to_string()).or_default();

        if state.clear_expired_block(now) {
            info!("Source {} unblocked", source);
        }
        if state.is_blocked(now) {
            return false;
        }

        state.prune(now);
        state.count_within(HOUR, now) < config.requests_per_hour
            && state.count_within(MINUTE, now) < config.requests_per_minute
    }

    /// Sleep until the next request to `source` is polite, returning how
    /// long the caller waited.
    pub async fn wait_if_needed(&self, source: &str) -> Duration {
        let config = self.config_for(source);
        let wait = {
            let now = Instant::now();
            let mut sources = self.sources.lock().await;
            let state = sources.entry(source.to_string()).or_default();

            if state.clear_expired_block(now) {
                info!("Source {} unblocked", source);
            }
            state.prune(now);

            if let Some(remaining) = state.block_remaining(now) {
                remaining
            } else if state.count_within(HOUR, now) >= config.requests_per_hour
                || state.count_within(MINUTE, now) >= config.requests_per_minute
            {
                config.budget_wait(state.consecutive_failures)
            } else {
                let delay = config.delay_for(state.consecutive_failures);
                state
                    .last_request
                    .map(|last| delay.saturating_sub(now.saturating_duration_since(last)))
                    .unwrap_or(Duration::ZERO)
            }
        };

        if wait > Duration::ZERO {
            debug!("Rate limiting {}: waiting {:?}", source, wait);
            tokio::time::sleep(wait).await;
        }
        wait
    }

    /// Record that a request was made.
    pub async fn record_request(&self, source: &str) {
        let now = Instant::now();
        let mut sources = self.sources.lock().await;
        let state = sources.entry(source.to_string()).or_default();
        state.prune(now);
        state.requests.push_back(now);
        state.last_request = Some(now);
        state.total_requests += 1;
    }

    /// Record a successful request; resets the failure streak.
    pub async fn record_success(&self, source: &str) {
        let mut sources = self.sources.lock().await;
        if let Some(state) = sources.get_mut(source) {
            state.consecutive_failures = 0;
        }
    }

    /// Record a failed request, suspending the source once failures reach
    /// the retry ceiling.
    pub async fn record_failure(&self, source: &str) {
        let config = self.config_for(source);
        let now = Instant::now();
        let mut sources = self.sources.lock().await;
        let state = sources.entry(source.to_string()).or_default();
        state.consecutive_failures += 1;
        state.total_failures += 1;

        if state.consecutive_failures >= config.max_retries {
            let block = config.block_duration(state.consecutive_failures);
            state.blocked_until = Some(now + block);
            warn!(
                "Source {} blocked for {} minutes after {} consecutive failures",
                source,
                block.as_secs() / 60,
                state.consecutive_failures
            );
        } else {
            debug!(
                "Source {} failure {}/{}",
                source, state.consecutive_failures, config.max_retries
            );
        }
    }

    /// Whether the source is suspended. An expired suspension is lifted and
    /// the failure streak reset.
    pub async fn is_blocked(&self, source: &str) -> bool {
        let now = Instant::now();
        let mut sources = self.sources.lock().await;
        match sources.get_mut(source) {
            Some(state) => {
                if state.clear_expired_block(now) {
                    info!("Source {} unblocked", source);
                }
                state.is_blocked(now)
            }
            None => false,
        }
    }

    /// Current inter-request delay for a source.
    pub async fn delay_for(&self, source: &str) -> Duration {
        let config = self.config_for(source);
        let sources = self.sources.lock().await;
        let failures = sources
            .get(source)
            .map(|s| s.consecutive_failures)
            .unwrap_or(0);
        config.delay_for(failures)
    }

    /// Statistics for one source, if it has been seen.
    pub async fn stats(&self, source: &str) -> Option<SourceStats> {
        let config = self.config_for(source);
        let now = Instant::now();
        let sources = self.sources.lock().await;
        sources
            .get(source)
            .map(|state| Self::build_stats(config, state, now))
    }

    /// Statistics for every source seen so far.
    pub async fn all_stats(&self) -> HashMap<String, SourceStats> {
        let now = Instant::now();
        let sources = self.sources.lock().await;
        sources
            .iter()
            .map(|(name, state)| {
                (
                    name.clone(),
                    Self::build_stats(self.config_for(name), state, now),
                )
            })
            .collect()
    }

    fn build_stats(config: &RateLimitConfig, state: &SourceState, now: Instant) -> SourceStats {
        SourceStats {
            requests_last_minute: state.count_within(MINUTE, now),
            requests_last_hour: state.count_within(HOUR, now),
            consecutive_failures: state.consecutive_failures,
            is_blocked: state.is_blocked(now),
            blocked_for: state.block_remaining(now),
            current_delay: config.delay_for(state.consecutive_failures),
            total_requests: state.total_requests,
            total_failures: state.total_failures,
        }
    }

    /// Forget everything about a source.
    pub async fn reset(&self, source: &str) {
        self.sources.lock().await.remove(source);
    }

    /// Forget everything about every source.
    pub async fn reset_all(&self) {
        self.sources.lock().await.clear();
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
