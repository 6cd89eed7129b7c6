//! Retry policy for transient fetch failures

use crate::config::RunnerSettings;
use crate::crawler::FetchError;
use std::time::Duration;

/// Capped exponential backoff
///
/// Attempts are counted from 1. The delay after attempt `n` is
/// `initial_backoff * multiplier^(n - 1)`, capped at `max_backoff`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per URL, the first one included
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RunnerSettings::default())
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &RunnerSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
            multiplier: 2.0,
        }
    }

    /// Backoff to wait after the given (1-based) attempt failed
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31) as i32;
        let millis = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Whether another attempt is allowed after `attempt` failed with `error`
    pub fn should_retry(&self, attempt: u32, error: &FetchError) -> bool {
        error.is_retryable() && attempt < self.max_attempts
    }

    /// Delay before the next attempt, honouring a server `Retry-After` up to the cap
    pub fn delay_for(&self, attempt: u32, error: &FetchError) -> Duration {
        let backoff = self.backoff(attempt);
        match error {
            FetchError::RateLimited {
                retry_after: Some(retry_after),
            } => backoff.max(*retry_after).min(self.max_backoff),
            _ => backoff,
        }
    }
}
