//! # Backoff Calculator
//!
//! Decides what happens after a failed attempt: another attempt after an
//! exponential delay, or permanent failure once `max_attempts` executions
//! have been spent. Delays are scheduled re-admissions; nothing here sleeps.

use crate::config::BackoffConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What to do with a task whose attempt just failed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RetryDecision {
    /// Return to PENDING and become eligible after `delay`
    Retry { delay: Duration, next_attempt: u32 },
    /// Attempts exhausted; the task fails permanently
    Exhausted { attempts: u32 },
}

#[derive(Debug, Clone)]
pub struct BackoffCalculator {
    config: BackoffConfig,
}

impl Default for BackoffCalculator {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}

impl BackoffCalculator {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Decide after attempt number `attempt_count` (1-based) failed
    pub fn decide(&self, attempt_count: u32) -> RetryDecision {
        if attempt_count >= self.config.max_attempts {
            RetryDecision::Exhausted {
                attempts: attempt_count,
            }
        } else {
            RetryDecision::Retry {
                delay: self.delay_for_attempt(attempt_count),
                next_attempt: attempt_count + 1,
            }
        }
    }

    /// `base_delay * multiplier^(attempt - 1)`, optionally jittered, capped
    /// at `max_delay_ms`
    pub fn delay_for_attempt(&self, attempt_count: u32) -> Duration {
        let base = Duration::from_millis(self.config.base_delay_ms);
        let max = Duration::from_millis(self.config.max_delay_ms);
        let exponent = attempt_count.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.config.backoff_multiplier.powi(exponent);

        // Saturate instead of panicking on absurd multipliers
        let delay = Duration::try_from_secs_f64(base.as_secs_f64() * factor)
            .unwrap_or(max)
            .min(max);

        let jittered = if self.config.jitter_enabled && self.config.jitter_max_percentage > 0.0 {
            let jitter = fastrand::f64() * self.config.jitter_max_percentage;
            delay.mul_f64(1.0 + jitter)
        } else {
            delay
        };

        jittered.min(max)
    }
}
