//! # Scheduler Configuration
//!
//! Typed configuration for the dispatch engine, risk gate, retry controller
//! and persistence sinks. Every section has defaults, so an empty or missing
//! YAML file yields a working scheduler.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tasker_scheduler::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load configuration (environment auto-detected)
//! let manager = ConfigManager::load()?;
//!
//! let workers = manager.config().execution.max_concurrent_tasks;
//! let base_delay = manager.config().base_delay();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants::system;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root scheduler configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub execution: ExecutionConfig,
    pub risk: RiskGateConfig,
    pub backoff: BackoffConfig,
    pub persistence: PersistenceConfig,
}

/// Worker pool and action invocation settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Size of the in-flight set
    pub max_concurrent_tasks: usize,
    /// Applied to every action invocation when set
    pub action_timeout_ms: Option<u64>,
    /// How long `stop()` waits for in-flight workers
    pub shutdown_timeout_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: system::DEFAULT_MAX_CONCURRENT_TASKS,
            action_timeout_ms: None,
            shutdown_timeout_ms: system::DEFAULT_SHUTDOWN_TIMEOUT_MS,
        }
    }
}

/// Risk gate thresholds
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RiskGateConfig {
    /// Minimum confidence for MEDIUM risk tasks
    pub medium_risk_threshold: f64,
    /// Minimum confidence for HIGH risk tasks
    pub approval_threshold: f64,
    /// Run approved HIGH risk tasks in dry-run mode
    pub dry_run_high_risk: bool,
}

impl Default for RiskGateConfig {
    fn default() -> Self {
        Self {
            medium_risk_threshold: system::MEDIUM_RISK_THRESHOLD,
            approval_threshold: system::APPROVAL_THRESHOLD,
            dry_run_high_risk: false,
        }
    }
}

/// Backoff and retry configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Executions allowed before a task fails permanently
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter_enabled: bool,
    pub jitter_max_percentage: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: system::MAX_ATTEMPTS,
            base_delay_ms: system::BASE_DELAY_MS,
            backoff_multiplier: system::BACKOFF_MULTIPLIER,
            max_delay_ms: system::MAX_DELAY_MS,
            jitter_enabled: false,
            jitter_max_percentage: 0.1,
        }
    }
}

/// Execution log and snapshot locations
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Directory for daily `executions-YYYY-MM-DD.jsonl` files
    pub execution_log_dir: Option<PathBuf>,
    /// Target file for queue snapshots
    pub snapshot_path: Option<PathBuf>,
    /// Periodic snapshots are taken only when this and `snapshot_path` are set
    pub snapshot_interval_seconds: Option<u64>,
}

impl SchedulerConfig {
    /// Validate configuration values
    pub fn validate(&self) -> ConfigResult<()> {
        if self.execution.max_concurrent_tasks == 0 {
            return Err(ConfigurationError::invalid_value(
                "execution.max_concurrent_tasks",
                "0",
                "must be greater than 0",
            ));
        }

        let limit = max_concurrent_tasks_limit();
        if self.execution.max_concurrent_tasks > limit {
            return Err(ConfigurationError::invalid_value(
                "execution.max_concurrent_tasks",
                self.execution.max_concurrent_tasks.to_string(),
                format!("must not exceed {limit}"),
            ));
        }

        if self.execution.action_timeout_ms == Some(0) {
            return Err(ConfigurationError::invalid_value(
                "execution.action_timeout_ms",
                "0",
                "omit the field to disable the timeout",
            ));
        }

        check_unit_interval("risk.medium_risk_threshold", self.risk.medium_risk_threshold)?;
        check_unit_interval("risk.approval_threshold", self.risk.approval_threshold)?;

        if self.backoff.max_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "backoff.max_attempts",
                "0",
                "at least one attempt is required",
            ));
        }

        if !self.backoff.backoff_multiplier.is_finite() || self.backoff.backoff_multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "backoff.backoff_multiplier",
                self.backoff.backoff_multiplier.to_string(),
                "must be at least 1.0",
            ));
        }

        if self.backoff.max_delay_ms < self.backoff.base_delay_ms {
            return Err(ConfigurationError::invalid_value(
                "backoff.max_delay_ms",
                self.backoff.max_delay_ms.to_string(),
                format!(
                    "must not be below backoff.base_delay_ms ({})",
                    self.backoff.base_delay_ms
                ),
            ));
        }

        check_unit_interval(
            "backoff.jitter_max_percentage",
            self.backoff.jitter_max_percentage,
        )?;

        if self.persistence.snapshot_interval_seconds == Some(0) {
            return Err(ConfigurationError::invalid_value(
                "persistence.snapshot_interval_seconds",
                "0",
                "must be greater than 0",
            ));
        }

        if self.persistence.snapshot_interval_seconds.is_some()
            && self.persistence.snapshot_path.is_none()
        {
            return Err(ConfigurationError::missing_required_field(
                "persistence.snapshot_path",
                "periodic snapshots",
            ));
        }

        Ok(())
    }

    /// Get action timeout as Duration
    pub fn action_timeout(&self) -> Option<Duration> {
        self.execution.action_timeout_ms.map(Duration::from_millis)
    }

    /// Get shutdown drain timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.execution.shutdown_timeout_ms)
    }

    /// Get base retry delay as Duration
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.backoff.base_delay_ms)
    }

    /// Get maximum retry delay as Duration
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.backoff.max_delay_ms)
    }

    /// Get snapshot interval as Duration
    pub fn snapshot_interval(&self) -> Option<Duration> {
        self.persistence
            .snapshot_interval_seconds
            .map(Duration::from_secs)
    }
}

/// Largest worker pool the dispatcher can both size and drain on stop
pub fn max_concurrent_tasks_limit() -> usize {
    usize::try_from(u32::MAX)
        .unwrap_or(usize::MAX)
        .min(tokio::sync::Semaphore::MAX_PERMITS)
}

fn check_unit_interval(field: &str, value: f64) -> ConfigResult<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(ConfigurationError::invalid_value(
            field,
            value.to_string(),
            "must be within [0, 1]",
        ));
    }
    Ok(())
}
