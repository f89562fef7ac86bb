//! # System Constants
//!
//! Operational boundaries and well-known names shared by the scheduler
//! components, the execution log and structured logging.

pub use crate::state_machine::TaskStatus;

/// Operation names attached to structured log events and execution records
pub mod events {
    pub const TASK_SUBMITTED: &str = "task.submitted";
    pub const TASK_DISPATCHED: &str = "task.dispatched";
    pub const TASK_COMPLETED: &str = "task.completed";
    pub const TASK_FAILED: &str = "task.failed";
    pub const TASK_RETRY_SCHEDULED: &str = "task.retry_scheduled";
    pub const TASK_DEFERRED: &str = "task.deferred";
    pub const TASK_REQUEUED: &str = "task.requeued";
    pub const TASK_SKIPPED: &str = "task.skipped";

    pub const BRANCH_SPAWNED: &str = "branch.spawned";
    pub const BRANCH_FAILED: &str = "branch.failed";

    pub const SCHEDULER_STARTED: &str = "scheduler.started";
    pub const SCHEDULER_STOPPED: &str = "scheduler.stopped";
    pub const SNAPSHOT_WRITTEN: &str = "scheduler.snapshot_written";
}

/// Reason strings recorded on FAILED, SKIPPED and DEFERRED transitions
pub mod reasons {
    pub const DEPENDENCY_FAILED: &str = "dependency_failed";
    pub const ACTION_NOT_REGISTERED: &str = "action_not_registered";
    pub const ACTION_PANICKED: &str = "action_panicked";
    pub const ACTION_TIMED_OUT: &str = "action_timed_out";
    pub const CONFIDENCE_BELOW_THRESHOLD: &str = "confidence_below_threshold";
}

/// System-wide defaults
pub mod system {
    /// Executions allowed before a task fails permanently
    pub const MAX_ATTEMPTS: u32 = 3;

    /// First retry delay; doubled for each further attempt
    pub const BASE_DELAY_MS: u64 = 2_000;

    pub const BACKOFF_MULTIPLIER: f64 = 2.0;

    /// Upper bound on any single retry delay
    pub const MAX_DELAY_MS: u64 = 60_000;

    /// Minimum confidence for MEDIUM risk tasks
    pub const MEDIUM_RISK_THRESHOLD: f64 = 0.5;

    /// Minimum confidence for HIGH risk tasks
    pub const APPROVAL_THRESHOLD: f64 = 0.7;

    pub const DEFAULT_MAX_CONCURRENT_TASKS: usize = 4;

    pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 30_000;

    /// Entries kept by the in-memory execution log a builder falls back to
    pub const DEFAULT_IN_MEMORY_LOG_CAPACITY: usize = 10_000;
}

/// Status groupings used when counting or filtering tasks
pub mod status_groups {
    use super::TaskStatus;

    pub const ALL_STATES: &[TaskStatus] = &[
        TaskStatus::Pending,
        TaskStatus::Blocked,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Deferred,
        TaskStatus::Skipped,
    ];

    pub const TERMINAL_STATES: &[TaskStatus] =
        &[TaskStatus::Completed, TaskStatus::Failed, TaskStatus::Skipped];

    /// States that keep `wait_for_completion` waiting
    pub const OUTSTANDING_STATES: &[TaskStatus] =
        &[TaskStatus::Pending, TaskStatus::Blocked, TaskStatus::InProgress];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_groups_agree_with_status_helpers() {
        for status in status_groups::ALL_STATES {
            assert_eq!(
                status_groups::TERMINAL_STATES.contains(status),
                status.is_terminal()
            );
            assert_eq!(
                status_groups::OUTSTANDING_STATES.contains(status),
                status.is_outstanding()
            );
        }
    }
}
