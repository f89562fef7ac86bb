//! Aggregate counters derived from the task graph store.

use crate::models::Task;
use crate::state_machine::TaskStatus;
use serde::{Deserialize, Serialize};

/// Per-status task counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub blocked: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub deferred: usize,
    pub skipped: usize,
}

impl StatusCounts {
    pub fn get(&self, status: TaskStatus) -> usize {
        match status {
            TaskStatus::Pending => self.pending,
            TaskStatus::Blocked => self.blocked,
            TaskStatus::InProgress => self.in_progress,
            TaskStatus::Completed => self.completed,
            TaskStatus::Failed => self.failed,
            TaskStatus::Deferred => self.deferred,
            TaskStatus::Skipped => self.skipped,
        }
    }

    fn increment(&mut self, status: TaskStatus) {
        let slot = match status {
            TaskStatus::Pending => &mut self.pending,
            TaskStatus::Blocked => &mut self.blocked,
            TaskStatus::InProgress => &mut self.in_progress,
            TaskStatus::Completed => &mut self.completed,
            TaskStatus::Failed => &mut self.failed,
            TaskStatus::Deferred => &mut self.deferred,
            TaskStatus::Skipped => &mut self.skipped,
        };
        *slot += 1;
    }

    /// Tasks that keep `wait_for_completion` waiting
    pub fn outstanding(&self) -> usize {
        self.pending + self.blocked + self.in_progress
    }
}

/// Event counters the store accumulates as transitions happen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerCounters {
    pub dry_run_executions: u64,
    pub retries_scheduled: u64,
    pub branches_spawned: u64,
    pub branch_errors: u64,
}

/// Point-in-time scheduler metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerMetrics {
    pub total_tasks: usize,
    pub status_counts: StatusCounts,
    /// Executions started across all tasks
    pub total_attempts: u64,
    pub completed: usize,
    pub failed: usize,
    /// completed / (completed + failed); 0 before anything finished
    pub success_rate: f64,
    pub dry_run_executions: u64,
    pub retries_scheduled: u64,
    pub branches_spawned: u64,
    pub branch_errors: u64,
    /// Mean duration of the final attempt of COMPLETED and FAILED tasks
    pub average_duration_ms: Option<f64>,
}

impl SchedulerMetrics {
    pub fn collect<'a>(tasks: impl IntoIterator<Item = &'a Task>, counters: SchedulerCounters) -> Self {
        let mut status_counts = StatusCounts::default();
        let mut total_tasks = 0;
        let mut total_attempts = 0u64;
        let mut duration_sum = 0i64;
        let mut duration_count = 0u64;

        for task in tasks {
            total_tasks += 1;
            status_counts.increment(task.status);
            total_attempts += u64::from(task.attempt_count);

            if matches!(task.status, TaskStatus::Completed | TaskStatus::Failed) {
                if let Some(duration) = task.duration_ms() {
                    duration_sum += duration;
                    duration_count += 1;
                }
            }
        }

        let completed = status_counts.completed;
        let failed = status_counts.failed;
        let finished = completed + failed;
        let success_rate = if finished == 0 {
            0.0
        } else {
            completed as f64 / finished as f64
        };
        let average_duration_ms =
            (duration_count > 0).then(|| duration_sum as f64 / duration_count as f64);

        Self {
            total_tasks,
            status_counts,
            total_attempts,
            completed,
            failed,
            success_rate,
            dry_run_executions: counters.dry_run_executions,
            retries_scheduled: counters.retries_scheduled,
            branches_spawned: counters.branches_spawned,
            branch_errors: counters.branch_errors,
            average_duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TaskId, TaskSpec};
    use chrono::{Duration, Utc};

    fn task_with(status: TaskStatus, attempts: u32, duration_ms: Option<i64>) -> Task {
        let mut task = Task::from_spec(TaskSpec::new("t", "noop"), TaskId::new(), 1, None);
        task.status = status;
        task.attempt_count = attempts;
        if let Some(ms) = duration_ms {
            let started = Utc::now();
            task.started_at = Some(started);
            task.completed_at = Some(started + Duration::milliseconds(ms));
        }
        task
    }

    #[test]
    fn test_collect_counts_and_rates() {
        let tasks = vec![
            task_with(TaskStatus::Completed, 1, Some(100)),
            task_with(TaskStatus::Completed, 2, Some(300)),
            task_with(TaskStatus::Failed, 3, Some(200)),
            task_with(TaskStatus::Deferred, 0, None),
            task_with(TaskStatus::Skipped, 0, None),
        ];
        let counters = SchedulerCounters {
            retries_scheduled: 3,
            ..SchedulerCounters::default()
        };

        let metrics = SchedulerMetrics::collect(&tasks, counters);
        assert_eq!(metrics.total_tasks, 5);
        assert_eq!(metrics.total_attempts, 6);
        assert_eq!(metrics.status_counts.get(TaskStatus::Deferred), 1);
        assert_eq!(metrics.status_counts.outstanding(), 0);
        assert!((metrics.success_rate - 2.0 / 3.0).abs() < f64::EPSILON);
        assert_eq!(metrics.average_duration_ms, Some(200.0));
        assert_eq!(metrics.retries_scheduled, 3);
    }

    #[test]
    fn test_empty_store_has_zero_rate() {
        let metrics = SchedulerMetrics::collect(&Vec::<Task>::new(), SchedulerCounters::default());
        assert_eq!(metrics.success_rate, 0.0);
        assert!(metrics.average_duration_ms.is_none());
    }
}
