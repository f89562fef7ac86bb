use super::events::TaskEvent;
use super::states::TaskStatus;
use crate::error::{Result, SchedulerError};
use crate::models::TaskId;

/// Transition table for task lifecycle events.
///
/// Stateless: the task graph store owns the current status and the
/// transition history, this only decides where an event leads.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskStateMachine;

impl TaskStateMachine {
    /// Determine the target status for `event` applied to a task in `current`
    pub fn determine_target_state(
        task_id: TaskId,
        current: TaskStatus,
        event: &TaskEvent,
    ) -> Result<TaskStatus> {
        let target = match (current, event) {
            (TaskStatus::Pending, TaskEvent::Block) => TaskStatus::Blocked,
            (TaskStatus::Blocked, TaskEvent::Unblock) => TaskStatus::Pending,

            (TaskStatus::Pending | TaskStatus::Blocked, TaskEvent::Start { .. }) => {
                TaskStatus::InProgress
            }

            (TaskStatus::InProgress, TaskEvent::Complete { .. }) => TaskStatus::Completed,
            (TaskStatus::InProgress, TaskEvent::Fail { .. }) => TaskStatus::Failed,
            (TaskStatus::InProgress, TaskEvent::ScheduleRetry { .. }) => TaskStatus::Pending,

            (TaskStatus::Pending | TaskStatus::Blocked, TaskEvent::Defer { .. }) => {
                TaskStatus::Deferred
            }
            (TaskStatus::Deferred, TaskEvent::Requeue) => TaskStatus::Pending,

            (
                TaskStatus::Pending | TaskStatus::Blocked | TaskStatus::Deferred,
                TaskEvent::Skip { .. },
            ) => TaskStatus::Skipped,

            (from, _) => {
                return Err(SchedulerError::InvalidTransition {
                    task_id,
                    from,
                    to: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }
}
