use crate::models::TaskId;
use crate::state_machine::TaskStatus;

/// Errors surfaced synchronously across the scheduler/caller boundary.
///
/// Execution failures of actions never show up here; they are recorded in
/// task state and the execution log instead.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchedulerError {
    #[error("Cycle detected while admitting task {task_id}: {}", format_path(.path))]
    CycleDetected { task_id: TaskId, path: Vec<TaskId> },

    #[error("Task {task_id} depends on unknown task {dependency}")]
    UnknownDependency { task_id: TaskId, dependency: TaskId },

    #[error("Invalid task template: {0}")]
    InvalidTemplate(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Invalid transition for task {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: TaskId,
        from: TaskStatus,
        to: String,
    },

    #[error("Scheduler is not accepting new tasks")]
    AdmissionClosed,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),
}

fn format_path(path: &[TaskId]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

impl From<crate::config::ConfigurationError> for SchedulerError {
    fn from(err: crate::config::ConfigurationError) -> Self {
        SchedulerError::ConfigurationError(err.to_string())
    }
}

impl From<std::io::Error> for SchedulerError {
    fn from(err: std::io::Error) -> Self {
        SchedulerError::PersistenceError(err.to_string())
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::PersistenceError(format!("serialization failed: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_error_renders_path() {
        let a = TaskId::new();
        let b = TaskId::new();
        let err = SchedulerError::CycleDetected {
            task_id: a,
            path: vec![a, b, a],
        };
        let rendered = err.to_string();
        assert!(rendered.contains(&format!("{a} -> {b} -> {a}")));
    }

    #[test]
    fn test_io_error_maps_to_persistence() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: SchedulerError = io.into();
        assert!(matches!(err, SchedulerError::PersistenceError(_)));
    }
}
