use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a scheduled task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Admitted and eligible once dependencies are met and any backoff elapsed
    #[default]
    Pending,
    /// Waiting on at least one dependency that has not completed
    Blocked,
    /// Handed to a worker for the current attempt
    InProgress,
    /// Action finished without error
    Completed,
    /// Attempts exhausted
    Failed,
    /// Held back by the risk gate until re-evaluated or resubmitted
    Deferred,
    /// Never executed because a dependency failed or was skipped
    Skipped,
}

impl TaskStatus {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    /// Check if this is an active state (task is being executed)
    pub fn is_active(&self) -> bool {
        matches!(self, Self::InProgress)
    }

    /// Check if this task satisfies dependencies for other tasks
    pub fn satisfies_dependencies(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Dependents of a task in this state can never run
    pub fn poisons_dependents(&self) -> bool {
        matches!(self, Self::Failed | Self::Skipped)
    }

    /// Statuses that keep `wait_for_completion` waiting
    pub fn is_outstanding(&self) -> bool {
        matches!(self, Self::Pending | Self::Blocked | Self::InProgress)
    }

    /// Statuses the dispatcher may pick up
    pub fn is_dispatchable(&self) -> bool {
        matches!(self, Self::Pending | Self::Blocked)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Blocked => write!(f, "blocked"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Deferred => write!(f, "deferred"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "blocked" => Ok(Self::Blocked),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "deferred" => Ok(Self::Deferred),
            "skipped" => Ok(Self::Skipped),
            _ => Err(format!("Invalid task status: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_check() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Skipped.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Blocked.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
        assert!(!TaskStatus::Deferred.is_terminal());
    }

    #[test]
    fn test_deferred_is_not_outstanding() {
        assert!(TaskStatus::Pending.is_outstanding());
        assert!(TaskStatus::Blocked.is_outstanding());
        assert!(TaskStatus::InProgress.is_outstanding());
        assert!(!TaskStatus::Deferred.is_outstanding());
        assert!(!TaskStatus::Completed.is_outstanding());
    }

    #[test]
    fn test_dependency_satisfaction() {
        assert!(TaskStatus::Completed.satisfies_dependencies());
        assert!(!TaskStatus::Deferred.satisfies_dependencies());
        assert!(TaskStatus::Failed.poisons_dependents());
        assert!(TaskStatus::Skipped.poisons_dependents());
        assert!(!TaskStatus::Deferred.poisons_dependents());
    }

    #[test]
    fn test_status_string_conversion() {
        assert_eq!(TaskStatus::InProgress.to_string(), "in_progress");
        assert_eq!(
            "deferred".parse::<TaskStatus>().unwrap(),
            TaskStatus::Deferred
        );
        assert!("cancelled".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let parsed: TaskStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, TaskStatus::InProgress);
    }
}
