use crate::state_machine::TaskStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry in a task's append-only status history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTransition {
    pub sort_key: u32,
    pub from_state: Option<TaskStatus>,
    pub to_state: TaskStatus,
    pub event: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TaskTransition {
    /// Initial record written at admission
    pub fn initial(to_state: TaskStatus) -> Self {
        Self {
            sort_key: 1,
            from_state: None,
            to_state,
            event: "admit".to_string(),
            reason: None,
            created_at: Utc::now(),
        }
    }

    /// Record following `previous`
    pub fn next(
        previous: &TaskTransition,
        to_state: TaskStatus,
        event: &str,
        reason: Option<String>,
    ) -> Self {
        Self {
            sort_key: previous.sort_key + 1,
            from_state: Some(previous.to_state),
            to_state,
            event: event.to_string(),
            reason,
            created_at: Utc::now(),
        }
    }
}
