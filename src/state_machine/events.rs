use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Events that can trigger task status transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum TaskEvent {
    /// Admission found unmet dependencies
    Block,
    /// Every dependency reached completed
    Unblock,
    /// Hand the task to a worker
    Start { dry_run: bool },
    /// Action returned a result
    Complete { result: Map<String, Value> },
    /// Attempts exhausted
    Fail { error: String },
    /// Attempt failed, task re-admitted after a delay
    ScheduleRetry {
        error: String,
        not_before: DateTime<Utc>,
    },
    /// Risk gate refused execution
    Defer { reason: String },
    /// Deferred task released back to the queue
    Requeue,
    /// A dependency can never complete
    Skip { reason: String },
}

impl TaskEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::Unblock => "unblock",
            Self::Start { .. } => "start",
            Self::Complete { .. } => "complete",
            Self::Fail { .. } => "fail",
            Self::ScheduleRetry { .. } => "schedule_retry",
            Self::Defer { .. } => "defer",
            Self::Requeue => "requeue",
            Self::Skip { .. } => "skip",
        }
    }

    /// Reason string recorded on the transition, if any
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Fail { error } | Self::ScheduleRetry { error, .. } => Some(error),
            Self::Defer { reason } | Self::Skip { reason } => Some(reason),
            _ => None,
        }
    }

    /// Check if this event represents a terminal transition
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Complete { .. } | Self::Fail { .. } | Self::Skip { .. }
        )
    }

    /// Create a failure event with the given error message
    pub fn fail_with_error(error: impl Into<String>) -> Self {
        Self::Fail {
            error: error.into(),
        }
    }

    /// Create a skip event with the given reason
    pub fn skip_with_reason(reason: impl Into<String>) -> Self {
        Self::Skip {
            reason: reason.into(),
        }
    }
}
