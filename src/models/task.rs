//! # Task Model
//!
//! The unit of schedulable work plus the submission payload that creates it.
//!
//! A [`TaskSpec`] is what callers (and the branch evaluator) hand to the task
//! graph store. The store turns it into a [`Task`] record, assigns the id and
//! submission sequence, and from then on owns every mutation.

use super::conditional_branch::ConditionalBranch;
use super::task_transition::TaskTransition;
use crate::error::{Result, SchedulerError};
use crate::state_machine::TaskStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tokio::time::Instant;
use uuid::Uuid;

/// Argument map handed to an action
pub type ActionParams = Map<String, Value>;

/// Result map returned by an action
pub type ActionResult = Map<String, Value>;

/// Opaque task identifier assigned at submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Scheduling tier; lower numeric value runs sooner among ready tasks
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Critical = 1,
    High = 2,
    #[default]
    Medium = 3,
    Low = 4,
    Background = 5,
}

impl TaskPriority {
    pub fn value(&self) -> u8 {
        *self as u8
    }
}

impl TryFrom<u8> for TaskPriority {
    type Error = SchedulerError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Critical),
            2 => Ok(Self::High),
            3 => Ok(Self::Medium),
            4 => Ok(Self::Low),
            5 => Ok(Self::Background),
            other => Err(SchedulerError::ValidationError(format!(
                "priority must be between 1 and 5, got {other}"
            ))),
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
            Self::Background => write!(f, "background"),
        }
    }
}

/// Risk classification supplied upstream and consumed by the risk gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

fn default_confidence() -> f64 {
    1.0
}

/// Submission payload for a new task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Caller-assigned id; lets tasks in one batch reference each other
    #[serde(default)]
    pub id: Option<TaskId>,
    pub description: String,
    pub action_name: String,
    #[serde(default)]
    pub action_params: ActionParams,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub risk_level: RiskLevel,
    #[serde(default = "default_confidence")]
    pub confidence_score: f64,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default)]
    pub conditional_branches: Vec<ConditionalBranch>,
    /// Per-task override of the global dry-run setting for high risk tasks
    #[serde(default)]
    pub dry_run: Option<bool>,
}

impl TaskSpec {
    pub fn new(description: impl Into<String>, action_name: impl Into<String>) -> Self {
        Self {
            id: None,
            description: description.into(),
            action_name: action_name.into(),
            action_params: Map::new(),
            priority: TaskPriority::default(),
            risk_level: RiskLevel::default(),
            confidence_score: default_confidence(),
            dependencies: Vec::new(),
            conditional_branches: Vec::new(),
            dry_run: None,
        }
    }

    pub fn with_id(mut self, id: TaskId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_params(mut self, params: ActionParams) -> Self {
        self.action_params = params;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.action_params.insert(key.into(), value);
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_risk(mut self, risk_level: RiskLevel, confidence_score: f64) -> Self {
        self.risk_level = risk_level;
        self.confidence_score = confidence_score;
        self
    }

    pub fn with_dependency(mut self, dependency: TaskId) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn with_dependencies(mut self, dependencies: impl IntoIterator<Item = TaskId>) -> Self {
        self.dependencies.extend(dependencies);
        self
    }

    pub fn with_branch(mut self, branch: ConditionalBranch) -> Self {
        self.conditional_branches.push(branch);
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = Some(dry_run);
        self
    }

    /// Structural checks that do not need the graph
    pub fn validate(&self) -> Result<()> {
        if self.action_name.trim().is_empty() {
            return Err(SchedulerError::ValidationError(
                "action_name must not be empty".to_string(),
            ));
        }
        validate_confidence(self.confidence_score)?;
        for branch in &self.conditional_branches {
            branch.validate()?;
        }
        Ok(())
    }
}

pub(crate) fn validate_confidence(confidence_score: f64) -> Result<()> {
    if !confidence_score.is_finite() || !(0.0..=1.0).contains(&confidence_score) {
        return Err(SchedulerError::ValidationError(format!(
            "confidence_score must be within [0, 1], got {confidence_score}"
        )));
    }
    Ok(())
}

/// Changes applied when a deferred task is resubmitted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub confidence_score: Option<f64>,
    pub risk_level: Option<RiskLevel>,
}

impl TaskUpdate {
    pub fn confidence(confidence_score: f64) -> Self {
        Self {
            confidence_score: Some(confidence_score),
            risk_level: None,
        }
    }
}

/// A task record owned by the task graph store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub description: String,
    pub action_name: String,
    pub action_params: ActionParams,
    pub priority: TaskPriority,
    pub risk_level: RiskLevel,
    pub confidence_score: f64,
    pub dependencies: Vec<TaskId>,
    pub conditional_branches: Vec<ConditionalBranch>,
    pub dry_run_override: Option<bool>,
    pub status: TaskStatus,
    pub attempt_count: u32,
    /// Submission order, used as the tie-break among equal priorities
    pub sequence: u64,
    /// Parent task when spawned by a conditional branch
    pub parent_id: Option<TaskId>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Earliest time a retried task may be dispatched again
    pub not_before: Option<DateTime<Utc>>,
    /// Monotonic twin of `not_before` used for dispatch decisions
    #[serde(skip)]
    pub(crate) retry_at: Option<Instant>,
    pub result: Option<ActionResult>,
    pub error: Option<String>,
    /// Reason attached to the latest deferral, skip, or failure
    pub status_reason: Option<String>,
    /// Set when the most recent execution ran in dry-run mode
    pub dry_run: bool,
    pub branches_evaluated: bool,
    pub transitions: Vec<TaskTransition>,
}

impl Task {
    pub(crate) fn from_spec(
        spec: TaskSpec,
        id: TaskId,
        sequence: u64,
        parent_id: Option<TaskId>,
    ) -> Self {
        let mut dependencies = Vec::with_capacity(spec.dependencies.len());
        for dependency in spec.dependencies {
            if !dependencies.contains(&dependency) {
                dependencies.push(dependency);
            }
        }

        Self {
            id,
            description: spec.description,
            action_name: spec.action_name,
            action_params: spec.action_params,
            priority: spec.priority,
            risk_level: spec.risk_level,
            confidence_score: spec.confidence_score,
            dependencies,
            conditional_branches: spec.conditional_branches,
            dry_run_override: spec.dry_run,
            status: TaskStatus::Pending,
            attempt_count: 0,
            sequence,
            parent_id,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            not_before: None,
            retry_at: None,
            result: None,
            error: None,
            status_reason: None,
            dry_run: false,
            branches_evaluated: false,
            transitions: vec![TaskTransition::initial(TaskStatus::Pending)],
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Latest history entry; admission always writes one
    pub fn current_transition(&self) -> Option<&TaskTransition> {
        self.transitions.last()
    }

    /// Wall time of the most recent attempt, once it finished
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.completed_at) {
            (Some(started), Some(completed)) => {
                Some((completed - started).num_milliseconds().max(0))
            }
            _ => None,
        }
    }

    /// Whether the retry backoff still holds this task back at `now`
    pub fn is_backing_off(&self, now: Instant) -> bool {
        self.retry_at.is_some_and(|retry_at| retry_at > now)
    }

    /// Instant the current backoff ends, if any
    pub fn retry_at(&self) -> Option<Instant> {
        self.retry_at
    }
}
