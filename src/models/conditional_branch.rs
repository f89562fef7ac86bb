use super::task::{validate_confidence, ActionParams, RiskLevel, Task, TaskId, TaskPriority, TaskSpec};
use crate::error::{Result, SchedulerError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Condition checked against a parent's terminal outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "condition_type", rename_all = "snake_case")]
pub enum BranchCondition {
    /// Parent completed
    Success,
    /// Parent failed or was skipped
    Failure,
    /// Parent completed with a result equal to `comparison_value`; with a
    /// `comparison_key` only that field of the result is compared
    ResultEquals {
        comparison_value: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comparison_key: Option<String>,
    },
    /// Parent result map holds `comparison_key`
    ResultContains { comparison_key: String },
}

impl BranchCondition {
    pub fn condition_type(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::ResultEquals { .. } => "result_equals",
            Self::ResultContains { .. } => "result_contains",
        }
    }
}

/// Rule attached to a parent task that spawns a follow-on task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalBranch {
    #[serde(flatten)]
    pub condition: BranchCondition,
    pub next_task_template: TaskTemplate,
}

impl ConditionalBranch {
    pub fn new(condition: BranchCondition, next_task_template: TaskTemplate) -> Self {
        Self {
            condition,
            next_task_template,
        }
    }

    pub fn on_success(template: TaskTemplate) -> Self {
        Self::new(BranchCondition::Success, template)
    }

    pub fn on_failure(template: TaskTemplate) -> Self {
        Self::new(BranchCondition::Failure, template)
    }

    pub fn when_result_equals(comparison_value: Value, template: TaskTemplate) -> Self {
        Self::new(
            BranchCondition::ResultEquals {
                comparison_value,
                comparison_key: None,
            },
            template,
        )
    }

    pub fn when_result_field_equals(
        comparison_key: impl Into<String>,
        comparison_value: Value,
        template: TaskTemplate,
    ) -> Self {
        Self::new(
            BranchCondition::ResultEquals {
                comparison_value,
                comparison_key: Some(comparison_key.into()),
            },
            template,
        )
    }

    pub fn when_result_contains(comparison_key: impl Into<String>, template: TaskTemplate) -> Self {
        Self::new(
            BranchCondition::ResultContains {
                comparison_key: comparison_key.into(),
            },
            template,
        )
    }

    /// Checks applied when the parent is submitted
    pub fn validate(&self) -> Result<()> {
        let empty_key = match &self.condition {
            BranchCondition::ResultContains { comparison_key } => comparison_key.is_empty(),
            BranchCondition::ResultEquals {
                comparison_key: Some(key),
                ..
            } => key.is_empty(),
            _ => false,
        };
        if empty_key {
            return Err(SchedulerError::InvalidTemplate(format!(
                "{} requires a non-empty comparison_key",
                self.condition.condition_type()
            )));
        }
        if let Some(confidence) = self.next_task_template.confidence_score {
            validate_confidence(confidence)
                .map_err(|e| SchedulerError::InvalidTemplate(e.to_string()))?;
        }
        // Branches the child would carry are checked now, not at spawn time
        self.next_task_template
            .conditional_branches
            .iter()
            .try_for_each(ConditionalBranch::validate)
    }
}

/// Partial task specification instantiated when a branch matches.
///
/// Unset priority, risk and confidence are inherited from the parent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskTemplate {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub action_name: Option<String>,
    #[serde(default)]
    pub action_params: ActionParams,
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    #[serde(default)]
    pub risk_level: Option<RiskLevel>,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    /// Add an explicit edge on the parent
    #[serde(default)]
    pub depends_on_parent: bool,
    #[serde(default)]
    pub conditional_branches: Vec<ConditionalBranch>,
    #[serde(default)]
    pub dry_run: Option<bool>,
}

impl TaskTemplate {
    pub fn for_action(action_name: impl Into<String>) -> Self {
        Self {
            action_name: Some(action_name.into()),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.action_params.insert(key.into(), value);
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_risk(mut self, risk_level: RiskLevel, confidence_score: f64) -> Self {
        self.risk_level = Some(risk_level);
        self.confidence_score = Some(confidence_score);
        self
    }

    pub fn depending_on_parent(mut self) -> Self {
        self.depends_on_parent = true;
        self
    }

    pub fn with_branch(mut self, branch: ConditionalBranch) -> Self {
        self.conditional_branches.push(branch);
        self
    }

    /// Build the submission payload for a child of `parent`
    pub fn instantiate(&self, parent: &Task) -> Result<TaskSpec> {
        let action_name = match self.action_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                return Err(SchedulerError::InvalidTemplate(format!(
                    "branch template on task {} has no action_name",
                    parent.id
                )))
            }
        };

        let confidence_score = self.confidence_score.unwrap_or(parent.confidence_score);
        validate_confidence(confidence_score)
            .map_err(|e| SchedulerError::InvalidTemplate(e.to_string()))?;

        let mut dependencies = self.dependencies.clone();
        if self.depends_on_parent && !dependencies.contains(&parent.id) {
            dependencies.push(parent.id);
        }

        let description = self
            .description
            .clone()
            .unwrap_or_else(|| format!("{action_name} (branch of {})", parent.id));

        Ok(TaskSpec {
            id: None,
            description,
            action_name,
            action_params: self.action_params.clone(),
            priority: self.priority.unwrap_or(parent.priority),
            risk_level: self.risk_level.unwrap_or(parent.risk_level),
            confidence_score,
            dependencies,
            conditional_branches: self.conditional_branches.clone(),
            dry_run: self.dry_run,
        })
    }
}
