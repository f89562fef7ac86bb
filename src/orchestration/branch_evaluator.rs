//! # Conditional Branch Evaluator
//!
//! Matches a terminal parent against its branch rules, in declaration
//! order, and instantiates one follow-on task per match. Admission of the
//! produced specs is left to the task graph store.

use crate::models::{BranchCondition, ConditionalBranch, Task, TaskSpec};
use crate::state_machine::TaskStatus;
use serde_json::Value;

/// Result of evaluating one matching branch
#[derive(Debug, Clone, PartialEq)]
pub struct BranchMatch {
    /// Position of the branch in the parent's rule list
    pub branch_index: usize,
    pub condition_type: &'static str,
    /// Instantiated child, or why the template could not be used
    pub spec: Result<TaskSpec, String>,
}

pub struct BranchEvaluator;

impl BranchEvaluator {
    /// Whether `condition` holds for a parent that ended in `status` with `result`
    pub fn matches(
        condition: &BranchCondition,
        status: TaskStatus,
        result: Option<&serde_json::Map<String, Value>>,
    ) -> bool {
        match condition {
            BranchCondition::Success => status == TaskStatus::Completed,
            BranchCondition::Failure => status.poisons_dependents(),
            BranchCondition::ResultEquals {
                comparison_value,
                comparison_key,
            } => {
                if status != TaskStatus::Completed {
                    return false;
                }
                match (result, comparison_key) {
                    (Some(result), Some(key)) => result.get(key) == Some(comparison_value),
                    (Some(result), None) => match comparison_value {
                        Value::Object(expected) => result == expected,
                        _ => false,
                    },
                    (None, _) => false,
                }
            }
            BranchCondition::ResultContains { comparison_key } => {
                status == TaskStatus::Completed
                    && result.is_some_and(|result| result.contains_key(comparison_key))
            }
        }
    }

    /// Evaluate every branch of a terminal parent. Non-terminal parents
    /// yield nothing.
    pub fn evaluate(parent: &Task) -> Vec<BranchMatch> {
        if !parent.status.is_terminal() {
            return Vec::new();
        }

        parent
            .conditional_branches
            .iter()
            .enumerate()
            .filter(|(_, branch)| {
                Self::matches(&branch.condition, parent.status, parent.result.as_ref())
            })
            .map(|(branch_index, branch)| Self::instantiate(parent, branch_index, branch))
            .collect()
    }

    fn instantiate(parent: &Task, branch_index: usize, branch: &ConditionalBranch) -> BranchMatch {
        BranchMatch {
            branch_index,
            condition_type: branch.condition.condition_type(),
            spec: branch
                .next_task_template
                .instantiate(parent)
                .map_err(|e| e.to_string()),
        }
    }
}
