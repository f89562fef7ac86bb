//! # Models
//!
//! Data carried through the scheduler: tasks, their submission payloads,
//! conditional branch rules, and the append-only transition history.

pub mod conditional_branch;
pub mod task;
pub mod task_transition;

pub use conditional_branch::{BranchCondition, ConditionalBranch, TaskTemplate};
pub use task::{
    ActionParams, ActionResult, RiskLevel, Task, TaskId, TaskPriority, TaskSpec, TaskUpdate,
};
pub use task_transition::TaskTransition;
