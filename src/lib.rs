#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Tasker Scheduler
//!
//! Priority- and dependency-aware scheduler for opaque, named actions.
//!
//! ## Overview
//!
//! Tasks are admitted into an in-memory dependency graph, dispatched to a
//! bounded worker pool in (priority, submission) order once their
//! dependencies complete, gated on risk and confidence, retried with
//! exponential backoff, and may spawn follow-on tasks through conditional
//! branches when they finish.
//!
//! ## Module Organization
//!
//! - [`models`] - Tasks, submission payloads, branch rules, transition history
//! - [`state_machine`] - Task statuses and the transition table
//! - [`orchestration`] - Task graph store, dispatcher, risk gate, backoff, branches
//! - [`registry`] - Name to action lookup and invocation
//! - [`persistence`] - Execution log and queue snapshots
//! - [`config`] - YAML configuration with environment overrides
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use serde_json::Map;
//! use std::time::Duration;
//! use tasker_scheduler::{ActionRegistry, TaskPriority, TaskScheduler, TaskSpec};
//!
//! # async fn example() -> tasker_scheduler::Result<()> {
//! tasker_scheduler::logging::init_structured_logging();
//!
//! let registry = ActionRegistry::new();
//! registry.register_fn("extract", |_params, _ctx| async { Ok(Map::new()) });
//!
//! let scheduler = TaskScheduler::builder(registry).build()?;
//! scheduler.start()?;
//!
//! let extract = scheduler.submit(
//!     TaskSpec::new("pull rows", "extract").with_priority(TaskPriority::High),
//! )?;
//! scheduler.submit(TaskSpec::new("pull more rows", "extract").with_dependency(extract))?;
//!
//! scheduler.wait_for_completion(Duration::from_secs(30)).await;
//! println!("{:?}", scheduler.get_metrics());
//! scheduler.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod persistence;
pub mod registry;
pub mod state_machine;

pub use config::{ConfigManager, SchedulerConfig};
pub use error::{Result, SchedulerError};
pub use models::{
    BranchCondition, ConditionalBranch, RiskLevel, Task, TaskId, TaskPriority, TaskSpec,
    TaskTemplate, TaskUpdate,
};
pub use orchestration::{SchedulerMetrics, TaskScheduler};
pub use persistence::{ExecutionLog, ExecutionRecord, QueueSnapshot, SnapshotStore};
pub use registry::{Action, ActionContext, ActionError, ActionRegistry};
pub use state_machine::{TaskEvent, TaskStatus};
