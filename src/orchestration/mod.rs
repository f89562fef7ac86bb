//! # Orchestration Engine
//!
//! Scheduling core: the task graph store, the dispatch engine that drives
//! it, and the pure decision components consulted along the way.
//!
//! ## Core Components
//!
//! - **TaskGraphStore**: task arena, dependency edges, admission and the
//!   single status mutation path
//! - **TaskScheduler**: dispatch loop plus bounded worker pool
//! - **RiskGate**: approve live, approve dry-run, or defer
//! - **BackoffCalculator**: retry or give up after a failed attempt
//! - **BranchEvaluator**: conditional follow-on tasks for terminal parents
//! - **SchedulerMetrics**: aggregate counts over the store

pub mod backoff_calculator;
pub mod branch_evaluator;
pub mod dispatcher;
pub mod metrics;
pub mod risk_gate;
pub mod task_graph;

pub use backoff_calculator::{BackoffCalculator, RetryDecision};
pub use branch_evaluator::{BranchEvaluator, BranchMatch};
pub use dispatcher::{SchedulerBuilder, TaskScheduler};
pub use metrics::{SchedulerCounters, SchedulerMetrics, StatusCounts};
pub use risk_gate::{GateDecision, RiskGate};
pub use task_graph::{Admission, TaskGraphStore, TransitionOutcome};
