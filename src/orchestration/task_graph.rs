//! # Task Graph Store
//!
//! In-memory arena of task records keyed by [`TaskId`] plus reverse
//! dependency edges. It is the single source of truth for admission,
//! readiness and status; [`TaskGraphStore::mark_status`] is the only path
//! that changes a task's status.
//!
//! ## Terminal settlement
//!
//! When a task becomes terminal the store, in the same call:
//! - skips every waiting dependent of a FAILED or SKIPPED task with reason
//!   `dependency_failed`, transitively
//! - unblocks BLOCKED dependents of a COMPLETED task whose dependencies are
//!   now all complete
//! - evaluates the task's conditional branches exactly once and admits the
//!   spawned children
//! - queues one execution record per terminal transition in its outbox
//!
//! The store never locks anything itself; callers wrap it in a mutex.

use crate::constants::reasons;
use crate::error::{Result, SchedulerError};
use crate::models::{Task, TaskId, TaskSpec, TaskTransition, TaskUpdate};
use crate::orchestration::branch_evaluator::BranchEvaluator;
use crate::orchestration::metrics::{SchedulerCounters, SchedulerMetrics, StatusCounts};
use crate::persistence::{BranchErrorRecord, ExecutionRecord, LogEntry};
use crate::state_machine::{TaskEvent, TaskStateMachine, TaskStatus};
use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Side effects of one store operation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionOutcome {
    /// Tasks that reached a terminal status, in settlement order
    pub terminal: Vec<TaskId>,
    /// Dependents skipped because a dependency failed or was skipped
    pub skipped: Vec<TaskId>,
    pub unblocked: Vec<TaskId>,
    /// Tasks admitted by conditional branches
    pub spawned: Vec<TaskId>,
    pub branch_errors: Vec<BranchErrorRecord>,
}

/// Result of admitting a batch of specs
#[derive(Debug, Clone, PartialEq)]
pub struct Admission {
    /// Ids in the order the specs were given
    pub task_ids: Vec<TaskId>,
    pub outcome: TransitionOutcome,
}

#[derive(Debug, Default)]
pub struct TaskGraphStore {
    tasks: HashMap<TaskId, Task>,
    /// Reverse edges: task -> tasks that depend on it
    dependents: HashMap<TaskId, Vec<TaskId>>,
    next_sequence: u64,
    counters: SchedulerCounters,
    outbox: Vec<LogEntry>,
}

impl TaskGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Admission ───────────────────────────────────────────────────

    /// Admit a single task
    pub fn submit(&mut self, spec: TaskSpec) -> Result<TaskId> {
        let admission = self.admit(vec![spec], None)?;
        admission
            .task_ids
            .first()
            .copied()
            .ok_or_else(|| SchedulerError::InvalidState("admission produced no id".to_string()))
    }

    /// Admit several tasks atomically; specs may depend on each other
    /// through caller-assigned ids
    pub fn submit_all(&mut self, specs: Vec<TaskSpec>) -> Result<Vec<TaskId>> {
        Ok(self.admit(specs, None)?.task_ids)
    }

    /// Admit `specs` as one unit. Either every spec is admitted or none is.
    ///
    /// Rejects invalid specs, duplicate ids, unknown dependencies and any
    /// cycle. Tasks whose dependency already FAILED or was SKIPPED are
    /// admitted and skipped immediately.
    pub fn admit(&mut self, specs: Vec<TaskSpec>, parent_id: Option<TaskId>) -> Result<Admission> {
        let (task_ids, newly_terminal) = self.admit_batch(specs, parent_id)?;
        let mut outcome = TransitionOutcome::default();
        self.settle(newly_terminal, &mut outcome);
        Ok(Admission { task_ids, outcome })
    }

    fn admit_batch(
        &mut self,
        specs: Vec<TaskSpec>,
        parent_id: Option<TaskId>,
    ) -> Result<(Vec<TaskId>, Vec<TaskId>)> {
        if specs.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }

        // Validate everything before touching the store
        let mut batch_ids = Vec::with_capacity(specs.len());
        let mut seen = HashSet::with_capacity(specs.len());
        for spec in &specs {
            spec.validate()?;
            let id = spec.id.unwrap_or_default();
            if self.tasks.contains_key(&id) || !seen.insert(id) {
                return Err(SchedulerError::ValidationError(format!(
                    "duplicate task id {id}"
                )));
            }
            batch_ids.push(id);
        }

        for (spec, id) in specs.iter().zip(&batch_ids) {
            for dependency in &spec.dependencies {
                if !self.tasks.contains_key(dependency) && !seen.contains(dependency) {
                    return Err(SchedulerError::UnknownDependency {
                        task_id: *id,
                        dependency: *dependency,
                    });
                }
            }
        }

        // Existing tasks cannot depend on new ones, so any cycle lies
        // entirely inside the batch
        let batch_edges: HashMap<TaskId, Vec<TaskId>> = specs
            .iter()
            .zip(&batch_ids)
            .map(|(spec, id)| {
                let inside: Vec<TaskId> = spec
                    .dependencies
                    .iter()
                    .copied()
                    .filter(|dependency| seen.contains(dependency))
                    .collect();
                (*id, inside)
            })
            .collect();
        let admission_order = topological_order(&batch_ids, &batch_edges)?;

        // Commit
        for (spec, id) in specs.into_iter().zip(&batch_ids) {
            self.next_sequence += 1;
            let task = Task::from_spec(spec, *id, self.next_sequence, parent_id);
            for dependency in &task.dependencies {
                self.dependents.entry(*dependency).or_default().push(*id);
            }
            debug!(
                task_id = %id,
                action_name = %task.action_name,
                priority = %task.priority,
                sequence = task.sequence,
                "📥 TASK_GRAPH: Admitted task"
            );
            self.tasks.insert(*id, task);
        }

        let mut newly_terminal = Vec::new();
        for id in admission_order {
            let Some(task) = self.tasks.get(&id) else {
                continue;
            };
            if task.status != TaskStatus::Pending {
                continue;
            }

            let poisoned = self.any_dependency(task, TaskStatus::poisons_dependents);
            let unmet = !self.all_dependencies_satisfied(task);

            if poisoned {
                self.apply(id, TaskEvent::skip_with_reason(reasons::DEPENDENCY_FAILED))?;
                newly_terminal.push(id);
            } else if unmet {
                self.apply(id, TaskEvent::Block)?;
            }
        }

        Ok((batch_ids, newly_terminal))
    }

    // ── Status mutation ─────────────────────────────────────────────

    /// Apply `event` to a task. The only way a task's status changes.
    ///
    /// Events aimed at a terminal task are ignored. Any other pair the
    /// state machine does not allow is `InvalidTransition`.
    pub fn mark_status(&mut self, task_id: TaskId, event: TaskEvent) -> Result<TransitionOutcome> {
        let mut outcome = TransitionOutcome::default();
        if let Some(status) = self.apply(task_id, event)? {
            if status.is_terminal() {
                self.settle(vec![task_id], &mut outcome);
            }
        }
        Ok(outcome)
    }

    /// Update a DEFERRED task's confidence or risk and return it to PENDING
    pub fn resubmit(&mut self, task_id: TaskId, update: TaskUpdate) -> Result<TransitionOutcome> {
        let task = self
            .tasks
            .get_mut(&task_id)
            .ok_or(SchedulerError::TaskNotFound(task_id))?;

        if task.status != TaskStatus::Deferred {
            return Err(SchedulerError::InvalidState(format!(
                "task {task_id} is {}, only deferred tasks can be resubmitted",
                task.status
            )));
        }
        if let Some(confidence_score) = update.confidence_score {
            crate::models::task::validate_confidence(confidence_score)?;
            task.confidence_score = confidence_score;
        }
        if let Some(risk_level) = update.risk_level {
            task.risk_level = risk_level;
        }

        self.mark_status(task_id, TaskEvent::Requeue)
    }

    /// Return every DEFERRED task to PENDING; returns how many moved
    pub fn reevaluate_deferred(&mut self) -> Result<usize> {
        let mut deferred: Vec<&Task> = self
            .tasks
            .values()
            .filter(|task| task.status == TaskStatus::Deferred)
            .collect();
        deferred.sort_by_key(|task| task.sequence);
        let ids: Vec<TaskId> = deferred.into_iter().map(|task| task.id).collect();

        for id in &ids {
            self.mark_status(*id, TaskEvent::Requeue)?;
        }
        Ok(ids.len())
    }

    /// Single transition with history; no effect on other tasks
    fn apply(&mut self, task_id: TaskId, event: TaskEvent) -> Result<Option<TaskStatus>> {
        let task = self
            .tasks
            .get_mut(&task_id)
            .ok_or(SchedulerError::TaskNotFound(task_id))?;

        if task.status.is_terminal() {
            debug!(
                task_id = %task_id,
                status = %task.status,
                event = event.event_type(),
                "🔒 TASK_GRAPH: Ignoring event for terminal task"
            );
            return Ok(None);
        }

        let from = task.status;
        let to = TaskStateMachine::determine_target_state(task_id, from, &event)?;
        let event_name = event.event_type();
        let reason = event.reason().map(str::to_string);
        let now = Utc::now();

        match event {
            TaskEvent::Start { dry_run } => {
                task.attempt_count += 1;
                task.started_at = Some(now);
                task.completed_at = None;
                task.not_before = None;
                task.retry_at = None;
                task.dry_run = dry_run;
                if dry_run {
                    self.counters.dry_run_executions += 1;
                }
            }
            TaskEvent::Complete { result } => {
                task.result = Some(result);
                task.error = None;
                task.status_reason = None;
                task.completed_at = Some(now);
            }
            TaskEvent::Fail { error } => {
                task.status_reason = Some(error.clone());
                task.error = Some(error);
                task.completed_at = Some(now);
            }
            TaskEvent::ScheduleRetry { error, not_before } => {
                let delay = (not_before - now).to_std().unwrap_or_default();
                task.status_reason = Some(error.clone());
                task.error = Some(error);
                task.completed_at = Some(now);
                task.not_before = Some(not_before);
                task.retry_at = Some(Instant::now() + delay);
                self.counters.retries_scheduled += 1;
            }
            TaskEvent::Defer { reason } => {
                task.status_reason = Some(reason);
            }
            TaskEvent::Requeue => {
                task.status_reason = None;
            }
            TaskEvent::Skip { reason } => {
                task.status_reason = Some(reason.clone());
                task.error = Some(reason);
                task.completed_at = Some(now);
            }
            TaskEvent::Block | TaskEvent::Unblock => {}
        }

        let transition = match task.transitions.last() {
            Some(previous) => TaskTransition::next(previous, to, event_name, reason),
            None => TaskTransition::initial(to),
        };
        task.transitions.push(transition);
        task.status = to;

        debug!(
            task_id = %task_id,
            from = %from,
            to = %to,
            event = event_name,
            attempt = task.attempt_count,
            "🔄 TASK_GRAPH: Transition applied"
        );

        Ok(Some(to))
    }

    /// Propagate the consequences of tasks that just became terminal
    fn settle(&mut self, roots: Vec<TaskId>, outcome: &mut TransitionOutcome) {
        let mut queue: VecDeque<TaskId> = roots.into();

        while let Some(task_id) = queue.pop_front() {
            let Some(task) = self.tasks.get(&task_id) else {
                continue;
            };
            let status = task.status;
            outcome.terminal.push(task_id);
            self.outbox
                .push(LogEntry::Execution(ExecutionRecord::from_task(task)));

            let dependents = self.dependents.get(&task_id).cloned().unwrap_or_default();
            if status.poisons_dependents() {
                for dependent in dependents {
                    let waiting = self.tasks.get(&dependent).is_some_and(|d| {
                        matches!(
                            d.status,
                            TaskStatus::Pending | TaskStatus::Blocked | TaskStatus::Deferred
                        )
                    });
                    if !waiting {
                        continue;
                    }
                    let event = TaskEvent::skip_with_reason(reasons::DEPENDENCY_FAILED);
                    if let Ok(Some(_)) = self.apply(dependent, event) {
                        info!(
                            task_id = %dependent,
                            dependency = %task_id,
                            "⏭️ TASK_GRAPH: Skipped dependent of unsuccessful task"
                        );
                        outcome.skipped.push(dependent);
                        queue.push_back(dependent);
                    }
                }
            } else if status == TaskStatus::Completed {
                for dependent in dependents {
                    let unblock = self.tasks.get(&dependent).is_some_and(|d| {
                        d.status == TaskStatus::Blocked && self.all_dependencies_satisfied(d)
                    });
                    if unblock && matches!(self.apply(dependent, TaskEvent::Unblock), Ok(Some(_)))
                    {
                        outcome.unblocked.push(dependent);
                    }
                }
            }

            queue.extend(self.spawn_branches(task_id, outcome));
        }
    }

    /// Evaluate branches of a terminal task once; returns spawned children
    /// that were themselves skipped at admission and need settling
    fn spawn_branches(&mut self, parent_id: TaskId, outcome: &mut TransitionOutcome) -> Vec<TaskId> {
        let matches = match self.tasks.get_mut(&parent_id) {
            Some(parent) if !parent.branches_evaluated => {
                parent.branches_evaluated = true;
                BranchEvaluator::evaluate(parent)
            }
            _ => return Vec::new(),
        };

        let mut to_settle = Vec::new();
        for branch in matches {
            let admitted = match branch.spec {
                Ok(spec) => self
                    .admit_batch(vec![spec], Some(parent_id))
                    .map_err(|e| e.to_string()),
                Err(message) => Err(message),
            };

            match admitted {
                Ok((ids, newly_terminal)) => {
                    self.counters.branches_spawned += ids.len() as u64;
                    for child in &ids {
                        info!(
                            parent_id = %parent_id,
                            task_id = %child,
                            condition_type = branch.condition_type,
                            "🌿 TASK_GRAPH: Branch spawned task"
                        );
                    }
                    outcome.spawned.extend(ids);
                    to_settle.extend(newly_terminal);
                }
                Err(error) => {
                    warn!(
                        parent_id = %parent_id,
                        branch_index = branch.branch_index,
                        error = %error,
                        "🌿 TASK_GRAPH: Dropped branch that failed to instantiate"
                    );
                    self.counters.branch_errors += 1;
                    let record = BranchErrorRecord {
                        parent_id,
                        branch_index: branch.branch_index,
                        condition_type: branch.condition_type.to_string(),
                        error,
                        recorded_at: Utc::now(),
                    };
                    self.outbox.push(LogEntry::BranchError(record.clone()));
                    outcome.branch_errors.push(record);
                }
            }
        }
        to_settle
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub fn get(&self, task_id: TaskId) -> Option<&Task> {
        self.tasks.get(&task_id)
    }

    pub fn task(&self, task_id: TaskId) -> Result<Task> {
        self.get(task_id)
            .cloned()
            .ok_or(SchedulerError::TaskNotFound(task_id))
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// All tasks in submission order
    pub fn tasks_in_order(&self) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self.tasks.values().collect();
        tasks.sort_by_key(|task| task.sequence);
        tasks
    }

    pub fn dependents_of(&self, task_id: TaskId) -> &[TaskId] {
        self.dependents
            .get(&task_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// PENDING/BLOCKED tasks whose dependencies all COMPLETED, ordered by
    /// (priority, submission order)
    pub fn ready_tasks(&self) -> Vec<TaskId> {
        self.ready_tasks_at(Instant::now())
    }

    /// Ready tasks at `now`; tasks still backing off are left out
    pub fn ready_tasks_at(&self, now: Instant) -> Vec<TaskId> {
        let mut ready: Vec<&Task> = self
            .tasks
            .values()
            .filter(|task| self.is_ready(task, now))
            .collect();
        ready.sort_by_key(|task| (task.priority, task.sequence));
        ready.into_iter().map(|task| task.id).collect()
    }

    /// Highest-priority ready task at `now`
    pub fn next_ready(&self, now: Instant) -> Option<TaskId> {
        self.tasks
            .values()
            .filter(|task| self.is_ready(task, now))
            .min_by_key(|task| (task.priority, task.sequence))
            .map(|task| task.id)
    }

    /// Earliest future moment a backing-off task becomes eligible
    pub fn next_retry_at(&self) -> Option<Instant> {
        let now = Instant::now();
        self.tasks
            .values()
            .filter(|task| task.status.is_dispatchable())
            .filter_map(|task| task.retry_at)
            .filter(|retry_at| *retry_at > now)
            .min()
    }

    pub fn status_counts(&self) -> StatusCounts {
        SchedulerMetrics::collect(self.tasks.values(), self.counters).status_counts
    }

    /// Number of PENDING, BLOCKED and IN_PROGRESS tasks
    pub fn outstanding_count(&self) -> usize {
        self.tasks
            .values()
            .filter(|task| task.status.is_outstanding())
            .count()
    }

    pub fn in_progress_count(&self) -> usize {
        self.tasks
            .values()
            .filter(|task| task.status.is_active())
            .count()
    }

    pub fn counters(&self) -> SchedulerCounters {
        self.counters
    }

    pub fn metrics(&self) -> SchedulerMetrics {
        SchedulerMetrics::collect(self.tasks.values(), self.counters)
    }

    /// Drain execution log entries queued by terminal transitions and
    /// branch failures
    pub fn take_log_entries(&mut self) -> Vec<LogEntry> {
        std::mem::take(&mut self.outbox)
    }

    fn is_ready(&self, task: &Task, now: Instant) -> bool {
        task.status.is_dispatchable()
            && !task.is_backing_off(now)
            && self.all_dependencies_satisfied(task)
    }

    fn all_dependencies_satisfied(&self, task: &Task) -> bool {
        task.dependencies.iter().all(|dependency| {
            self.tasks
                .get(dependency)
                .is_some_and(|d| d.status.satisfies_dependencies())
        })
    }

    fn any_dependency(&self, task: &Task, predicate: impl Fn(&TaskStatus) -> bool) -> bool {
        task.dependencies.iter().any(|dependency| {
            self.tasks
                .get(dependency)
                .is_some_and(|d| predicate(&d.status))
        })
    }
}

/// Dependencies-first order of `ids`, or the first cycle found
fn topological_order(
    ids: &[TaskId],
    edges: &HashMap<TaskId, Vec<TaskId>>,
) -> Result<Vec<TaskId>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    let mut marks: HashMap<TaskId, Mark> = HashMap::with_capacity(ids.len());
    let mut order = Vec::with_capacity(ids.len());

    for &root in ids {
        if marks.contains_key(&root) {
            continue;
        }

        // Iterative DFS; `path` mirrors the gray nodes on the stack
        let mut stack: Vec<(TaskId, usize)> = vec![(root, 0)];
        let mut path: Vec<TaskId> = vec![root];
        marks.insert(root, Mark::Visiting);

        while let Some((node, next_edge)) = stack.last().copied() {
            let children = edges.get(&node).map(Vec::as_slice).unwrap_or(&[]);
            if let Some(&child) = children.get(next_edge) {
                if let Some(frame) = stack.last_mut() {
                    frame.1 += 1;
                }
                match marks.get(&child) {
                    Some(Mark::Visiting) => {
                        let start = path.iter().position(|id| *id == child).unwrap_or(0);
                        let mut cycle = path[start..].to_vec();
                        cycle.push(child);
                        return Err(SchedulerError::CycleDetected {
                            task_id: child,
                            path: cycle,
                        });
                    }
                    Some(Mark::Done) => {}
                    None => {
                        marks.insert(child, Mark::Visiting);
                        stack.push((child, 0));
                        path.push(child);
                    }
                }
            } else {
                stack.pop();
                path.pop();
                marks.insert(node, Mark::Done);
                order.push(node);
            }
        }
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConditionalBranch, RiskLevel, TaskPriority, TaskTemplate};
    use serde_json::{json, Map};
    use std::time::Duration;

    fn spec(action: &str) -> TaskSpec {
        TaskSpec::new(action, action)
    }

    fn start(store: &mut TaskGraphStore, id: TaskId) {
        store
            .mark_status(id, TaskEvent::Start { dry_run: false })
            .unwrap();
    }

    fn complete(store: &mut TaskGraphStore, id: TaskId) -> TransitionOutcome {
        start(store, id);
        store
            .mark_status(id, TaskEvent::Complete { result: Map::new() })
            .unwrap()
    }

    fn fail(store: &mut TaskGraphStore, id: TaskId) -> TransitionOutcome {
        start(store, id);
        store
            .mark_status(id, TaskEvent::fail_with_error("boom"))
            .unwrap()
    }

    #[test]
    fn test_unknown_dependency_is_rejected() {
        let mut store = TaskGraphStore::new();
        let ghost = TaskId::new();
        let err = store.submit(spec("a").with_dependency(ghost)).unwrap_err();
        assert!(matches!(err, SchedulerError::UnknownDependency { dependency, .. } if dependency == ghost));
        assert!(store.is_empty());
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let mut store = TaskGraphStore::new();
        let id = TaskId::new();
        let err = store
            .submit(spec("a").with_id(id).with_dependency(id))
            .unwrap_err();
        assert!(matches!(err, SchedulerError::CycleDetected { path, .. } if path == vec![id, id]));
        assert!(store.is_empty());
    }

    #[test]
    fn test_batch_cycle_admits_nothing() {
        let mut store = TaskGraphStore::new();
        let existing = store.submit(spec("root")).unwrap();
        let (a, b, c) = (TaskId::new(), TaskId::new(), TaskId::new());

        let err = store
            .submit_all(vec![
                spec("a").with_id(a).with_dependencies([existing, c]),
                spec("b").with_id(b).with_dependency(a),
                spec("c").with_id(c).with_dependency(b),
            ])
            .unwrap_err();

        match err {
            SchedulerError::CycleDetected { path, .. } => {
                assert_eq!(path.first(), path.last());
                assert_eq!(path.len(), 4);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
        assert_eq!(store.len(), 1);
        assert!(store.dependents_of(existing).is_empty());
    }

    #[test]
    fn test_batch_with_forward_references_is_admitted() {
        let mut store = TaskGraphStore::new();
        let (a, b) = (TaskId::new(), TaskId::new());
        let ids = store
            .submit_all(vec![
                spec("b").with_id(b).with_dependency(a),
                spec("a").with_id(a),
            ])
            .unwrap();
        assert_eq!(ids, vec![b, a]);
        assert_eq!(store.get(b).unwrap().status, TaskStatus::Blocked);
        assert_eq!(store.ready_tasks(), vec![a]);
    }

    #[test]
    fn test_nested_malformed_template_is_rejected_at_submission() {
        let mut store = TaskGraphStore::new();
        let grandchild = ConditionalBranch::on_success(
            TaskTemplate::for_action("notify").with_risk(RiskLevel::Medium, -0.5),
        );
        let parent = spec("extract").with_branch(ConditionalBranch::on_success(
            TaskTemplate::for_action("load").with_branch(grandchild),
        ));

        assert!(matches!(
            store.submit(parent),
            Err(SchedulerError::InvalidTemplate(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let mut store = TaskGraphStore::new();
        let id = store.submit(spec("a")).unwrap();
        assert!(matches!(
            store.submit(spec("again").with_id(id)),
            Err(SchedulerError::ValidationError(_))
        ));
    }

    #[test]
    fn test_ready_order_is_priority_then_submission() {
        let mut store = TaskGraphStore::new();
        let low = store
            .submit(spec("low").with_priority(TaskPriority::Background))
            .unwrap();
        let first_high = store
            .submit(spec("high-1").with_priority(TaskPriority::High))
            .unwrap();
        let critical = store
            .submit(spec("critical").with_priority(TaskPriority::Critical))
            .unwrap();
        let second_high = store
            .submit(spec("high-2").with_priority(TaskPriority::High))
            .unwrap();

        assert_eq!(
            store.ready_tasks(),
            vec![critical, first_high, second_high, low]
        );
        assert_eq!(store.next_ready(Instant::now()), Some(critical));
    }

    #[test]
    fn test_dependents_block_until_dependencies_complete() {
        let mut store = TaskGraphStore::new();
        let a = store.submit(spec("a")).unwrap();
        let b = store.submit(spec("b").with_dependency(a)).unwrap();
        assert_eq!(store.get(b).unwrap().status, TaskStatus::Blocked);
        assert_eq!(store.ready_tasks(), vec![a]);

        let outcome = complete(&mut store, a);
        assert_eq!(outcome.unblocked, vec![b]);
        assert_eq!(store.get(b).unwrap().status, TaskStatus::Pending);
        assert_eq!(store.ready_tasks(), vec![b]);
    }

    #[test]
    fn test_failure_cascades_skips() {
        let mut store = TaskGraphStore::new();
        let a = store.submit(spec("a")).unwrap();
        let b = store.submit(spec("b").with_dependency(a)).unwrap();
        let c = store.submit(spec("c").with_dependency(b)).unwrap();
        let unrelated = store.submit(spec("d")).unwrap();

        let outcome = fail(&mut store, a);
        assert_eq!(outcome.skipped, vec![b, c]);
        assert_eq!(outcome.terminal, vec![a, b, c]);
        for id in [b, c] {
            let task = store.get(id).unwrap();
            assert_eq!(task.status, TaskStatus::Skipped);
            assert_eq!(task.status_reason.as_deref(), Some(reasons::DEPENDENCY_FAILED));
            assert_eq!(task.attempt_count, 0);
        }
        assert_eq!(store.get(unrelated).unwrap().status, TaskStatus::Pending);
        assert_eq!(store.take_log_entries().len(), 3);
    }

    #[test]
    fn test_submission_after_dependency_failed_is_skipped() {
        let mut store = TaskGraphStore::new();
        let a = store.submit(spec("a")).unwrap();
        fail(&mut store, a);

        let admission = store
            .admit(vec![spec("late").with_dependency(a)], None)
            .unwrap();
        let late = admission.task_ids[0];
        assert_eq!(admission.outcome.terminal, vec![late]);
        assert_eq!(store.get(late).unwrap().status, TaskStatus::Skipped);
    }

    #[test]
    fn test_terminal_status_is_idempotent() {
        let mut store = TaskGraphStore::new();
        let a = store.submit(spec("a")).unwrap();
        complete(&mut store, a);
        let history = store.get(a).unwrap().transitions.len();

        let outcome = store
            .mark_status(a, TaskEvent::fail_with_error("late failure"))
            .unwrap();
        assert_eq!(outcome, TransitionOutcome::default());
        let task = store.get(a).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.transitions.len(), history);
        assert!(task.error.is_none());
    }

    #[test]
    fn test_invalid_transition_is_rejected() {
        let mut store = TaskGraphStore::new();
        let a = store.submit(spec("a")).unwrap();
        let err = store
            .mark_status(a, TaskEvent::Complete { result: Map::new() })
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidTransition { from: TaskStatus::Pending, .. }));
    }

    #[test]
    fn test_history_is_append_only() {
        let mut store = TaskGraphStore::new();
        let a = store.submit(spec("a")).unwrap();
        complete(&mut store, a);

        let task = store.get(a).unwrap();
        let keys: Vec<u32> = task.transitions.iter().map(|t| t.sort_key).collect();
        assert_eq!(keys, vec![1, 2, 3]);
        assert_eq!(task.current_transition().unwrap().to_state, TaskStatus::Completed);
        assert_eq!(task.transitions[1].event, "start");
    }

    #[test]
    fn test_retry_hides_task_until_backoff_elapses() {
        let mut store = TaskGraphStore::new();
        let a = store.submit(spec("a")).unwrap();
        start(&mut store, a);
        store
            .mark_status(
                a,
                TaskEvent::ScheduleRetry {
                    error: "flaky".into(),
                    not_before: Utc::now() + chrono::Duration::seconds(2),
                },
            )
            .unwrap();

        let task = store.get(a).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.attempt_count, 1);
        assert!(store.ready_tasks().is_empty());

        let retry_at = store.next_retry_at().unwrap();
        assert!(store
            .ready_tasks_at(retry_at + Duration::from_millis(1))
            .contains(&a));
        assert_eq!(store.counters().retries_scheduled, 1);
    }

    #[test]
    fn test_branches_evaluate_exactly_once() {
        let mut store = TaskGraphStore::new();
        let parent = store
            .submit(
                spec("parent")
                    .with_priority(TaskPriority::High)
                    .with_branch(ConditionalBranch::on_success(TaskTemplate::for_action(
                        "child",
                    )))
                    .with_branch(ConditionalBranch::on_failure(TaskTemplate::for_action(
                        "alert",
                    ))),
            )
            .unwrap();

        let outcome = complete(&mut store, parent);
        assert_eq!(outcome.spawned.len(), 1);
        let child = store.get(outcome.spawned[0]).unwrap();
        assert_eq!(child.action_name, "child");
        assert_eq!(child.parent_id, Some(parent));
        assert_eq!(child.priority, TaskPriority::High);
        assert!(child.dependencies.is_empty());
        assert_ne!(child.id, parent);
        assert!(store.get(parent).unwrap().branches_evaluated);

        store
            .mark_status(parent, TaskEvent::Complete { result: Map::new() })
            .unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.counters().branches_spawned, 1);
    }

    #[test]
    fn test_skipped_task_fires_failure_branches() {
        let mut store = TaskGraphStore::new();
        let a = store.submit(spec("a")).unwrap();
        let b = store
            .submit(
                spec("b")
                    .with_dependency(a)
                    .with_branch(ConditionalBranch::on_failure(TaskTemplate::for_action(
                        "cleanup",
                    )))
                    .with_branch(ConditionalBranch::on_success(TaskTemplate::for_action(
                        "never",
                    ))),
            )
            .unwrap();

        let outcome = fail(&mut store, a);
        assert_eq!(outcome.skipped, vec![b]);
        assert_eq!(outcome.spawned.len(), 1);
        assert_eq!(store.get(outcome.spawned[0]).unwrap().action_name, "cleanup");
    }

    #[test]
    fn test_bad_branch_template_is_recorded_and_dropped() {
        let mut store = TaskGraphStore::new();
        let parent = store
            .submit(
                spec("parent")
                    .with_branch(ConditionalBranch::on_success(TaskTemplate::default()))
                    .with_branch(ConditionalBranch::when_result_field_equals(
                        "status",
                        json!("ok"),
                        TaskTemplate::for_action("notify"),
                    )),
            )
            .unwrap();

        start(&mut store, parent);
        let mut result = Map::new();
        result.insert("status".into(), json!("ok"));
        let outcome = store
            .mark_status(parent, TaskEvent::Complete { result })
            .unwrap();

        assert_eq!(outcome.branch_errors.len(), 1);
        assert_eq!(outcome.branch_errors[0].branch_index, 0);
        assert_eq!(outcome.spawned.len(), 1);
        assert_eq!(store.counters().branch_errors, 1);

        let entries = store.take_log_entries();
        assert!(entries
            .iter()
            .any(|entry| matches!(entry, LogEntry::BranchError(_))));
    }

    #[test]
    fn test_resubmit_and_reevaluate_deferred() {
        let mut store = TaskGraphStore::new();
        let a = store
            .submit(spec("risky").with_risk(RiskLevel::High, 0.4))
            .unwrap();
        let b = store
            .submit(spec("risky-too").with_risk(RiskLevel::High, 0.3))
            .unwrap();
        for id in [a, b] {
            store
                .mark_status(
                    id,
                    TaskEvent::Defer {
                        reason: "low confidence".into(),
                    },
                )
                .unwrap();
        }
        assert!(store.ready_tasks().is_empty());

        store.resubmit(a, TaskUpdate::confidence(0.9)).unwrap();
        let task = store.get(a).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.confidence_score, 0.9);

        assert!(matches!(
            store.resubmit(a, TaskUpdate::confidence(0.95)),
            Err(SchedulerError::InvalidState(_))
        ));
        assert!(store.resubmit(b, TaskUpdate::confidence(4.0)).is_err());

        assert_eq!(store.reevaluate_deferred().unwrap(), 1);
        assert_eq!(store.get(b).unwrap().status, TaskStatus::Pending);
    }

    #[test]
    fn test_metrics_reflect_store() {
        let mut store = TaskGraphStore::new();
        let a = store.submit(spec("a")).unwrap();
        let b = store.submit(spec("b")).unwrap();
        complete(&mut store, a);
        fail(&mut store, b);

        let metrics = store.metrics();
        assert_eq!(metrics.total_tasks, 2);
        assert_eq!(metrics.total_attempts, 2);
        assert_eq!(metrics.success_rate, 0.5);
        assert_eq!(store.outstanding_count(), 0);
        assert_eq!(store.status_counts().failed, 1);
    }
}
