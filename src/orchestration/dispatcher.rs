//! # Dispatch Engine
//!
//! [`TaskScheduler`] owns the task graph store behind a single mutex and
//! runs one dispatch loop that hands ready tasks to a bounded set of
//! workers.
//!
//! ## Loop
//!
//! 1. Register interest in the next state change.
//! 2. While a worker permit is free, claim the next ready task under the
//!    lock: the risk gate either defers it or it moves to IN_PROGRESS.
//! 3. Spawn a worker per claim. The lock is released while the action runs.
//! 4. Sleep until a status change or the earliest retry backoff expires.
//!
//! Workers record the outcome under the lock, write execution log entries
//! outside it, release their permit and wake everyone waiting on a state
//! change. Retries are scheduled re-admissions, so no worker ever sleeps
//! through a backoff.

use crate::config::SchedulerConfig;
use crate::constants::{events, system};
use crate::error::{Result, SchedulerError};
use crate::logging::{log_error, log_scheduler_operation, log_task_operation};
use crate::models::{ActionParams, ActionResult, Task, TaskId, TaskSpec, TaskUpdate};
use crate::orchestration::backoff_calculator::{BackoffCalculator, RetryDecision};
use crate::orchestration::metrics::SchedulerMetrics;
use crate::orchestration::risk_gate::{GateDecision, RiskGate};
use crate::orchestration::task_graph::{TaskGraphStore, TransitionOutcome};
use crate::persistence::{
    ExecutionLog, FileSnapshotStore, InMemoryExecutionLog, JsonlExecutionLog, LogEntry,
    QueueSnapshot, SnapshotStore,
};
use crate::registry::{ActionContext, ActionError, ActionRegistry};
use crate::state_machine::{TaskEvent, TaskStatus};
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Builder for [`TaskScheduler`]
///
/// Without an explicit sink, execution records go to daily JSONL files when
/// `persistence.execution_log_dir` is set, otherwise to an in-memory log
/// that keeps the newest `DEFAULT_IN_MEMORY_LOG_CAPACITY` entries.
pub struct SchedulerBuilder {
    registry: ActionRegistry,
    config: SchedulerConfig,
    execution_log: Option<Arc<dyn ExecutionLog>>,
    snapshot_store: Option<Arc<dyn SnapshotStore>>,
}

impl SchedulerBuilder {
    pub fn new(registry: ActionRegistry) -> Self {
        Self {
            registry,
            config: SchedulerConfig::default(),
            execution_log: None,
            snapshot_store: None,
        }
    }

    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the sink chosen from `persistence.execution_log_dir`
    pub fn execution_log(mut self, execution_log: Arc<dyn ExecutionLog>) -> Self {
        self.execution_log = Some(execution_log);
        self
    }

    /// Override the store chosen from `persistence.snapshot_path`
    pub fn snapshot_store(mut self, snapshot_store: Arc<dyn SnapshotStore>) -> Self {
        self.snapshot_store = Some(snapshot_store);
        self
    }

    pub fn build(self) -> Result<TaskScheduler> {
        self.config.validate()?;

        let execution_log: Arc<dyn ExecutionLog> = match self.execution_log {
            Some(log) => log,
            None => match &self.config.persistence.execution_log_dir {
                Some(dir) => Arc::new(JsonlExecutionLog::new(dir)?),
                None => Arc::new(InMemoryExecutionLog::bounded(
                    system::DEFAULT_IN_MEMORY_LOG_CAPACITY,
                )),
            },
        };

        let snapshot_store: Option<Arc<dyn SnapshotStore>> = match self.snapshot_store {
            Some(store) => Some(store),
            None => self
                .config
                .persistence
                .snapshot_path
                .as_ref()
                .map(|path| Arc::new(FileSnapshotStore::new(path)) as Arc<dyn SnapshotStore>),
        };

        let max_concurrent = self.config.execution.max_concurrent_tasks;
        let shared = SchedulerShared {
            store: Mutex::new(TaskGraphStore::new()),
            registry: self.registry,
            gate: RiskGate::new(self.config.risk.clone()),
            backoff: BackoffCalculator::new(self.config.backoff.clone()),
            config: self.config,
            state_changed: Notify::new(),
            permits: Arc::new(Semaphore::new(max_concurrent)),
            accepting: AtomicBool::new(true),
            running: AtomicBool::new(false),
            execution_log,
            snapshot_store,
        };

        let id = Uuid::new_v4();
        info!(
            scheduler_id = %id,
            max_concurrent_tasks = max_concurrent,
            "🏗️ SCHEDULER: Created task scheduler"
        );

        Ok(TaskScheduler {
            id,
            shared: Arc::new(shared),
            dispatch_handle: Mutex::new(None),
            snapshot_handle: Mutex::new(None),
        })
    }
}

/// A task handed to a worker
#[derive(Debug, Clone)]
struct Claim {
    task_id: TaskId,
    action_name: String,
    params: ActionParams,
    attempt: u32,
    dry_run: bool,
}

/// State shared between the public handle, the dispatch loop and workers
struct SchedulerShared {
    store: Mutex<TaskGraphStore>,
    registry: ActionRegistry,
    config: SchedulerConfig,
    gate: RiskGate,
    backoff: BackoffCalculator,
    /// Signaled on every status change
    state_changed: Notify,
    /// One permit per worker slot
    permits: Arc<Semaphore>,
    accepting: AtomicBool,
    running: AtomicBool,
    execution_log: Arc<dyn ExecutionLog>,
    snapshot_store: Option<Arc<dyn SnapshotStore>>,
}

impl SchedulerShared {
    fn admit(&self, specs: Vec<TaskSpec>) -> Result<Vec<TaskId>> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(SchedulerError::AdmissionClosed);
        }

        let (task_ids, entries) = {
            let mut store = self.store.lock();
            let admission = store.admit(specs, None)?;
            for id in &admission.task_ids {
                if let Some(task) = store.get(*id) {
                    log_task_operation(
                        events::TASK_SUBMITTED,
                        Some(*id),
                        Some(&task.action_name),
                        &task.status.to_string(),
                        None,
                    );
                }
            }
            log_outcome(&store, &admission.outcome);
            (admission.task_ids, store.take_log_entries())
        };

        self.write_log(entries);
        self.state_changed.notify_waiters();
        Ok(task_ids)
    }

    /// Pick the next ready task that clears the risk gate and mark it
    /// IN_PROGRESS. Tasks the gate refuses are deferred on the way.
    fn claim_next(&self) -> Option<Claim> {
        let mut store = self.store.lock();
        let now = Instant::now();

        while let Some(task_id) = store.next_ready(now) {
            let task = store.get(task_id)?;
            let action_name = task.action_name.clone();

            match self.gate.evaluate_task(task) {
                GateDecision::Defer { reason } => {
                    if let Err(e) = store.mark_status(
                        task_id,
                        TaskEvent::Defer {
                            reason: reason.clone(),
                        },
                    ) {
                        log_error("dispatcher", "defer", &e.to_string(), None);
                        return None;
                    }
                    log_task_operation(
                        events::TASK_DEFERRED,
                        Some(task_id),
                        Some(&action_name),
                        "deferred",
                        Some(&reason),
                    );
                    // Deferred tasks no longer count as outstanding
                    self.state_changed.notify_waiters();
                }
                decision => {
                    let dry_run = decision.is_dry_run();
                    if let Err(e) = store.mark_status(task_id, TaskEvent::Start { dry_run }) {
                        log_error("dispatcher", "start", &e.to_string(), None);
                        return None;
                    }
                    let task = store.get(task_id)?;
                    log_task_operation(
                        events::TASK_DISPATCHED,
                        Some(task_id),
                        Some(&action_name),
                        "in_progress",
                        Some(&format!(
                            "attempt={} dry_run={dry_run}",
                            task.attempt_count
                        )),
                    );
                    return Some(Claim {
                        task_id,
                        action_name,
                        params: task.action_params.clone(),
                        attempt: task.attempt_count,
                        dry_run,
                    });
                }
            }
        }
        None
    }

    /// Turn an action outcome into a transition and collect log entries
    fn record_outcome(
        &self,
        claim: &Claim,
        outcome: std::result::Result<ActionResult, ActionError>,
    ) -> Vec<LogEntry> {
        let mut store = self.store.lock();

        let event = match outcome {
            Ok(result) => TaskEvent::Complete { result },
            Err(error) => match self.backoff.decide(claim.attempt) {
                RetryDecision::Retry {
                    delay,
                    next_attempt,
                } => {
                    let not_before = Utc::now()
                        + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
                    log_task_operation(
                        events::TASK_RETRY_SCHEDULED,
                        Some(claim.task_id),
                        Some(&claim.action_name),
                        "pending",
                        Some(&format!(
                            "attempt {next_attempt} in {}ms after: {error}",
                            delay.as_millis()
                        )),
                    );
                    TaskEvent::ScheduleRetry {
                        error: error.to_string(),
                        not_before,
                    }
                }
                RetryDecision::Exhausted { attempts } => {
                    warn!(
                        task_id = %claim.task_id,
                        action_name = %claim.action_name,
                        attempts = attempts,
                        error = %error,
                        "⚠️ SCHEDULER: Attempts exhausted"
                    );
                    TaskEvent::fail_with_error(error.to_string())
                }
            },
        };

        match store.mark_status(claim.task_id, event) {
            Ok(outcome) => log_outcome(&store, &outcome),
            Err(e) => log_error(
                "dispatcher",
                "record_outcome",
                &e.to_string(),
                Some(&claim.task_id.to_string()),
            ),
        }
        store.take_log_entries()
    }

    /// Best-effort append; sink failures never affect scheduling
    fn write_log(&self, entries: Vec<LogEntry>) {
        for entry in entries {
            if let Err(e) = self.execution_log.append(&entry) {
                log_error("execution_log", "append", &e.to_string(), None);
            }
        }
    }

    fn queue_snapshot(&self) -> QueueSnapshot {
        let store = self.store.lock();
        QueueSnapshot {
            taken_at: Utc::now(),
            tasks: store.tasks_in_order().into_iter().cloned().collect(),
            ready_queue: store.ready_tasks(),
            in_flight: store.in_progress_count(),
            metrics: store.metrics(),
        }
    }

    fn write_snapshot(&self, store: &dyn SnapshotStore) -> Result<QueueSnapshot> {
        let snapshot = self.queue_snapshot();
        store.save(&snapshot)?;
        log_scheduler_operation(
            events::SNAPSHOT_WRITTEN,
            "ok",
            Some(&format!("tasks={}", snapshot.tasks.len())),
        );
        Ok(snapshot)
    }
}

/// Structured log lines for everything a store operation set in motion
fn log_outcome(store: &TaskGraphStore, outcome: &TransitionOutcome) {
    let action_of = |id: &TaskId| store.get(*id).map(|task| task.action_name.as_str());

    for id in &outcome.terminal {
        let Some(task) = store.get(*id) else {
            continue;
        };
        let operation = match task.status {
            TaskStatus::Completed => events::TASK_COMPLETED,
            TaskStatus::Failed => events::TASK_FAILED,
            _ => events::TASK_SKIPPED,
        };
        log_task_operation(
            operation,
            Some(*id),
            Some(&task.action_name),
            &task.status.to_string(),
            task.status_reason.as_deref(),
        );
    }
    for id in &outcome.spawned {
        let parent = store.get(*id).and_then(|task| task.parent_id);
        log_task_operation(
            events::BRANCH_SPAWNED,
            Some(*id),
            action_of(id),
            "spawned",
            parent.map(|p| format!("parent={p}")).as_deref(),
        );
    }
    for record in &outcome.branch_errors {
        log_task_operation(
            events::BRANCH_FAILED,
            Some(record.parent_id),
            action_of(&record.parent_id),
            "dropped",
            Some(&record.error),
        );
    }
}

async fn dispatch_loop(shared: Arc<SchedulerShared>) {
    debug!("🔄 SCHEDULER: Dispatch loop started");

    loop {
        let notified = shared.state_changed.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if !shared.running.load(Ordering::SeqCst) {
            break;
        }

        while let Ok(permit) = Arc::clone(&shared.permits).try_acquire_owned() {
            match shared.claim_next() {
                Some(claim) => {
                    tokio::spawn(run_worker(Arc::clone(&shared), claim, permit));
                }
                None => break,
            }
        }

        let next_retry = shared.store.lock().next_retry_at();
        match next_retry {
            Some(retry_at) => {
                tokio::select! {
                    _ = notified.as_mut() => {}
                    _ = tokio::time::sleep_until(retry_at) => {}
                }
            }
            None => notified.await,
        }
    }

    debug!("🛑 SCHEDULER: Dispatch loop exited");
}

async fn run_worker(shared: Arc<SchedulerShared>, claim: Claim, permit: OwnedSemaphorePermit) {
    let ctx = ActionContext::new(claim.task_id, claim.attempt, claim.dry_run);
    let outcome = shared
        .registry
        .invoke(
            &claim.action_name,
            &claim.params,
            &ctx,
            shared.config.action_timeout(),
        )
        .await;

    let entries = shared.record_outcome(&claim, outcome);
    shared.write_log(entries);

    drop(permit);
    shared.state_changed.notify_waiters();
}

async fn snapshot_loop(shared: Arc<SchedulerShared>, store: Arc<dyn SnapshotStore>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if !shared.running.load(Ordering::SeqCst) {
            break;
        }
        if let Err(e) = shared.write_snapshot(store.as_ref()) {
            log_error("snapshot", "periodic", &e.to_string(), None);
        }
    }
}

/// Priority- and dependency-aware scheduler with risk gating, retry backoff
/// and conditional branching.
///
/// ```rust,no_run
/// use serde_json::Map;
/// use std::time::Duration;
/// use tasker_scheduler::models::TaskSpec;
/// use tasker_scheduler::orchestration::TaskScheduler;
/// use tasker_scheduler::registry::ActionRegistry;
///
/// # async fn example() -> tasker_scheduler::error::Result<()> {
/// let registry = ActionRegistry::new();
/// registry.register_fn("fetch", |_params, _ctx| async { Ok(Map::new()) });
///
/// let scheduler = TaskScheduler::builder(registry).build()?;
/// scheduler.start()?;
/// let id = scheduler.submit(TaskSpec::new("fetch the page", "fetch"))?;
/// scheduler.wait_for_completion(Duration::from_secs(5)).await;
/// println!("{}", scheduler.get_status(id)?.status);
/// scheduler.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct TaskScheduler {
    id: Uuid,
    shared: Arc<SchedulerShared>,
    dispatch_handle: Mutex<Option<JoinHandle<()>>>,
    snapshot_handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("id", &self.id)
            .field("running", &self.is_running())
            .field("accepting", &self.is_accepting())
            .finish()
    }
}

impl TaskScheduler {
    pub fn new(registry: ActionRegistry, config: SchedulerConfig) -> Result<Self> {
        SchedulerBuilder::new(registry).config(config).build()
    }

    pub fn builder(registry: ActionRegistry) -> SchedulerBuilder {
        SchedulerBuilder::new(registry)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.shared.registry
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    pub fn execution_log(&self) -> Arc<dyn ExecutionLog> {
        Arc::clone(&self.shared.execution_log)
    }

    // ── Submission ──────────────────────────────────────────────────

    /// Admit one task. Errors are synchronous: cycle, unknown dependency,
    /// invalid spec or closed admission.
    pub fn submit(&self, spec: TaskSpec) -> Result<TaskId> {
        self.shared
            .admit(vec![spec])?
            .into_iter()
            .next()
            .ok_or_else(|| SchedulerError::InvalidState("admission produced no id".to_string()))
    }

    /// Admit several tasks atomically
    pub fn submit_all(&self, specs: Vec<TaskSpec>) -> Result<Vec<TaskId>> {
        self.shared.admit(specs)
    }

    /// Apply `update` to a DEFERRED task and return it to the queue
    pub fn resubmit(&self, task_id: TaskId, update: TaskUpdate) -> Result<()> {
        {
            let mut store = self.shared.store.lock();
            store.resubmit(task_id, update)?;
            let action_name = store.get(task_id).map(|task| task.action_name.clone());
            log_task_operation(
                events::TASK_REQUEUED,
                Some(task_id),
                action_name.as_deref(),
                "pending",
                None,
            );
        }
        self.shared.state_changed.notify_waiters();
        Ok(())
    }

    /// Return every DEFERRED task to the queue so the gate sees it again
    pub fn reevaluate_deferred(&self) -> Result<usize> {
        let requeued = self.shared.store.lock().reevaluate_deferred()?;
        if requeued > 0 {
            log_scheduler_operation(
                events::TASK_REQUEUED,
                "ok",
                Some(&format!("requeued={requeued}")),
            );
            self.shared.state_changed.notify_waiters();
        }
        Ok(requeued)
    }

    /// Refuse further external submissions; branch spawning continues
    pub fn close_admission(&self) {
        if self.shared.accepting.swap(false, Ordering::SeqCst) {
            info!(scheduler_id = %self.id, "🚪 SCHEDULER: Admission closed");
        }
    }

    pub fn is_accepting(&self) -> bool {
        self.shared.accepting.load(Ordering::SeqCst)
    }

    // ── Control ─────────────────────────────────────────────────────

    /// Spawn the dispatch loop on the current tokio runtime
    pub fn start(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            SchedulerError::InvalidState("start() requires a tokio runtime".to_string())
        })?;

        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::InvalidState(
                "Scheduler is already running".to_string(),
            ));
        }

        *self.dispatch_handle.lock() = Some(runtime.spawn(dispatch_loop(Arc::clone(&self.shared))));

        if let (Some(store), Some(every)) = (
            self.shared.snapshot_store.clone(),
            self.shared.config.snapshot_interval(),
        ) {
            *self.snapshot_handle.lock() =
                Some(runtime.spawn(snapshot_loop(Arc::clone(&self.shared), store, every)));
        }

        log_scheduler_operation(
            events::SCHEDULER_STARTED,
            "running",
            Some(&format!(
                "max_concurrent_tasks={}",
                self.shared.config.execution.max_concurrent_tasks
            )),
        );
        Ok(())
    }

    /// Close admission, stop the dispatch loop and wait up to
    /// `execution.shutdown_timeout_ms` for in-flight workers.
    ///
    /// Returns whether every worker finished in time.
    pub async fn stop(&self) -> Result<bool> {
        self.close_admission();
        let was_running = self.shared.running.swap(false, Ordering::SeqCst);
        self.shared.state_changed.notify_waiters();

        let dispatch = self.dispatch_handle.lock().take();
        if let Some(handle) = dispatch {
            if let Err(e) = handle.await {
                log_error("dispatcher", "stop", &e.to_string(), None);
            }
        }
        let snapshots = self.snapshot_handle.lock().take();
        if let Some(handle) = snapshots {
            handle.abort();
        }

        let slots = u32::try_from(self.shared.config.execution.max_concurrent_tasks)
            .unwrap_or(u32::MAX);
        let drained = matches!(
            tokio::time::timeout(
                self.shared.config.shutdown_timeout(),
                self.shared.permits.acquire_many(slots),
            )
            .await,
            Ok(Ok(_))
        );
        if !drained {
            warn!(
                scheduler_id = %self.id,
                in_flight = self.shared.store.lock().in_progress_count(),
                "⏱️ SCHEDULER: Shutdown timed out with workers still running"
            );
        }

        if was_running {
            if let Some(store) = self.shared.snapshot_store.clone() {
                if let Err(e) = self.shared.write_snapshot(store.as_ref()) {
                    log_error("snapshot", "shutdown", &e.to_string(), None);
                }
            }
        }

        log_scheduler_operation(
            events::SCHEDULER_STOPPED,
            "stopped",
            Some(&format!("drained={drained}")),
        );
        Ok(drained)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Wait until no task is PENDING, BLOCKED or IN_PROGRESS.
    ///
    /// Returns `false` when `timeout` elapses first. DEFERRED tasks do not
    /// keep this waiting.
    pub async fn wait_for_completion(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;

        loop {
            let notified = self.shared.state_changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.shared.store.lock().outstanding_count() == 0 {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified.as_mut()).await.is_err() {
                return self.shared.store.lock().outstanding_count() == 0;
            }
        }
    }

    // ── Inspection ──────────────────────────────────────────────────

    pub fn get_status(&self, task_id: TaskId) -> Result<Task> {
        self.shared.store.lock().task(task_id)
    }

    pub fn get_metrics(&self) -> SchedulerMetrics {
        self.shared.store.lock().metrics()
    }

    pub fn get_queue_snapshot(&self) -> QueueSnapshot {
        self.shared.queue_snapshot()
    }

    /// Write a snapshot to the configured store now
    pub fn snapshot_now(&self) -> Result<QueueSnapshot> {
        let store = self.shared.snapshot_store.clone().ok_or_else(|| {
            SchedulerError::PersistenceError("no snapshot store configured".to_string())
        })?;
        self.shared.write_snapshot(store.as_ref())
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.state_changed.notify_waiters();
        if let Some(handle) = self.snapshot_handle.lock().take() {
            handle.abort();
        }
    }
}
