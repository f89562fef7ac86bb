use parking_lot::Mutex;
use serde_json::{json, Map};
use std::sync::Arc;
use tasker_scheduler::{ActionContext, ActionError, ActionRegistry, TaskId};
use tokio::time::Instant;

/// One observed action invocation
#[derive(Debug, Clone)]
pub struct Invocation {
    pub action: String,
    pub task_id: TaskId,
    pub attempt: u32,
    pub dry_run: bool,
    pub at: Instant,
}

/// Shared log of every invocation made through a recording registry
#[derive(Debug, Default)]
pub struct Recorder {
    invocations: Mutex<Vec<Invocation>>,
}

impl Recorder {
    pub fn record(&self, action: &str, ctx: &ActionContext) {
        self.invocations.lock().push(Invocation {
            action: action.to_string(),
            task_id: ctx.task_id,
            attempt: ctx.attempt,
            dry_run: ctx.dry_run,
            at: Instant::now(),
        });
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().clone()
    }

    pub fn for_task(&self, task_id: TaskId) -> Vec<Invocation> {
        self.invocations()
            .into_iter()
            .filter(|invocation| invocation.task_id == task_id)
            .collect()
    }

    /// Task ids in invocation order
    pub fn task_order(&self) -> Vec<TaskId> {
        self.invocations().iter().map(|i| i.task_id).collect()
    }

    pub fn count(&self) -> usize {
        self.invocations.lock().len()
    }
}

/// Registry with recording actions:
/// - `ok` succeeds with `{"ok": true}`
/// - `echo` returns its params
/// - `fail` always fails
/// - `explode` always panics
/// - `slow` sleeps for `sleep_ms` (default 100) then succeeds
pub fn recording_registry() -> (ActionRegistry, Arc<Recorder>) {
    let registry = ActionRegistry::new();
    let recorder = Arc::new(Recorder::default());

    let r = Arc::clone(&recorder);
    registry.register_fn("ok", move |_params, ctx| {
        r.record("ok", &ctx);
        async move {
            let mut result = Map::new();
            result.insert("ok".to_string(), json!(true));
            Ok(result)
        }
    });

    let r = Arc::clone(&recorder);
    registry.register_fn("echo", move |params, ctx| {
        r.record("echo", &ctx);
        async move { Ok(params) }
    });

    let r = Arc::clone(&recorder);
    registry.register_fn("fail", move |_params, ctx| {
        r.record("fail", &ctx);
        async move { Err(ActionError::failed("always fails")) }
    });

    let r = Arc::clone(&recorder);
    registry.register_fn("explode", move |_params, ctx| {
        r.record("explode", &ctx);
        async move {
            if ctx.attempt > 0 {
                panic!("exploded on attempt {}", ctx.attempt);
            }
            Ok(Map::new())
        }
    });

    let r = Arc::clone(&recorder);
    registry.register_fn("slow", move |params, ctx| {
        r.record("slow", &ctx);
        async move {
            let sleep_ms = params.get("sleep_ms").and_then(|v| v.as_u64()).unwrap_or(100);
            tokio::time::sleep(std::time::Duration::from_millis(sleep_ms)).await;
            Ok(Map::new())
        }
    });

    (registry, recorder)
}
