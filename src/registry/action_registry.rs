//! # Action Registry
//!
//! Name-keyed lookup of the units of work tasks refer to by `action_name`.
//! The host populates the registry; the scheduler only resolves and invokes.
//!
//! ## Usage
//!
//! ```rust
//! use tasker_scheduler::registry::{ActionContext, ActionError, ActionRegistry};
//! use serde_json::{json, Map};
//!
//! # async fn example() -> Result<(), ActionError> {
//! let registry = ActionRegistry::new();
//! registry.register_fn("echo", |params, _ctx| async move { Ok(params) });
//!
//! let mut params = Map::new();
//! params.insert("greeting".to_string(), json!("hello"));
//! let result = registry
//!     .invoke("echo", &params, &ActionContext::detached(1), None)
//!     .await?;
//! assert_eq!(result["greeting"], "hello");
//! # Ok(())
//! # }
//! ```

use crate::models::{ActionParams, ActionResult, TaskId};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Errors produced by action execution.
///
/// Kept apart from `SchedulerError`: an action failure is task state, never a
/// failure of the scheduler call that observed it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActionError {
    /// The action ran and reported a failure
    #[error("{0}")]
    Failed(String),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("action_not_registered: {0}")]
    NotRegistered(String),

    #[error("action_timed_out: after {timeout_ms}ms")]
    TimedOut { timeout_ms: u64 },

    #[error("action_panicked: {0}")]
    Panicked(String),
}

impl ActionError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Per-invocation context handed to actions alongside their params
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionContext {
    pub task_id: TaskId,
    /// 1-based attempt number
    pub attempt: u32,
    /// Side effects must be suppressed when set
    pub dry_run: bool,
}

impl ActionContext {
    pub fn new(task_id: TaskId, attempt: u32, dry_run: bool) -> Self {
        Self {
            task_id,
            attempt,
            dry_run,
        }
    }

    /// Context for invocations outside the scheduler, e.g. tests or tooling
    pub fn detached(attempt: u32) -> Self {
        Self::new(TaskId::new(), attempt, false)
    }
}

/// An invocable unit of work
#[async_trait]
pub trait Action: Send + Sync {
    /// Run the action; an `Err` is an execution failure subject to retry
    async fn invoke(
        &self,
        params: &ActionParams,
        ctx: &ActionContext,
    ) -> Result<ActionResult, ActionError>;
}

/// Adapter turning an async closure into an [`Action`]
pub struct FnAction<F> {
    func: F,
}

impl<F> FnAction<F> {
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> Action for FnAction<F>
where
    F: Fn(ActionParams, ActionContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ActionResult, ActionError>> + Send,
{
    async fn invoke(
        &self,
        params: &ActionParams,
        ctx: &ActionContext,
    ) -> Result<ActionResult, ActionError> {
        (self.func)(params.clone(), *ctx).await
    }
}

/// Thread-safe registry of actions keyed by name
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: Arc<DashMap<String, Arc<dyn Action>>>,
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.names())
            .finish()
    }
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action, replacing any previous one with the same name
    pub fn register<A>(&self, name: impl Into<String>, action: A)
    where
        A: Action + 'static,
    {
        self.register_arc(name, Arc::new(action));
    }

    pub fn register_arc(&self, name: impl Into<String>, action: Arc<dyn Action>) {
        let name = name.into();
        if self.actions.insert(name.clone(), action).is_some() {
            warn!(action_name = %name, "📚 REGISTRY: Replaced existing action");
        } else {
            debug!(action_name = %name, "📚 REGISTRY: Registered action");
        }
    }

    /// Register an async closure as an action
    pub fn register_fn<F, Fut>(&self, name: impl Into<String>, func: F)
    where
        F: Fn(ActionParams, ActionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ActionResult, ActionError>> + Send + 'static,
    {
        self.register(name, FnAction::new(func));
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.actions.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.actions.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Resolve and run `name`.
    ///
    /// Lookup misses, panics and timeouts all come back as `ActionError` so
    /// the caller can route every outcome through the same retry path.
    pub async fn invoke(
        &self,
        name: &str,
        params: &ActionParams,
        ctx: &ActionContext,
        timeout: Option<Duration>,
    ) -> Result<ActionResult, ActionError> {
        // Clone the Arc out so no map shard stays locked across the await
        let action = self
            .get(name)
            .ok_or_else(|| ActionError::NotRegistered(name.to_string()))?;

        let guarded = AssertUnwindSafe(action.invoke(params, ctx)).catch_unwind();

        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, guarded).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(ActionError::TimedOut {
                        timeout_ms: saturating_millis(limit),
                    })
                }
            },
            None => guarded.await,
        };

        outcome.unwrap_or_else(|payload| Err(ActionError::Panicked(panic_message(payload))))
    }
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::reasons;
    use serde_json::{json, Map};

    struct Doubler;

    #[async_trait]
    impl Action for Doubler {
        async fn invoke(
            &self,
            params: &ActionParams,
            _ctx: &ActionContext,
        ) -> Result<ActionResult, ActionError> {
            let value = params
                .get("value")
                .and_then(|v| v.as_i64())
                .ok_or_else(|| ActionError::InvalidParameters("value is required".into()))?;
            let mut result = Map::new();
            result.insert("doubled".to_string(), json!(value * 2));
            Ok(result)
        }
    }

    fn params(value: i64) -> ActionParams {
        let mut params = Map::new();
        params.insert("value".to_string(), json!(value));
        params
    }

    #[tokio::test]
    async fn test_register_and_invoke() {
        let registry = ActionRegistry::new();
        registry.register("double", Doubler);
        assert!(registry.contains("double"));
        assert_eq!(registry.names(), vec!["double".to_string()]);

        let result = registry
            .invoke("double", &params(21), &ActionContext::detached(1), None)
            .await
            .unwrap();
        assert_eq!(result["doubled"], 42);
    }

    #[tokio::test]
    async fn test_action_errors_pass_through() {
        let registry = ActionRegistry::new();
        registry.register("double", Doubler);
        let err = registry
            .invoke("double", &Map::new(), &ActionContext::detached(1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::InvalidParameters(_)));
    }

    #[tokio::test]
    async fn test_unknown_action_is_an_execution_error() {
        let registry = ActionRegistry::new();
        let err = registry
            .invoke("missing", &Map::new(), &ActionContext::detached(1), None)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("{}: missing", reasons::ACTION_NOT_REGISTERED)
        );
    }

    #[tokio::test]
    async fn test_panics_are_caught() {
        let registry = ActionRegistry::new();
        registry.register_fn("explode", |_params, _ctx| async move {
            if true {
                panic!("kaboom");
            }
            Ok(Map::new())
        });

        let err = registry
            .invoke("explode", &Map::new(), &ActionContext::detached(1), None)
            .await
            .unwrap_err();
        assert_eq!(err, ActionError::Panicked("kaboom".to_string()));
        assert!(err.to_string().starts_with(reasons::ACTION_PANICKED));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_an_execution_error() {
        let registry = ActionRegistry::new();
        registry.register_fn("slow", |_params, _ctx| async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(Map::new())
        });

        let err = registry
            .invoke(
                "slow",
                &Map::new(),
                &ActionContext::detached(1),
                Some(Duration::from_millis(250)),
            )
            .await
            .unwrap_err();
        assert_eq!(err, ActionError::TimedOut { timeout_ms: 250 });
        assert!(err.to_string().starts_with(reasons::ACTION_TIMED_OUT));
    }

    #[test]
    fn test_timeout_millis_saturate_instead_of_wrapping() {
        assert_eq!(saturating_millis(Duration::from_millis(1_500)), 1_500);
        assert_eq!(saturating_millis(Duration::MAX), u64::MAX);
    }

    #[tokio::test]
    async fn test_context_reaches_closure_actions() {
        let registry = ActionRegistry::new();
        registry.register_fn("inspect", |_params, ctx| async move {
            let mut result = Map::new();
            result.insert("attempt".to_string(), json!(ctx.attempt));
            result.insert("dry_run".to_string(), json!(ctx.dry_run));
            Ok(result)
        });

        let ctx = ActionContext::new(TaskId::new(), 2, true);
        let result = registry
            .invoke("inspect", &Map::new(), &ctx, None)
            .await
            .unwrap();
        assert_eq!(result["attempt"], 2);
        assert_eq!(result["dry_run"], true);
    }
}
