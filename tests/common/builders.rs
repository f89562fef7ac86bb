use std::sync::Arc;
use tasker_scheduler::config::SchedulerConfig;
use tasker_scheduler::persistence::InMemoryExecutionLog;
use tasker_scheduler::{ActionRegistry, RiskLevel, TaskPriority, TaskScheduler, TaskSpec};

/// Config with one worker so dispatch order is observable
pub fn serial_config() -> SchedulerConfig {
    let mut config = SchedulerConfig::default();
    config.execution.max_concurrent_tasks = 1;
    config
}

/// Millisecond backoff so retry tests finish quickly in real time
pub fn fast_retry_config() -> SchedulerConfig {
    let mut config = SchedulerConfig::default();
    config.backoff.base_delay_ms = 5;
    config.backoff.max_delay_ms = 50;
    config
}

pub fn scheduler_with_log(
    registry: ActionRegistry,
    config: SchedulerConfig,
) -> (TaskScheduler, Arc<InMemoryExecutionLog>) {
    let log = Arc::new(InMemoryExecutionLog::new());
    let scheduler = TaskScheduler::builder(registry)
        .config(config)
        .execution_log(log.clone())
        .build()
        .expect("valid scheduler config");
    (scheduler, log)
}

pub fn task(action: &str) -> TaskSpec {
    TaskSpec::new(format!("{action} task"), action)
}

pub fn prioritized(action: &str, priority: TaskPriority) -> TaskSpec {
    task(action).with_priority(priority)
}

pub fn risky(action: &str, risk_level: RiskLevel, confidence: f64) -> TaskSpec {
    task(action).with_risk(risk_level, confidence)
}
