//! # Structured Logging
//!
//! Console plus JSON file output for following tasks through admission,
//! dispatch, retry and branching. Hosts call [`init_structured_logging`] once;
//! the `log_*` helpers are safe to call with or without a subscriber.

use crate::config::ConfigManager;
use crate::models::TaskId;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Overrides the `log/` directory used for JSON output
pub const LOG_DIR_ENV: &str = "TASKER_SCHEDULER_LOG_DIR";

static LOGGING: OnceLock<()> = OnceLock::new();

/// Install the global subscriber. Later calls are no-ops.
pub fn init_structured_logging() {
    LOGGING.get_or_init(|| {
        let environment = ConfigManager::detect_environment();
        let level = default_level(&environment);

        let console = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_ansi(true)
            .with_filter(filter_for(level));

        let log_dir = std::env::var(LOG_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("log"));

        if let Err(e) = std::fs::create_dir_all(&log_dir) {
            let _ = tracing_subscriber::registry().with(console).try_init();
            tracing::warn!(
                error = %e,
                log_dir = %log_dir.display(),
                "🔧 LOGGING: file output disabled, console only"
            );
            return;
        }

        let file_name = log_file_name(&environment, std::process::id());
        let (writer, guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::never(&log_dir, &file_name));

        let json = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_ansi(false)
            .json()
            .with_filter(filter_for(level));

        if tracing_subscriber::registry()
            .with(console)
            .with(json)
            .try_init()
            .is_err()
        {
            tracing::debug!("Global subscriber already set, keeping it");
        }

        tracing::info!(
            environment = %environment,
            log_file = %log_dir.join(&file_name).display(),
            "🔧 LOGGING: console and JSON file output enabled"
        );

        // Keep the background writer alive for the rest of the process
        std::mem::forget(guard);
    });
}

/// `RUST_LOG` takes precedence over the environment default
fn filter_for(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn default_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        "test" => "warn",
        _ => "debug",
    }
}

fn log_file_name(environment: &str, pid: u32) -> String {
    format!(
        "scheduler.{environment}.{pid}.{}.log",
        Utc::now().format("%Y%m%d_%H%M%S")
    )
}

/// One task-scoped event: submission, dispatch, outcome or skip
pub fn log_task_operation(
    operation: &str,
    task_id: Option<TaskId>,
    action_name: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        task_id = task_id.map(|id| id.to_string()).as_deref(),
        action_name = action_name,
        status = %status,
        details = details,
        "📋 TASK"
    );
}

/// Start, stop and snapshot events of a scheduler instance
pub fn log_scheduler_operation(operation: &str, status: &str, details: Option<&str>) {
    tracing::info!(
        operation = %operation,
        status = %status,
        details = details,
        "🚦 SCHEDULER"
    );
}

pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        "❌ ERROR"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_level_per_environment() {
        assert_eq!(default_level("production"), "info");
        assert_eq!(default_level("test"), "warn");
        assert_eq!(default_level("development"), "debug");
        assert_eq!(default_level("staging"), "debug");
    }

    #[test]
    fn test_log_file_name_carries_environment_and_pid() {
        let name = log_file_name("test", 4242);
        assert!(name.starts_with("scheduler.test.4242."));
        assert!(name.ends_with(".log"));
    }

    #[test]
    fn test_helpers_do_not_require_a_subscriber() {
        log_task_operation("task.submitted", Some(TaskId::new()), Some("noop"), "pending", None);
        log_scheduler_operation("scheduler.started", "running", Some("workers=4"));
        log_error("test", "noop", "nothing went wrong", None);
    }
}
