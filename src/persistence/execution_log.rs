//! # Execution Log
//!
//! Append-only metrics sink. Every terminal transition produces one
//! [`ExecutionRecord`]; branch templates that fail to instantiate produce a
//! [`BranchErrorRecord`] in the same stream.
//!
//! The JSON Lines layout is one object per line, tagged by `record_type`,
//! written to `executions-YYYY-MM-DD.jsonl` under the configured directory.

use crate::error::Result;
use crate::models::{RiskLevel, Task, TaskId, TaskPriority};
use crate::state_machine::TaskStatus;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Outcome of one task, recorded when it reaches a terminal status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub task_id: TaskId,
    pub action_name: String,
    pub priority: TaskPriority,
    pub risk_level: RiskLevel,
    pub confidence_score: f64,
    pub attempts: u32,
    pub status: TaskStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub error: Option<String>,
    pub dry_run: bool,
    pub parent_id: Option<TaskId>,
    pub recorded_at: DateTime<Utc>,
}

impl ExecutionRecord {
    pub fn from_task(task: &Task) -> Self {
        Self {
            task_id: task.id,
            action_name: task.action_name.clone(),
            priority: task.priority,
            risk_level: task.risk_level,
            confidence_score: task.confidence_score,
            attempts: task.attempt_count,
            status: task.status,
            started_at: task.started_at,
            completed_at: task.completed_at,
            duration_ms: task.duration_ms(),
            error: task.error.clone(),
            dry_run: task.dry_run,
            parent_id: task.parent_id,
            recorded_at: Utc::now(),
        }
    }
}

/// A branch whose template could not be turned into a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchErrorRecord {
    pub parent_id: TaskId,
    pub branch_index: usize,
    pub condition_type: String,
    pub error: String,
    pub recorded_at: DateTime<Utc>,
}

/// One line of the execution log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record_type", rename_all = "snake_case")]
pub enum LogEntry {
    Execution(ExecutionRecord),
    BranchError(BranchErrorRecord),
}

impl LogEntry {
    pub fn recorded_at(&self) -> DateTime<Utc> {
        match self {
            Self::Execution(record) => record.recorded_at,
            Self::BranchError(record) => record.recorded_at,
        }
    }
}

/// Append-only sink for execution outcomes
pub trait ExecutionLog: Send + Sync {
    fn append(&self, entry: &LogEntry) -> Result<()>;

    fn record_execution(&self, record: ExecutionRecord) -> Result<()> {
        self.append(&LogEntry::Execution(record))
    }

    fn record_branch_error(&self, record: BranchErrorRecord) -> Result<()> {
        self.append(&LogEntry::BranchError(record))
    }
}

/// Keeps entries in memory; the default sink when no log directory is set.
///
/// `new()` keeps everything. `bounded(n)` keeps the newest `n` entries and
/// drops the oldest, which is what a long-running scheduler should use.
#[derive(Debug, Default)]
pub struct InMemoryExecutionLog {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: Option<usize>,
}

impl InMemoryExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bounded(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: Some(capacity.max(1)),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn executions(&self) -> Vec<ExecutionRecord> {
        self.entries
            .lock()
            .iter()
            .filter_map(|entry| match entry {
                LogEntry::Execution(record) => Some(record.clone()),
                LogEntry::BranchError(_) => None,
            })
            .collect()
    }

    pub fn branch_errors(&self) -> Vec<BranchErrorRecord> {
        self.entries
            .lock()
            .iter()
            .filter_map(|entry| match entry {
                LogEntry::BranchError(record) => Some(record.clone()),
                LogEntry::Execution(_) => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl ExecutionLog for InMemoryExecutionLog {
    fn append(&self, entry: &LogEntry) -> Result<()> {
        let mut entries = self.entries.lock();
        if let Some(capacity) = self.capacity {
            while entries.len() >= capacity {
                entries.pop_front();
            }
        }
        entries.push_back(entry.clone());
        Ok(())
    }
}

/// JSON Lines file per UTC day
#[derive(Debug)]
pub struct JsonlExecutionLog {
    directory: PathBuf,
    current: Mutex<Option<(NaiveDate, File)>>,
}

impl JsonlExecutionLog {
    /// Create the sink, creating `directory` if needed
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;
        Ok(Self {
            directory,
            current: Mutex::new(None),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// File that receives entries recorded on `date`
    pub fn file_for(&self, date: NaiveDate) -> PathBuf {
        self.directory
            .join(format!("executions-{}.jsonl", date.format("%Y-%m-%d")))
    }

    /// Read every entry recorded on `date`
    pub fn read_day(&self, date: NaiveDate) -> Result<Vec<LogEntry>> {
        let path = self.file_for(date);
        if !path.exists() {
            return Ok(Vec::new());
        }
        fs::read_to_string(path)?
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| Ok(serde_json::from_str::<LogEntry>(line)?))
            .collect()
    }
}

impl ExecutionLog for JsonlExecutionLog {
    fn append(&self, entry: &LogEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let date = entry.recorded_at().date_naive();
        let mut current = self.current.lock();

        // Rotate when the day changes
        let stale = !matches!(current.as_ref(), Some((open_date, _)) if *open_date == date);
        if stale {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.file_for(date))?;
            *current = Some((date, file));
        }

        if let Some((_, file)) = current.as_mut() {
            file.write_all(line.as_bytes())?;
            file.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskSpec;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn record_at(recorded_at: DateTime<Utc>) -> ExecutionRecord {
        let task = Task::from_spec(TaskSpec::new("t", "noop"), TaskId::new(), 1, None);
        ExecutionRecord {
            recorded_at,
            ..ExecutionRecord::from_task(&task)
        }
    }

    #[test]
    fn test_in_memory_log_splits_entries() {
        let log = InMemoryExecutionLog::new();
        log.record_execution(record_at(Utc::now())).unwrap();
        log.record_branch_error(BranchErrorRecord {
            parent_id: TaskId::new(),
            branch_index: 0,
            condition_type: "success".into(),
            error: "no action_name".into(),
            recorded_at: Utc::now(),
        })
        .unwrap();

        assert_eq!(log.len(), 2);
        assert_eq!(log.executions().len(), 1);
        assert_eq!(log.branch_errors().len(), 1);
    }

    #[test]
    fn test_bounded_log_keeps_the_newest_entries() {
        let log = InMemoryExecutionLog::bounded(2);
        let first = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for offset in 0..5 {
            log.record_execution(record_at(first + chrono::Duration::minutes(offset)))
                .unwrap();
        }

        let kept: Vec<DateTime<Utc>> = log.executions().iter().map(|r| r.recorded_at).collect();
        assert_eq!(
            kept,
            vec![
                first + chrono::Duration::minutes(3),
                first + chrono::Duration::minutes(4)
            ]
        );
        assert_eq!(log.capacity(), Some(2));
        assert_eq!(InMemoryExecutionLog::new().capacity(), None);
    }

    #[test]
    fn test_jsonl_log_rotates_daily() {
        let dir = TempDir::new().unwrap();
        let log = JsonlExecutionLog::new(dir.path().join("executions")).unwrap();

        let day_one = Utc.with_ymd_and_hms(2024, 3, 1, 23, 59, 0).unwrap();
        let day_two = Utc.with_ymd_and_hms(2024, 3, 2, 0, 1, 0).unwrap();
        log.record_execution(record_at(day_one)).unwrap();
        log.record_execution(record_at(day_one)).unwrap();
        log.record_execution(record_at(day_two)).unwrap();

        let first = log.read_day(day_one.date_naive()).unwrap();
        let second = log.read_day(day_two.date_naive()).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 1);
        assert!(log
            .file_for(day_one.date_naive())
            .ends_with("executions-2024-03-01.jsonl"));
    }

    #[test]
    fn test_jsonl_lines_are_tagged_objects() {
        let dir = TempDir::new().unwrap();
        let log = JsonlExecutionLog::new(dir.path()).unwrap();
        let now = Utc::now();
        log.record_execution(record_at(now)).unwrap();

        let raw = fs::read_to_string(log.file_for(now.date_naive())).unwrap();
        let line: serde_json::Value = serde_json::from_str(raw.trim()).unwrap();
        assert_eq!(line["record_type"], "execution");
        assert_eq!(line["action_name"], "noop");
        assert_eq!(line["status"], "pending");
        assert!(line.get("duration_ms").is_some());
    }
}
