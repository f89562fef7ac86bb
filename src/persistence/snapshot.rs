//! # Queue Snapshots
//!
//! Full point-in-time copies of the task graph store for audit and manual
//! recovery. Snapshots are never read back by the scheduler itself.

use crate::error::Result;
use crate::models::{Task, TaskId};
use crate::orchestration::metrics::SchedulerMetrics;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Store contents at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub taken_at: DateTime<Utc>,
    /// Every task in submission order, transition history included
    pub tasks: Vec<Task>,
    /// Ready tasks in dispatch order
    pub ready_queue: Vec<TaskId>,
    pub in_flight: usize,
    pub metrics: SchedulerMetrics,
}

impl QueueSnapshot {
    pub fn task(&self, task_id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == task_id)
    }
}

/// Destination for snapshots
pub trait SnapshotStore: Send + Sync {
    fn save(&self, snapshot: &QueueSnapshot) -> Result<()>;

    /// Most recently saved snapshot, if any
    fn load(&self) -> Result<Option<QueueSnapshot>>;
}

/// Pretty-printed JSON file replaced atomically on each save.
///
/// Clones share one write lock, so periodic and on-demand saves never
/// interleave on the temp file.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "snapshot".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn save(&self, snapshot: &QueueSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        // Readers never observe a half-written file
        let _guard = self.write_lock.lock();
        let temp = self.temp_path();
        fs::write(&temp, serde_json::to_vec_pretty(snapshot)?)?;
        fs::rename(&temp, &self.path)?;
        Ok(())
    }

    fn load(&self) -> Result<Option<QueueSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read(&self.path)?;
        Ok(Some(serde_json::from_slice(&raw)?))
    }
}
