//! # Persistence
//!
//! Best-effort audit trail: the append-only execution log and periodic queue
//! snapshots. Neither is consulted when the scheduler makes decisions.

pub mod execution_log;
pub mod snapshot;

pub use execution_log::{
    BranchErrorRecord, ExecutionLog, ExecutionRecord, InMemoryExecutionLog, JsonlExecutionLog,
    LogEntry,
};
pub use snapshot::{FileSnapshotStore, QueueSnapshot, SnapshotStore};
