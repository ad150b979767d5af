//! Durable task records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CoreError, PoolStatus, TaskId, TaskStatus};

/// Durable record of one watch task.
///
/// The command paths set `current_status` directly; everything else in
/// here that describes the live pool is rewritten by reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Store-assigned identifier.
    pub id: TaskId,

    /// Watched target name.
    pub target: String,

    /// Number of workers requested at creation.
    pub desired_worker_count: u32,

    /// When the task was created.
    pub created_at: DateTime<Utc>,

    /// Status mirrored from the pool.
    pub current_status: TaskStatus,

    /// Workers attached at the last reconciliation.
    pub active_worker_count: u32,
}

impl TaskRecord {
    /// Materialize a draft under the id the store assigned.
    pub fn from_draft(id: TaskId, draft: NewTaskRecord) -> Self {
        Self {
            id,
            target: draft.target,
            desired_worker_count: draft.desired_worker_count,
            created_at: draft.created_at,
            current_status: TaskStatus::Initializing,
            active_worker_count: 0,
        }
    }

    /// Overwrite the derived fields from a live pool observation.
    ///
    /// Returns true if anything changed.
    pub fn mirror(&mut self, status: PoolStatus, active_workers: u32) -> bool {
        let status = TaskStatus::from(status);
        let changed = self.current_status != status || self.active_worker_count != active_workers;
        self.current_status = status;
        self.active_worker_count = active_workers;
        changed
    }

    /// Mark the record completed. Returns true if it was not already.
    pub fn complete(&mut self) -> bool {
        if self.current_status == TaskStatus::Completed {
            return false;
        }
        self.current_status = TaskStatus::Completed;
        true
    }
}

/// A record that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTaskRecord {
    pub target: String,
    pub desired_worker_count: u32,
    pub created_at: DateTime<Utc>,
}

impl NewTaskRecord {
    /// Create a draft for `target` with `desired_worker_count` workers.
    pub fn new(target: impl Into<String>, desired_worker_count: u32) -> Result<Self, CoreError> {
        let target = target.into();
        if target.trim().is_empty() {
            return Err(CoreError::InvalidInput("target must not be empty".to_string()));
        }
        Ok(Self {
            target,
            desired_worker_count,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> TaskRecord {
        let draft = NewTaskRecord::new("abc", 3).unwrap();
        TaskRecord::from_draft(TaskId::new(1), draft)
    }

    #[test]
    fn test_new_record_is_initializing() {
        let r = record();
        assert_eq!(r.current_status, TaskStatus::Initializing);
        assert_eq!(r.active_worker_count, 0);
        assert_eq!(r.desired_worker_count, 3);
    }

    #[test]
    fn test_empty_target_rejected() {
        assert!(matches!(
            NewTaskRecord::new("  ", 1),
            Err(CoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_mirror_reports_changes() {
        let mut r = record();
        assert!(r.mirror(PoolStatus::Running, 3));
        assert_eq!(r.current_status, TaskStatus::Running);
        assert!(!r.mirror(PoolStatus::Running, 3));
        assert!(r.mirror(PoolStatus::Stopped, 0));
        assert_eq!(r.current_status, TaskStatus::Completed);
    }

    #[test]
    fn test_complete_is_idempotent() {
        let mut r = record();
        assert!(r.complete());
        assert!(!r.complete());
    }
}
