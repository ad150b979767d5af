//! HTTP request and response types.

use serde::{Deserialize, Serialize};

use watchpool_core::{TaskRecord, TaskStatus};

// ============================================================================
// Request types
// ============================================================================

/// Request body for creating a watch task.
#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    /// Target to watch.
    pub target: String,

    /// Number of workers to attach.
    pub count: u32,

    /// Pause between worker launches. Non-positive means the default.
    #[serde(default)]
    pub delay_ms: Option<i64>,
}

/// Query for listing tasks.
#[derive(Debug, Default, Deserialize)]
pub struct ListTasksQuery {
    /// Only return tasks that are initializing or running.
    #[serde(default)]
    pub only_working: bool,
}

/// Query for stopping a task.
#[derive(Debug, Default, Deserialize)]
pub struct StopTaskQuery {
    #[serde(default)]
    pub delay_ms: Option<i64>,
}

/// Query for growing or shrinking a task's pool.
#[derive(Debug, Deserialize)]
pub struct ResizeQuery {
    pub count: u32,

    #[serde(default)]
    pub delay_ms: Option<i64>,
}

// ============================================================================
// Response types
// ============================================================================

/// One task record.
#[derive(Debug, Serialize, Deserialize)]
pub struct TaskResponse {
    pub id: u64,
    pub target: String,
    pub desired_worker_count: u32,
    pub active_worker_count: u32,
    pub status: TaskStatus,
    pub created_at: String,
}

impl From<TaskRecord> for TaskResponse {
    fn from(record: TaskRecord) -> Self {
        Self {
            id: record.id.get(),
            target: record.target,
            desired_worker_count: record.desired_worker_count,
            active_worker_count: record.active_worker_count,
            status: record.current_status,
            created_at: record.created_at.to_rfc3339(),
        }
    }
}

/// Result of a stop request.
#[derive(Debug, Serialize, Deserialize)]
pub struct StopTaskResponse {
    pub id: u64,
    pub stopped: bool,
}

/// Result of a resize request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ResizeResponse {
    pub id: u64,
    /// Workers actually launched or stopped.
    pub changed: u32,
}

// ============================================================================
// Error types
// ============================================================================

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
