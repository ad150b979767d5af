//! Status enums for pools and task records.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::CoreError;

/// Lifecycle of a worker pool.
///
/// Variants are declared in lifecycle order; the derived ordering is what
/// makes transitions monotonic.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PoolStatus {
    /// Waiting for the target to be confirmed live; initial workers not yet spawned.
    #[default]
    Initializing,
    /// Workers are attached and the pool accepts resize commands.
    Running,
    /// Draining workers.
    Stopping,
    /// Terminal. The worker set is empty.
    Stopped,
}

impl PoolStatus {
    /// Returns true while the liveness monitor should keep polling.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Initializing | Self::Running)
    }

    /// Returns true if new workers may be launched.
    pub fn accepts_workers(&self) -> bool {
        !matches!(self, Self::Stopping | Self::Stopped)
    }

    /// Validate a forward transition to `next`.
    pub fn check_transition(self, next: PoolStatus) -> Result<(), CoreError> {
        if next > self {
            Ok(())
        } else {
            Err(CoreError::InvalidStateTransition { from: self, to: next })
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a durable task record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Record created, pool still waiting for its target.
    #[default]
    Initializing,
    /// Pool is running.
    Running,
    /// Stop requested, pool draining.
    Stopping,
    /// No live pool serves this record any more.
    Completed,
}

impl TaskStatus {
    /// Returns true if the record claims a live pool.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Completed)
    }

    /// Returns true for records that are starting or serving workers.
    pub fn is_working(&self) -> bool {
        matches!(self, Self::Initializing | Self::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<PoolStatus> for TaskStatus {
    fn from(status: PoolStatus) -> Self {
        match status {
            PoolStatus::Initializing => TaskStatus::Initializing,
            PoolStatus::Running => TaskStatus::Running,
            PoolStatus::Stopping => TaskStatus::Stopping,
            PoolStatus::Stopped => TaskStatus::Completed,
        }
    }
}
