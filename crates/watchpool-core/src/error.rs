//! Core domain errors.

use thiserror::Error;

use crate::PoolStatus;

/// Core domain errors for watchpool.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Status moved against the pool lifecycle order.
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: PoolStatus, to: PoolStatus },

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
