//! Collaborator interfaces: the workers a pool supervises and the resolver
//! that tells the pool where its target lives.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use watchpool_core::{ResourceLocator, WorkerId};

/// Errors reported by a worker when its attachment ends abnormally.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Worker failed to attach: {0}")]
    AttachFailed(String),

    #[error("Worker connection lost: {0}")]
    ConnectionLost(String),
}

/// Errors reported by a target resolver.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Target not found: {0}")]
    TargetNotFound(String),

    #[error("Target has no usable locator: {0}")]
    NoLocator(String),

    #[error("Resource unreachable: {0}")]
    Unreachable(String),

    #[error("Resolver request failed: {0}")]
    Request(String),
}

/// One long-lived worker attached to a target.
///
/// `attach` runs for the whole life of the worker; its return is the
/// worker's stopped notification, whether it was asked to stop or failed
/// on its own.
#[async_trait]
pub trait WorkerClient: Send + Sync {
    /// Attach to the resource and hold the attachment until stopped or failed.
    async fn attach(&self, locator: &ResourceLocator) -> Result<(), WorkerError>;

    /// Ask the worker to detach. Must not block; `attach` returns afterwards,
    /// or immediately if it has not been called yet.
    fn stop(&self);
}

/// Creates worker clients for a pool.
pub trait WorkerFactory: Send + Sync {
    fn create(&self, worker_id: &WorkerId) -> Arc<dyn WorkerClient>;
}

/// Resolves target names to connectable resources.
#[async_trait]
pub trait TargetResolver: Send + Sync {
    /// Look up the current locator for `target`.
    async fn resolve(&self, target: &str) -> Result<ResourceLocator, ResolveError>;

    /// Check that the resource behind `locator` is reachable right now.
    async fn probe(&self, locator: &ResourceLocator) -> Result<(), ResolveError>;
}
