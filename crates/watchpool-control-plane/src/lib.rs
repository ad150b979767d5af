//! watchpool Control Plane Library
//!
//! Runs elastic pools of long-lived workers against named targets, probes
//! each target for liveness, and mirrors pool state into a durable task
//! table through a periodic reconciliation loop.

pub mod client;
pub mod config;
pub mod http;
mod liveness;
pub mod metrics;
pub mod pool;
pub mod reconcile;
pub mod registry;
pub mod resolver;
pub mod state;
pub mod store;
pub mod worker;

#[cfg(test)]
mod testing;

pub use client::{ResolveError, TargetResolver, WorkerClient, WorkerError, WorkerFactory};
pub use config::{Config, PoolConfig};
pub use pool::{PoolError, PoolExit, PoolSnapshot, WorkerPool};
pub use reconcile::{ReconcileReport, Reconciler};
pub use registry::{Orchestrator, OrchestratorError};
pub use resolver::HttpTargetResolver;
pub use state::AppState;
pub use store::{InMemoryTaskStore, JsonFileTaskStore, StoreError, TaskStore};
pub use worker::{IdleWorker, IdleWorkerFactory};
