//! Worker pool - supervises the workers attached to one target.
//!
//! A pool moves through `Initializing -> Running -> Stopping -> Stopped`
//! and never backwards. Every worker runs in its own task on the pool's
//! tracker; when a worker's `attach` returns the worker leaves the live
//! set, and the pool finishes as soon as that set is empty.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use rand::seq::SliceRandom;
use thiserror::Error;
use tokio::sync::{oneshot, watch, RwLock};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use watchpool_core::{PoolKey, PoolStatus, ResourceLocator, TaskId, WorkerId};

use crate::client::{TargetResolver, WorkerClient, WorkerFactory};
use crate::config::PoolConfig;
use crate::liveness::LivenessMonitor;

/// Pool errors.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Target '{target}' did not come live within {waited:?}")]
    TargetUnavailable { target: String, waited: Duration },

    #[error("Cannot {operation} pool in state {status}")]
    InvalidState {
        operation: &'static str,
        status: PoolStatus,
    },
}

/// Why a pool reached `Stopped`. Carried by the pool's stopped signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolExit {
    /// The last live worker detached or failed.
    WorkersExhausted,
    /// The pool was stopped while holding no workers.
    Drained,
    /// The target never came live during startup.
    TargetUnavailable,
}

/// Outcome of picking a worker to remove during a shrink.
enum Pick {
    /// The snapshot held no workers.
    Empty,
    /// The picked worker had already left the live set.
    Gone(WorkerId),
    Taken(Arc<dyn WorkerClient>),
}

/// Point-in-time view of a pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub key: PoolKey,
    pub task_id: Option<TaskId>,
    pub target: String,
    pub status: PoolStatus,
    pub active_workers: u32,
}

/// Elastic set of workers serving one target.
pub struct WorkerPool {
    key: PoolKey,
    target: String,
    config: PoolConfig,
    factory: Arc<dyn WorkerFactory>,
    resolver: Arc<dyn TargetResolver>,

    status: watch::Sender<PoolStatus>,
    workers: DashMap<WorkerId, Arc<dyn WorkerClient>>,
    tracker: TaskTracker,
    stopped_tx: Mutex<Option<oneshot::Sender<PoolExit>>>,
    started: AtomicBool,
    task_id: OnceLock<TaskId>,

    // Written only by the liveness monitor.
    locator: RwLock<Option<ResourceLocator>>,
    live: AtomicBool,
}

impl WorkerPool {
    /// Create a pool in `Initializing`.
    ///
    /// The returned receiver resolves exactly once, when the pool reaches
    /// `Stopped`.
    pub fn new(
        key: PoolKey,
        target: impl Into<String>,
        config: PoolConfig,
        factory: Arc<dyn WorkerFactory>,
        resolver: Arc<dyn TargetResolver>,
    ) -> (Arc<Self>, oneshot::Receiver<PoolExit>) {
        let (stopped_tx, stopped_rx) = oneshot::channel();
        let (status, _) = watch::channel(PoolStatus::Initializing);
        let pool = Arc::new(Self {
            key,
            target: target.into(),
            config,
            factory,
            resolver,
            status,
            workers: DashMap::new(),
            tracker: TaskTracker::new(),
            stopped_tx: Mutex::new(Some(stopped_tx)),
            started: AtomicBool::new(false),
            task_id: OnceLock::new(),
            locator: RwLock::new(None),
            live: AtomicBool::new(false),
        });
        (pool, stopped_rx)
    }

    pub fn key(&self) -> PoolKey {
        self.key
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn status(&self) -> PoolStatus {
        *self.status.borrow()
    }

    /// Subscribe to status changes.
    pub fn watch_status(&self) -> watch::Receiver<PoolStatus> {
        self.status.subscribe()
    }

    /// Wait until the pool has reached `status` or any later state.
    pub async fn wait_for_status(&self, status: PoolStatus) -> PoolStatus {
        let mut rx = self.status.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let reached = match rx.wait_for(|current| *current >= status).await {
            Ok(current) => *current,
            Err(_) => self.status(),
        };
        reached
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn worker_ids(&self) -> Vec<WorkerId> {
        self.workers.iter().map(|entry| entry.key().clone()).collect()
    }

    /// True once the target has been confirmed reachable at least once.
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    pub async fn locator(&self) -> Option<ResourceLocator> {
        self.locator.read().await.clone()
    }

    /// Durable record this pool serves, once linked.
    pub fn task_id(&self) -> Option<TaskId> {
        self.task_id.get().copied()
    }

    /// Link the pool to its durable record. Only the first link sticks.
    pub fn link_task(&self, task_id: TaskId) {
        if self.task_id.set(task_id).is_err() {
            warn!(pool_key = %self.key, task_id = %task_id, "Pool already linked to a task");
        }
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            key: self.key,
            task_id: self.task_id(),
            target: self.target.clone(),
            status: self.status(),
            active_workers: u32::try_from(self.workers.len()).unwrap_or(u32::MAX),
        }
    }

    /// Wait for the target, spawn `count` workers and enter `Running`.
    pub async fn start(self: &Arc<Self>, count: u32, spawn_delay: Duration) -> Result<(), PoolError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(self.invalid_state("start"));
        }

        info!(
            pool_key = %self.key,
            target = %self.target,
            workers = count,
            "Starting pool"
        );

        let monitor = LivenessMonitor::new(Arc::clone(self), Arc::clone(&self.resolver), &self.config);
        tokio::spawn(monitor.run());

        self.await_target().await?;

        for i in 0..count {
            if !self.status().accepts_workers() {
                debug!(pool_key = %self.key, "Pool stopping, skipping remaining launches");
                break;
            }
            self.spawn_worker().await;
            if i + 1 < count {
                tokio::time::sleep(spawn_delay).await;
            }
        }

        if !self.advance(PoolStatus::Running) {
            return Err(self.invalid_state("start"));
        }
        info!(
            pool_key = %self.key,
            target = %self.target,
            workers = self.worker_count(),
            "Pool running"
        );

        if self.workers.is_empty() {
            self.finish(PoolExit::WorkersExhausted);
        }
        Ok(())
    }

    /// Spawn `n` more workers, paced by `spawn_delay`.
    ///
    /// Returns the number of workers actually launched.
    pub async fn grow_by(self: &Arc<Self>, n: u32, spawn_delay: Duration) -> Result<u32, PoolError> {
        self.ensure_running("grow")?;

        let mut launched = 0;
        for i in 0..n {
            if !self.status().accepts_workers() {
                break;
            }
            if self.spawn_worker().await.is_some() {
                launched += 1;
            }
            if i + 1 < n {
                tokio::time::sleep(spawn_delay).await;
            }
        }

        info!(
            pool_key = %self.key,
            requested = n,
            launched,
            workers = self.worker_count(),
            "Pool grown"
        );
        Ok(launched)
    }

    /// Stop up to `n` randomly chosen workers, paced by `spawn_delay`.
    ///
    /// Stops early when the pool runs out of workers. Returns the number
    /// of workers removed.
    pub async fn shrink_by(&self, n: u32, spawn_delay: Duration) -> Result<u32, PoolError> {
        self.ensure_running("shrink")?;

        let mut removed = 0;
        for i in 0..n {
            let snapshot = self.worker_ids();
            let client = match self.take_from(&snapshot) {
                Pick::Empty => break,
                // Lost a race with the worker's own exit; the iteration still counts.
                Pick::Gone(worker_id) => {
                    debug!(pool_key = %self.key, worker_id = %worker_id, "Worker already gone");
                    continue;
                }
                Pick::Taken(client) => client,
            };

            client.stop();
            removed += 1;

            if i + 1 < n {
                tokio::time::sleep(spawn_delay).await;
            }
        }

        info!(
            pool_key = %self.key,
            requested = n,
            removed,
            workers = self.worker_count(),
            "Pool shrunk"
        );
        Ok(removed)
    }

    /// Stop every worker, paced by `drain_delay`, and wait for them to exit.
    ///
    /// Returns false if the pool was already stopping or stopped.
    pub async fn stop(&self, drain_delay: Duration) -> bool {
        if !self.advance(PoolStatus::Stopping) {
            debug!(pool_key = %self.key, status = %self.status(), "Pool already stopping");
            return false;
        }
        info!(
            pool_key = %self.key,
            target = %self.target,
            workers = self.worker_count(),
            "Stopping pool"
        );

        let snapshot: Vec<(WorkerId, Arc<dyn WorkerClient>)> = self
            .workers
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();
        let total = snapshot.len();

        for (i, (worker_id, client)) in snapshot.into_iter().enumerate() {
            if !self.workers.contains_key(&worker_id) {
                continue;
            }
            client.stop();
            if i + 1 < total && !drain_delay.is_zero() {
                tokio::time::sleep(drain_delay).await;
            }
        }

        self.tracker.close();
        self.tracker.wait().await;

        // Covers pools that never held a worker.
        if self.workers.is_empty() {
            self.finish(PoolExit::Drained);
        }
        true
    }

    pub(crate) async fn set_locator(&self, locator: Option<ResourceLocator>) {
        *self.locator.write().await = locator;
    }

    pub(crate) fn mark_live(&self) {
        self.live.store(true, Ordering::Release);
    }

    /// Pick one worker from `snapshot` and take it out of the live set.
    fn take_from(&self, snapshot: &[WorkerId]) -> Pick {
        let Some(picked) = pick_random(snapshot) else {
            return Pick::Empty;
        };
        match self.workers.remove(&picked) {
            Some((_, client)) => Pick::Taken(client),
            None => Pick::Gone(picked),
        }
    }

    async fn await_target(&self) -> Result<(), PoolError> {
        let mut polls = 0;
        loop {
            if self.is_live() && self.locator.read().await.is_some() {
                return Ok(());
            }
            if !self.status().is_active() {
                return Err(self.invalid_state("start"));
            }
            if polls >= self.config.startup_max_polls {
                break;
            }
            polls += 1;
            tokio::time::sleep(self.config.startup_poll_interval).await;
        }

        let waited = self.config.startup_budget();
        warn!(
            pool_key = %self.key,
            target = %self.target,
            waited_ms = waited.as_millis() as u64,
            "Target did not come live"
        );
        self.finish(PoolExit::TargetUnavailable);
        Err(PoolError::TargetUnavailable {
            target: self.target.clone(),
            waited,
        })
    }

    async fn spawn_worker(self: &Arc<Self>) -> Option<WorkerId> {
        let Some(locator) = self.locator().await else {
            warn!(pool_key = %self.key, "No locator cached, cannot launch worker");
            return None;
        };

        let worker_id = WorkerId::generate();
        let client = self.factory.create(&worker_id);
        self.workers.insert(worker_id.clone(), Arc::clone(&client));

        // Re-check after publishing so a concurrent stop either drains this
        // worker or we back out here.
        if !self.status().accepts_workers() {
            self.workers.remove(&worker_id);
            return None;
        }

        let pool = Arc::clone(self);
        let id = worker_id.clone();
        self.tracker.spawn(async move {
            pool.supervise(id, client, locator).await;
        });
        Some(worker_id)
    }

    async fn supervise(
        self: Arc<Self>,
        worker_id: WorkerId,
        client: Arc<dyn WorkerClient>,
        locator: ResourceLocator,
    ) {
        debug!(pool_key = %self.key, worker_id = %worker_id, "Worker attaching");
        match client.attach(&locator).await {
            Ok(()) => debug!(pool_key = %self.key, worker_id = %worker_id, "Worker detached"),
            Err(e) => warn!(
                pool_key = %self.key,
                worker_id = %worker_id,
                error = %e,
                "Worker failed"
            ),
        }
        self.on_worker_exit(&worker_id);
    }

    fn on_worker_exit(&self, worker_id: &WorkerId) {
        self.workers.remove(worker_id);
        if self.workers.is_empty() {
            self.finish(PoolExit::WorkersExhausted);
        }
    }

    /// Enter `Stopped` and fire the stopped signal. Only the first call has
    /// any effect.
    fn finish(&self, exit: PoolExit) {
        if !self.advance(PoolStatus::Stopped) {
            return;
        }
        info!(pool_key = %self.key, target = %self.target, reason = ?exit, "Pool stopped");

        // A launch racing with the last exit can leave a straggler behind.
        let leftovers: Vec<Arc<dyn WorkerClient>> = self
            .workers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for client in leftovers {
            client.stop();
        }

        let sender = self
            .stopped_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(tx) = sender {
            // The registry may already have let go of the pool.
            let _ = tx.send(exit);
        }
    }

    fn advance(&self, next: PoolStatus) -> bool {
        let mut from = None;
        let changed = self.status.send_if_modified(|current| {
            if current.check_transition(next).is_err() {
                return false;
            }
            from = Some(*current);
            *current = next;
            true
        });
        if let Some(from) = from {
            debug!(pool_key = %self.key, from = %from, to = %next, "Pool status changed");
        }
        changed
    }

    fn ensure_running(&self, operation: &'static str) -> Result<(), PoolError> {
        match self.status() {
            PoolStatus::Running => Ok(()),
            _ => Err(self.invalid_state(operation)),
        }
    }

    fn invalid_state(&self, operation: &'static str) -> PoolError {
        PoolError::InvalidState {
            operation,
            status: self.status(),
        }
    }
}

fn pick_random(ids: &[WorkerId]) -> Option<WorkerId> {
    ids.choose(&mut rand::thread_rng()).cloned()
}
