//! Orchestrator - owns every live pool and routes commands to them.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use watchpool_core::{CoreError, NewTaskRecord, PoolKey, TaskId, TaskRecord, TaskStatus};

use crate::client::{TargetResolver, WorkerFactory};
use crate::config::PoolConfig;
use crate::pool::{PoolError, PoolExit, PoolSnapshot, WorkerPool};
use crate::reconcile::Reconciler;
use crate::store::{StoreError, TaskStore};

/// Orchestrator errors.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Invalid(#[from] CoreError),
}

/// Registry of live pools keyed by `PoolKey`.
pub struct Orchestrator {
    pools: Arc<DashMap<PoolKey, Arc<WorkerPool>>>,
    next_key: AtomicU64,
    store: Arc<dyn TaskStore>,
    factory: Arc<dyn WorkerFactory>,
    resolver: Arc<dyn TargetResolver>,
    pool_config: PoolConfig,
    link_gate: Arc<RwLock<()>>,
    shutdown: CancellationToken,
}

impl Orchestrator {
    /// Create a new Orchestrator wrapped in Arc.
    pub fn new(
        store: Arc<dyn TaskStore>,
        factory: Arc<dyn WorkerFactory>,
        resolver: Arc<dyn TargetResolver>,
        pool_config: PoolConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            pools: Arc::new(DashMap::new()),
            next_key: AtomicU64::new(1),
            store,
            factory,
            resolver,
            pool_config,
            link_gate: Arc::default(),
            shutdown: CancellationToken::new(),
        })
    }

    /// Spawn the reconciliation loop. It runs until [`Orchestrator::shutdown`].
    pub fn spawn_reconciler(&self, interval: Duration) -> JoinHandle<()> {
        let reconciler = Reconciler::new(
            Arc::clone(&self.pools),
            Arc::clone(&self.store),
            Arc::clone(&self.link_gate),
        );
        tokio::spawn(reconciler.run(interval, self.shutdown.child_token()))
    }

    /// Cancel background loops owned by the orchestrator.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Create a pool for `target`, start it in the background and persist
    /// its record. Returns as soon as the record exists.
    pub async fn create_and_start(
        &self,
        target: &str,
        count: u32,
        delay: Duration,
    ) -> Result<TaskRecord, OrchestratorError> {
        let draft = NewTaskRecord::new(target, count)?;

        let key = PoolKey::new(self.next_key.fetch_add(1, Ordering::Relaxed));
        let (pool, stopped) = WorkerPool::new(
            key,
            target,
            self.pool_config.clone(),
            Arc::clone(&self.factory),
            Arc::clone(&self.resolver),
        );
        self.pools.insert(key, Arc::clone(&pool));
        self.watch_pool(key, stopped);

        {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                if let Err(e) = pool.start(count, delay).await {
                    warn!(pool_key = %pool.key(), target = %pool.target(), error = %e, "Pool failed to start");
                }
            });
        }

        let linking = self.link_gate.read().await;
        let record = match self.store.create(draft).await {
            Ok(record) => record,
            Err(e) => {
                error!(pool_key = %key, error = %e, "Failed to persist task, stopping pool");
                self.pools.remove(&key);
                tokio::spawn(async move {
                    pool.stop(Duration::ZERO).await;
                });
                return Err(e.into());
            }
        };
        pool.link_task(record.id);
        drop(linking);

        info!(
            task_id = %record.id,
            pool_key = %key,
            target = %target,
            workers = count,
            "Watch task created"
        );
        Ok(record)
    }

    /// Stop the pool serving `task_id`.
    ///
    /// Returns false if no record exists. The pool drains in the background.
    pub async fn stop_by_task_id(
        &self,
        task_id: TaskId,
        delay: Duration,
    ) -> Result<bool, OrchestratorError> {
        let Some(mut record) = self.store.get(task_id).await? else {
            return Ok(false);
        };

        record.current_status = TaskStatus::Stopping;
        self.store.update(record.clone()).await?;

        if let Some((key, pool)) = self.find_pool(task_id) {
            self.pools.remove(&key);
            info!(task_id = %task_id, pool_key = %key, "Stopping watch task");
            tokio::spawn(async move {
                pool.stop(delay).await;
            });
        } else {
            debug!(task_id = %task_id, "No live pool for task");
        }

        record.current_status = TaskStatus::Completed;
        self.store.update(record).await?;
        Ok(true)
    }

    /// Grow (positive `delta`) or shrink (negative `delta`) the pool
    /// serving `task_id`. Returns how many workers were added or removed.
    pub async fn resize(
        &self,
        task_id: TaskId,
        delta: i64,
        delay: Duration,
    ) -> Result<u32, OrchestratorError> {
        if self.store.get(task_id).await?.is_none() {
            return Err(OrchestratorError::NotFound(task_id));
        }
        let Some((key, pool)) = self.find_pool(task_id) else {
            debug!(task_id = %task_id, "No live pool to resize");
            return Ok(0);
        };

        let n = u32::try_from(delta.unsigned_abs()).unwrap_or(u32::MAX);
        let changed = match delta.cmp(&0) {
            CmpOrdering::Greater => pool.grow_by(n, delay).await?,
            CmpOrdering::Less => pool.shrink_by(n, delay).await?,
            CmpOrdering::Equal => 0,
        };

        debug!(task_id = %task_id, pool_key = %key, delta, changed, "Pool resized");
        Ok(changed)
    }

    pub async fn task(&self, task_id: TaskId) -> Result<Option<TaskRecord>, OrchestratorError> {
        Ok(self.store.get(task_id).await?)
    }

    /// All records, optionally only those initializing or running.
    pub async fn tasks(&self, only_working: bool) -> Result<Vec<TaskRecord>, OrchestratorError> {
        let mut records = self.store.list().await?;
        if only_working {
            records.retain(|r| r.current_status.is_working());
        }
        Ok(records)
    }

    /// The live pool serving `task_id`, if any.
    pub fn pool_for_task(&self, task_id: TaskId) -> Option<Arc<WorkerPool>> {
        self.find_pool(task_id).map(|(_, pool)| pool)
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    pub fn pool_snapshots(&self) -> Vec<PoolSnapshot> {
        self.pools.iter().map(|entry| entry.value().snapshot()).collect()
    }

    // Pool counts are small; a scan beats keeping a second index in sync.
    fn find_pool(&self, task_id: TaskId) -> Option<(PoolKey, Arc<WorkerPool>)> {
        self.pools
            .iter()
            .find(|entry| entry.value().task_id() == Some(task_id))
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
    }

    fn watch_pool(&self, key: PoolKey, stopped: oneshot::Receiver<PoolExit>) {
        let pools = Arc::clone(&self.pools);
        tokio::spawn(async move {
            match stopped.await {
                Ok(exit) => debug!(pool_key = %key, reason = ?exit, "Pool reported stopped"),
                Err(_) => debug!(pool_key = %key, "Pool dropped without stopping"),
            }
            if pools.remove(&key).is_some() {
                info!(pool_key = %key, "Pool removed from registry");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use watchpool_core::PoolStatus;

    use crate::store::InMemoryTaskStore;
    use crate::testing::{eventually, fast_pool_config, FakeWorkerFactory, ScriptedResolver};

    struct Fixture {
        orchestrator: Arc<Orchestrator>,
        store: Arc<InMemoryTaskStore>,
        resolver: Arc<ScriptedResolver>,
        factory: Arc<FakeWorkerFactory>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryTaskStore::new());
        let resolver = ScriptedResolver::live();
        let factory = FakeWorkerFactory::new();
        let orchestrator = Orchestrator::new(
            store.clone(),
            factory.clone(),
            resolver.clone(),
            fast_pool_config(),
        );
        Fixture {
            orchestrator,
            store,
            resolver,
            factory,
        }
    }

    async fn running(fx: &Fixture, count: u32) -> (TaskRecord, Arc<WorkerPool>) {
        let record = fx
            .orchestrator
            .create_and_start("abc", count, Duration::from_millis(1))
            .await
            .unwrap();
        let pool = fx.orchestrator.pool_for_task(record.id).unwrap();
        pool.wait_for_status(PoolStatus::Running).await;
        (record, pool)
    }

    #[tokio::test]
    async fn test_create_persists_initializing_record() {
        let fx = fixture();

        let record = fx
            .orchestrator
            .create_and_start("abc", 3, Duration::from_millis(10))
            .await
            .unwrap();

        assert_eq!(record.current_status, TaskStatus::Initializing);
        assert_eq!(record.desired_worker_count, 3);
        assert_eq!(fx.store.get(record.id).await.unwrap(), Some(record.clone()));
        assert_eq!(fx.orchestrator.pool_count(), 1);
        assert!(fx.orchestrator.pool_for_task(record.id).is_some());
    }

    #[tokio::test]
    async fn test_create_rejects_empty_target() {
        let fx = fixture();
        let err = fx
            .orchestrator
            .create_and_start("", 1, Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Invalid(_)));
        assert_eq!(fx.orchestrator.pool_count(), 0);
    }

    #[tokio::test]
    async fn test_keys_are_never_reused() {
        let fx = fixture();
        let (first, _) = running(&fx, 1).await;
        let first_key = fx.orchestrator.pool_for_task(first.id).unwrap().key();
        fx.orchestrator
            .stop_by_task_id(first.id, Duration::ZERO)
            .await
            .unwrap();

        let (_, second) = running(&fx, 1).await;
        assert!(second.key() > first_key);
    }

    #[tokio::test]
    async fn test_start_scenario_reaches_running_within_one_tick() {
        let fx = fixture();
        let record = fx
            .orchestrator
            .create_and_start("abc", 3, Duration::from_millis(10))
            .await
            .unwrap();
        let pool = fx.orchestrator.pool_for_task(record.id).unwrap();
        pool.wait_for_status(PoolStatus::Running).await;
        assert_eq!(pool.worker_count(), 3);

        let reconciler = fx.orchestrator.spawn_reconciler(Duration::from_millis(5));
        let store = fx.store.clone();
        let id = record.id;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let stored = store.get(id).await.unwrap().unwrap();
            if stored.current_status == TaskStatus::Running {
                assert_eq!(stored.active_worker_count, 3);
                break;
            }
            assert!(tokio::time::Instant::now() < deadline);
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        fx.orchestrator.shutdown();
        reconciler.await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_unknown_task_returns_false() {
        let fx = fixture();
        let stopped = fx
            .orchestrator
            .stop_by_task_id(TaskId::new(42), Duration::ZERO)
            .await
            .unwrap();
        assert!(!stopped);
    }

    #[tokio::test]
    async fn test_stop_completes_record_and_drains_pool() {
        let fx = fixture();
        let (record, pool) = running(&fx, 3).await;

        let stopped = fx
            .orchestrator
            .stop_by_task_id(record.id, Duration::from_millis(1))
            .await
            .unwrap();

        assert!(stopped);
        assert_eq!(fx.orchestrator.pool_count(), 0);
        let stored = fx.store.get(record.id).await.unwrap().unwrap();
        assert_eq!(stored.current_status, TaskStatus::Completed);
        assert_eq!(pool.wait_for_status(PoolStatus::Stopped).await, PoolStatus::Stopped);
        assert!(fx.factory.all_stopped());
    }

    #[tokio::test]
    async fn test_double_stop_is_noop() {
        let fx = fixture();
        let (record, pool) = running(&fx, 2).await;

        let first = fx.orchestrator.stop_by_task_id(record.id, Duration::ZERO);
        let second = fx.orchestrator.stop_by_task_id(record.id, Duration::ZERO);
        let (first, second) = tokio::join!(first, second);

        assert!(first.unwrap());
        assert!(second.unwrap());
        pool.wait_for_status(PoolStatus::Stopped).await;
        assert!(!pool.stop(Duration::ZERO).await);
        assert_eq!(fx.orchestrator.pool_count(), 0);
    }

    #[tokio::test]
    async fn test_resize_unknown_task_is_not_found() {
        let fx = fixture();
        let err = fx
            .orchestrator
            .resize(TaskId::new(7), 2, Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::NotFound(id) if id == TaskId::new(7)));
    }

    #[tokio::test]
    async fn test_resize_without_live_pool_does_nothing() {
        let fx = fixture();
        let (record, _pool) = running(&fx, 1).await;
        fx.orchestrator
            .stop_by_task_id(record.id, Duration::ZERO)
            .await
            .unwrap();

        let changed = fx
            .orchestrator
            .resize(record.id, 3, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(changed, 0);
    }

    #[tokio::test]
    async fn test_resize_grows_and_shrinks() {
        let fx = fixture();
        let (record, pool) = running(&fx, 3).await;

        let grown = fx
            .orchestrator
            .resize(record.id, 5, Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(grown, 5);
        assert!(pool.worker_count() <= 8);

        let shrunk = fx
            .orchestrator
            .resize(record.id, -2, Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(shrunk, 2);
        assert_eq!(pool.worker_count(), 6);
    }

    #[tokio::test]
    async fn test_resize_initializing_pool_is_invalid_state() {
        let fx = fixture();
        fx.resolver.set_reachable(false);
        let record = fx
            .orchestrator
            .create_and_start("abc", 2, Duration::ZERO)
            .await
            .unwrap();

        let err = fx
            .orchestrator
            .resize(record.id, 1, Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Pool(PoolError::InvalidState { .. })
        ));
        assert_eq!(fx.factory.created(), 0);
    }

    #[tokio::test]
    async fn test_pool_removed_after_liveness_gives_up() {
        let fx = fixture();
        let (record, pool) = running(&fx, 2).await;

        fx.resolver.set_reachable(false);
        pool.wait_for_status(PoolStatus::Stopped).await;

        let orchestrator = Arc::clone(&fx.orchestrator);
        eventually(move || orchestrator.pool_count() == 0).await;
        assert!(fx.orchestrator.pool_for_task(record.id).is_none());
    }

    #[tokio::test]
    async fn test_pool_removed_when_workers_fail() {
        let fx = fixture();
        let (_record, pool) = running(&fx, 2).await;

        fx.factory.fail_all();
        pool.wait_for_status(PoolStatus::Stopped).await;

        let orchestrator = Arc::clone(&fx.orchestrator);
        eventually(move || orchestrator.pool_count() == 0).await;
    }

    #[tokio::test]
    async fn test_tasks_filter_working() {
        let fx = fixture();
        let (kept, _) = running(&fx, 1).await;
        let (stopped, _) = running(&fx, 1).await;
        fx.orchestrator
            .stop_by_task_id(stopped.id, Duration::ZERO)
            .await
            .unwrap();

        let all = fx.orchestrator.tasks(false).await.unwrap();
        let working = fx.orchestrator.tasks(true).await.unwrap();

        assert_eq!(all.len(), 2);
        assert_eq!(working.len(), 1);
        assert_eq!(working[0].id, kept.id);
    }
}
