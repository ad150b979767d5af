//! Scripted collaborators for unit tests.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use watchpool_core::{ResourceLocator, WorkerId};

use crate::client::{ResolveError, TargetResolver, WorkerClient, WorkerError, WorkerFactory};
use crate::config::PoolConfig;

/// Millisecond timings. Startup gives up well before the liveness cap.
pub(crate) fn fast_pool_config() -> PoolConfig {
    PoolConfig {
        liveness_poll_interval: Duration::from_millis(10),
        liveness_error_cap: 15,
        startup_poll_interval: Duration::from_millis(2),
        startup_max_polls: 20,
    }
}

/// Poll `condition` until it holds, panicking after two seconds.
pub(crate) async fn eventually(condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 2s"
        );
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

/// Resolver whose answers are flipped by the test.
pub(crate) struct ScriptedResolver {
    reachable: AtomicBool,
    resolvable: AtomicBool,
    resolves: AtomicU32,
    attempts: AtomicU32,
    probe_failures: AtomicU32,
}

impl ScriptedResolver {
    fn with(reachable: bool) -> Arc<Self> {
        Arc::new(Self {
            reachable: AtomicBool::new(reachable),
            resolvable: AtomicBool::new(true),
            resolves: AtomicU32::new(0),
            attempts: AtomicU32::new(0),
            probe_failures: AtomicU32::new(0),
        })
    }

    pub(crate) fn live() -> Arc<Self> {
        Self::with(true)
    }

    pub(crate) fn unreachable() -> Arc<Self> {
        Self::with(false)
    }

    pub(crate) fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub(crate) fn set_resolvable(&self, resolvable: bool) {
        self.resolvable.store(resolvable, Ordering::SeqCst);
    }

    pub(crate) fn resolve_count(&self) -> u32 {
        self.resolves.load(Ordering::SeqCst)
    }

    /// Every resolve call, successful or not.
    pub(crate) fn resolve_attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn probe_failures(&self) -> u32 {
        self.probe_failures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TargetResolver for ScriptedResolver {
    async fn resolve(&self, target: &str) -> Result<ResourceLocator, ResolveError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.resolvable.load(Ordering::SeqCst) {
            return Err(ResolveError::TargetNotFound(target.to_string()));
        }
        let n = self.resolves.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ResourceLocator::new(format!("mem://{target}/{n}")))
    }

    async fn probe(&self, locator: &ResourceLocator) -> Result<(), ResolveError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            self.probe_failures.fetch_add(1, Ordering::SeqCst);
            Err(ResolveError::Unreachable(locator.url.clone()))
        }
    }
}

/// Worker that holds until stopped or told to fail.
pub(crate) struct FakeWorker {
    token: CancellationToken,
    failed: AtomicBool,
    stopped: AtomicBool,
}

impl FakeWorker {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            token: CancellationToken::new(),
            failed: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }

    pub(crate) fn fail(&self) {
        self.failed.store(true, Ordering::SeqCst);
        self.token.cancel();
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkerClient for FakeWorker {
    async fn attach(&self, _locator: &ResourceLocator) -> Result<(), WorkerError> {
        self.token.cancelled().await;
        if self.failed.load(Ordering::SeqCst) {
            Err(WorkerError::ConnectionLost("scripted failure".to_string()))
        } else {
            Ok(())
        }
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.token.cancel();
    }
}

/// Factory that remembers every worker it handed out.
#[derive(Default)]
pub(crate) struct FakeWorkerFactory {
    workers: Mutex<Vec<Arc<FakeWorker>>>,
}

impl FakeWorkerFactory {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn created(&self) -> usize {
        self.workers.lock().unwrap().len()
    }

    pub(crate) fn fail_first(&self) {
        if let Some(worker) = self.workers.lock().unwrap().first() {
            worker.fail();
        }
    }

    pub(crate) fn fail_all(&self) {
        for worker in self.workers.lock().unwrap().iter() {
            worker.fail();
        }
    }

    /// True if every worker either failed or was asked to stop.
    pub(crate) fn all_stopped(&self) -> bool {
        self.workers
            .lock()
            .unwrap()
            .iter()
            .all(|w| w.is_stopped() || w.failed.load(Ordering::SeqCst))
    }
}

impl WorkerFactory for FakeWorkerFactory {
    fn create(&self, _worker_id: &WorkerId) -> Arc<dyn WorkerClient> {
        let worker = FakeWorker::new();
        self.workers.lock().unwrap().push(Arc::clone(&worker));
        worker
    }
}
