//! Reconciliation - folds live pool state back into the task table.
//!
//! This loop is the only writer of the derived record fields. Commands
//! set a record's status directly and rely on the next tick to repair
//! anything they left inconsistent.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use watchpool_core::{PoolKey, TaskId, TaskRecord};

use crate::pool::{PoolSnapshot, WorkerPool};
use crate::store::{StoreError, TaskStore};

/// What one tick changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Records forced to Completed by the startup recovery pass.
    pub recovered: usize,
    /// Records rewritten from a live pool.
    pub mirrored: usize,
    /// Active records with no live pool, now Completed.
    pub orphaned: usize,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.recovered == 0 && self.mirrored == 0 && self.orphaned == 0
    }
}

/// Periodic reconciler over the registry's pool map.
pub struct Reconciler {
    pools: Arc<DashMap<PoolKey, Arc<WorkerPool>>>,
    store: Arc<dyn TaskStore>,
    // Shared while a record is created and linked to its pool.
    link_gate: Arc<RwLock<()>>,
    recovered: bool,
}

impl Reconciler {
    /// `link_gate` is held exclusively for each tick, so a record is never
    /// seen between its creation and its pool link.
    pub fn new(
        pools: Arc<DashMap<PoolKey, Arc<WorkerPool>>>,
        store: Arc<dyn TaskStore>,
        link_gate: Arc<RwLock<()>>,
    ) -> Self {
        Self {
            pools,
            store,
            link_gate,
            recovered: false,
        }
    }

    /// Tick every `interval` until `shutdown` is cancelled.
    pub async fn run(mut self, interval: Duration, shutdown: CancellationToken) {
        info!(interval_ms = interval.as_millis() as u64, "Reconciliation loop started");
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.tick().await {
                Ok(report) if report.is_empty() => {}
                Ok(report) => debug!(
                    recovered = report.recovered,
                    mirrored = report.mirrored,
                    orphaned = report.orphaned,
                    "Task table reconciled"
                ),
                Err(e) => warn!(error = %e, "Reconciliation tick failed"),
            }
        }

        info!("Reconciliation loop stopped");
    }

    /// Run one reconciliation pass and persist its changes in one batch.
    pub async fn tick(&mut self) -> Result<ReconcileReport, StoreError> {
        let link_gate = Arc::clone(&self.link_gate);
        let _linking = link_gate.write().await;

        let mut records: BTreeMap<TaskId, TaskRecord> = self
            .store
            .list()
            .await?
            .into_iter()
            .map(|r| (r.id, r))
            .collect();
        let mut changed: BTreeSet<TaskId> = BTreeSet::new();
        let mut report = ReconcileReport::default();

        // Anything still marked active from a previous process has no pool.
        if !self.recovered {
            for record in records.values_mut() {
                if record.complete() {
                    changed.insert(record.id);
                    report.recovered += 1;
                }
            }
        }

        let snapshots: Vec<PoolSnapshot> =
            self.pools.iter().map(|entry| entry.value().snapshot()).collect();

        let mut linked: HashSet<TaskId> = HashSet::new();
        for snapshot in &snapshots {
            let Some(task_id) = snapshot.task_id else {
                continue;
            };
            linked.insert(task_id);
            if let Some(record) = records.get_mut(&task_id) {
                if record.mirror(snapshot.status, snapshot.active_workers) {
                    changed.insert(task_id);
                    report.mirrored += 1;
                }
            }
        }

        for record in records.values_mut() {
            if record.current_status.is_active() && !linked.contains(&record.id) {
                record.complete();
                changed.insert(record.id);
                report.orphaned += 1;
            }
        }

        if !changed.is_empty() {
            let batch: Vec<TaskRecord> = changed
                .iter()
                .filter_map(|id| records.remove(id))
                .collect();
            self.store.update_many(batch).await?;
        }

        if !self.recovered {
            self.recovered = true;
            if report.recovered > 0 {
                info!(records = report.recovered, "Recovered records left active by a previous run");
            }
        }
        Ok(report)
    }
}
