//! Prometheus metrics collection and formatting.
//!
//! This module provides metrics in Prometheus text exposition format.

use std::fmt::Write;
use std::sync::Arc;

use tracing::warn;
use watchpool_core::{PoolStatus, TaskStatus};

use crate::state::AppState;

/// Collect all metrics from AppState and format as Prometheus text.
pub async fn collect_metrics(state: &Arc<AppState>) -> String {
    let mut output = String::new();

    collect_pool_metrics(state, &mut output);
    collect_task_metrics(state, &mut output).await;

    output
}

/// Collect live pool metrics by status.
fn collect_pool_metrics(state: &Arc<AppState>, output: &mut String) {
    let snapshots = state.orchestrator.pool_snapshots();

    let mut initializing = 0u64;
    let mut running = 0u64;
    let mut stopping = 0u64;
    let mut stopped = 0u64;
    let mut workers = 0u64;

    for snapshot in &snapshots {
        match snapshot.status {
            PoolStatus::Initializing => initializing += 1,
            PoolStatus::Running => running += 1,
            PoolStatus::Stopping => stopping += 1,
            PoolStatus::Stopped => stopped += 1,
        }
        workers += u64::from(snapshot.active_workers);
    }

    writeln!(output, "# HELP watchpool_pools Number of live pools by status").ok();
    writeln!(output, "# TYPE watchpool_pools gauge").ok();
    writeln!(output, "watchpool_pools{{status=\"initializing\"}} {initializing}").ok();
    writeln!(output, "watchpool_pools{{status=\"running\"}} {running}").ok();
    writeln!(output, "watchpool_pools{{status=\"stopping\"}} {stopping}").ok();
    writeln!(output, "watchpool_pools{{status=\"stopped\"}} {stopped}").ok();

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP watchpool_workers_active Workers attached across all live pools"
    )
    .ok();
    writeln!(output, "# TYPE watchpool_workers_active gauge").ok();
    writeln!(output, "watchpool_workers_active {workers}").ok();
}

/// Collect task record metrics by status.
async fn collect_task_metrics(state: &Arc<AppState>, output: &mut String) {
    let tasks = match state.orchestrator.tasks(false).await {
        Ok(tasks) => tasks,
        Err(e) => {
            warn!(error = %e, "Failed to list tasks for metrics");
            return;
        }
    };

    let mut initializing = 0u64;
    let mut running = 0u64;
    let mut stopping = 0u64;
    let mut completed = 0u64;

    for task in &tasks {
        match task.current_status {
            TaskStatus::Initializing => initializing += 1,
            TaskStatus::Running => running += 1,
            TaskStatus::Stopping => stopping += 1,
            TaskStatus::Completed => completed += 1,
        }
    }

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP watchpool_tasks_total Total number of task records by status"
    )
    .ok();
    writeln!(output, "# TYPE watchpool_tasks_total gauge").ok();
    writeln!(output, "watchpool_tasks_total{{status=\"initializing\"}} {initializing}").ok();
    writeln!(output, "watchpool_tasks_total{{status=\"running\"}} {running}").ok();
    writeln!(output, "watchpool_tasks_total{{status=\"stopping\"}} {stopping}").ok();
    writeln!(output, "watchpool_tasks_total{{status=\"completed\"}} {completed}").ok();
}
