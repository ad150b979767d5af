//! Idle worker - holds an attachment without doing any I/O.
//!
//! Stands in for a real client when the control plane is run on its own.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use watchpool_core::{ResourceLocator, WorkerId};

use crate::client::{WorkerClient, WorkerError, WorkerFactory};

/// Worker that stays attached until stopped.
pub struct IdleWorker {
    worker_id: WorkerId,
    token: CancellationToken,
}

impl IdleWorker {
    pub fn new(worker_id: WorkerId) -> Self {
        Self {
            worker_id,
            token: CancellationToken::new(),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[async_trait]
impl WorkerClient for IdleWorker {
    async fn attach(&self, locator: &ResourceLocator) -> Result<(), WorkerError> {
        if !locator.is_usable() {
            return Err(WorkerError::AttachFailed(format!(
                "worker {} got a locator without an address",
                self.worker_id
            )));
        }
        debug!(worker_id = %self.worker_id, url = %locator.url, "Idle worker attached");
        self.token.cancelled().await;
        debug!(worker_id = %self.worker_id, "Idle worker detached");
        Ok(())
    }

    fn stop(&self) {
        self.token.cancel();
    }
}

/// Factory for [`IdleWorker`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdleWorkerFactory;

impl WorkerFactory for IdleWorkerFactory {
    fn create(&self, worker_id: &WorkerId) -> Arc<dyn WorkerClient> {
        Arc::new(IdleWorker::new(worker_id.clone()))
    }
}
