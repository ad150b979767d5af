//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use crate::registry::Orchestrator;

/// Shared application state.
pub struct AppState {
    /// Pool registry and task table.
    pub orchestrator: Arc<Orchestrator>,

    /// Pacing used when a request gives no usable delay.
    pub default_delay: Duration,
}

impl AppState {
    /// Create a new AppState wrapped in Arc.
    pub fn new(orchestrator: Arc<Orchestrator>, default_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            orchestrator,
            default_delay,
        })
    }

    /// Turn a request's `delay_ms` into a pacing delay.
    ///
    /// Missing, zero and negative values fall back to the default.
    pub fn delay_or_default(&self, delay_ms: Option<i64>) -> Duration {
        match delay_ms {
            Some(ms) if ms > 0 => Duration::from_millis(ms.unsigned_abs()),
            _ => self.default_delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::store::InMemoryTaskStore;
    use crate::testing::{FakeWorkerFactory, ScriptedResolver};

    #[test]
    fn test_non_positive_delay_uses_default() {
        let orchestrator = Orchestrator::new(
            Arc::new(InMemoryTaskStore::new()),
            FakeWorkerFactory::new(),
            ScriptedResolver::live(),
            PoolConfig::default(),
        );
        let state = AppState::new(orchestrator, Duration::from_millis(50));

        assert_eq!(state.delay_or_default(None), Duration::from_millis(50));
        assert_eq!(state.delay_or_default(Some(0)), Duration::from_millis(50));
        assert_eq!(state.delay_or_default(Some(-5)), Duration::from_millis(50));
        assert_eq!(state.delay_or_default(Some(10)), Duration::from_millis(10));
    }
}
