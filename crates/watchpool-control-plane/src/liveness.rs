//! Liveness monitor - decides when a pool's target is gone.
//!
//! The monitor probes the cached locator on a fixed interval. A failed
//! probe may only mean the target moved, so the monitor replaces the
//! cached locator with a fresh lookup and keeps going; only a run of
//! consecutive failures reaching the cap ends the target, and with it
//! the pool.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use watchpool_core::ResourceLocator;

use crate::client::{ResolveError, TargetResolver};
use crate::config::PoolConfig;
use crate::pool::WorkerPool;

/// Result of a single probe round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Probe {
    Reachable,
    Unreachable { consecutive_errors: u32 },
}

/// Background loop owned by one pool.
pub(crate) struct LivenessMonitor {
    pool: Arc<WorkerPool>,
    resolver: Arc<dyn TargetResolver>,
    interval: Duration,
    error_cap: u32,
    consecutive_errors: u32,
}

impl LivenessMonitor {
    pub(crate) fn new(
        pool: Arc<WorkerPool>,
        resolver: Arc<dyn TargetResolver>,
        config: &PoolConfig,
    ) -> Self {
        Self {
            pool,
            resolver,
            interval: config.liveness_poll_interval,
            error_cap: config.liveness_error_cap,
            consecutive_errors: 0,
        }
    }

    /// Poll until the pool leaves `Initializing`/`Running` or the error cap
    /// is reached. Reaching the cap stops the pool.
    pub(crate) async fn run(mut self) {
        let mut status_rx = self.pool.watch_status();
        debug!(pool_key = %self.pool.key(), target = %self.pool.target(), "Liveness monitor started");

        while self.pool.status().is_active() {
            self.tick().await;
            if self.exhausted() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = status_rx.wait_for(|status| !status.is_active()) => break,
            }
        }

        if !self.exhausted() {
            debug!(pool_key = %self.pool.key(), status = %self.pool.status(), "Liveness monitor exiting");
            return;
        }

        info!(
            pool_key = %self.pool.key(),
            target = %self.pool.target(),
            failures = self.consecutive_errors,
            "Target looks ended"
        );
        if self.pool.status().is_active() {
            self.pool.stop(Duration::ZERO).await;
        }
    }

    fn exhausted(&self) -> bool {
        self.consecutive_errors >= self.error_cap
    }

    /// One probe round: resolve if nothing is cached, probe, and on failure
    /// count the error and re-resolve in case the target moved.
    pub(crate) async fn tick(&mut self) -> Probe {
        let target = self.pool.target().to_string();

        let resolved_this_tick = self.pool.locator().await.is_none();
        if resolved_this_tick {
            let locator = self.resolve(&target).await;
            self.pool.set_locator(locator).await;
        }

        let result = match self.pool.locator().await {
            Some(locator) => self.resolver.probe(&locator).await,
            None => Err(ResolveError::NoLocator(target.clone())),
        };

        match result {
            Ok(()) => {
                if self.consecutive_errors > 0 {
                    info!(
                        pool_key = %self.pool.key(),
                        after_failures = self.consecutive_errors,
                        "Target reachable again"
                    );
                }
                self.pool.mark_live();
                self.consecutive_errors = 0;
                Probe::Reachable
            }
            Err(e) => {
                self.consecutive_errors = (self.consecutive_errors + 1).min(self.error_cap);
                if self.consecutive_errors == 1 {
                    warn!(
                        pool_key = %self.pool.key(),
                        target = %target,
                        error = %e,
                        "Target unreachable, watching for recovery"
                    );
                } else {
                    debug!(
                        pool_key = %self.pool.key(),
                        failures = self.consecutive_errors,
                        cap = self.error_cap,
                        error = %e,
                        "Target still unreachable"
                    );
                }

                // The target may have been re-hosted. Whatever the resolver
                // answers replaces the cache, and no answer empties it so the
                // next round resolves from scratch.
                if !resolved_this_tick {
                    let locator = self.resolve(&target).await;
                    self.pool.set_locator(locator).await;
                }
                Probe::Unreachable {
                    consecutive_errors: self.consecutive_errors,
                }
            }
        }
    }

    async fn resolve(&self, target: &str) -> Option<ResourceLocator> {
        match self.resolver.resolve(target).await {
            Ok(locator) if locator.is_usable() => Some(locator),
            Ok(_) => {
                debug!(pool_key = %self.pool.key(), "Resolver returned an unusable locator");
                None
            }
            Err(e) => {
                debug!(pool_key = %self.pool.key(), error = %e, "Resolve failed");
                None
            }
        }
    }
}
