//! Control plane configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Per-pool timing.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Interval between liveness probes.
    pub liveness_poll_interval: Duration,

    /// Consecutive probe failures before the target is declared ended.
    pub liveness_error_cap: u32,

    /// Interval between checks while `start` waits for the target.
    pub startup_poll_interval: Duration,

    /// Number of checks `start` makes before giving up on the target.
    pub startup_max_polls: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            liveness_poll_interval: Duration::from_secs(10),
            liveness_error_cap: 15,
            startup_poll_interval: Duration::from_secs(1),
            startup_max_polls: 20,
        }
    }
}

impl PoolConfig {
    /// Longest time `start` waits for the target to be confirmed live.
    pub fn startup_budget(&self) -> Duration {
        self.startup_poll_interval * self.startup_max_polls
    }
}

/// Control plane configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server bind address.
    pub http_bind_addr: String,

    /// Interval between reconciliation ticks.
    pub reconcile_interval: Duration,

    /// Pacing used when a request gives no usable delay.
    pub default_delay: Duration,

    /// Base URL of the target resolver service.
    pub resolver_url: String,

    /// Task table location. In-memory when unset.
    pub state_file: Option<PathBuf>,

    /// Per-pool timing.
    pub pool: PoolConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_bind_addr: "[::1]:50052".to_string(),
            reconcile_interval: Duration::from_secs(1),
            default_delay: Duration::from_millis(50),
            resolver_url: "http://[::1]:8080/targets".to_string(),
            state_file: None,
            pool: PoolConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_startup_budget_is_twenty_seconds() {
        assert_eq!(PoolConfig::default().startup_budget(), Duration::from_secs(20));
    }
}
